//! Protocol-level constants: version numbers, timeouts, and wire limits.

use std::time::Duration;

use crate::protocol::external::types::ProtocolVersion;

/// The protocol version spoken by this implementation.
///
/// Mirrors Bitcoin Core's `PROTOCOL_VERSION`, which introduced `sendheaders`,
/// compact blocks, and BIP 152/157/158 related fields.
pub const CURRENT_VERSION: ProtocolVersion = ProtocolVersion(70016);

/// The oldest protocol version this implementation will negotiate down to.
///
/// Below this, peers lack the `sendheaders` (BIP 130) message, which we rely
/// on to avoid flooding the network with `inv` announcements.
pub const MIN_ACCEPTED_VERSION: ProtocolVersion = ProtocolVersion(70001);

/// The protocol version at which peer addresses began carrying a services
/// field distinct from the one in `version`. All versions we accept are
/// above this, so the field is always present.
pub const ADDR_V2_VERSION: ProtocolVersion = ProtocolVersion(70016);

/// Maximum number of addresses allowed in a single `addr` message.
pub const MAX_ADDR_PER_MESSAGE: usize = 1000;

/// Maximum number of inventory items allowed in a single `inv` or `getdata`
/// message.
pub const MAX_INV_PER_MESSAGE: usize = 50_000;

/// Maximum number of block header hashes accepted from a peer in response to
/// one `getheaders` request.
pub const MAX_HEADERS_PER_MESSAGE: usize = 2_000;

/// How long to wait for a peer's handshake (`version`/`verack` exchange) to
/// complete before giving up.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

/// How often to send a `ping` to an idle, connected peer.
pub const PING_INTERVAL: Duration = Duration::from_secs(120);

/// How long to wait for the `pong` matching a sent `ping` before treating
/// the peer as dead and disconnecting it.
pub const PONG_TIMEOUT: Duration = Duration::from_secs(20);

/// How long a request (e.g. a block download) may remain outstanding before
/// its peer is penalized and the request is retried elsewhere.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Smoothing factor `alpha` for the peer RTT exponentially-weighted moving
/// average: `new_estimate = alpha * sample + (1 - alpha) * old_estimate`.
pub const RTT_EWMA_ALPHA: f64 = 0.25;

/// Fraction of the maximum connection pool reserved for outbound connections
/// we initiated ourselves, as opposed to inbound connections accepted from
/// the listener.
pub const OUTBOUND_CONNECTION_FRACTION: f64 = 0.75;

/// The user agent string this implementation advertises in its `version`
/// message, following the BIP 14 subversion format.
pub const USER_AGENT: &str = "/embernode:0.1.0/";
