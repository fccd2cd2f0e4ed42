//! Peer-level error taxonomy.
//!
//! These errors are all "peer-level": they are handled by disconnecting the
//! offending peer and, where the `PeerGroup` is involved, reconnecting
//! elsewhere. They never propagate past the peer/peer_set boundary — nothing
//! here is fatal to the node.

use std::io;

use thiserror::Error;

use ember_chain::serialization::SerializationError;

/// An error that terminates a single peer connection.
#[derive(Error, Debug)]
pub enum PeerError {
    /// Malformed bytes on the wire: a bad checksum, an out-of-range varint,
    /// an unrecognized command, or any other framing violation.
    #[error("protocol error: {0}")]
    Protocol(#[from] SerializationError),

    /// The peer's handshake or an outstanding request did not complete
    /// before its deadline.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// The peer sent a `version` message that we don't consider compatible
    /// (too old, or it looks like a connection to ourselves).
    #[error("handshake rejected: {0}")]
    HandshakeRejected(&'static str),

    /// The underlying TCP connection failed.
    #[error("connection error: {0}")]
    Io(#[from] io::Error),

    /// The peer's outbound message queue, or its request-tracking table, is
    /// full.
    #[error("peer overloaded: {0}")]
    Overloaded(&'static str),

    /// The connection was closed locally, e.g. because the `PeerGroup` is
    /// shutting down.
    #[error("connection closed")]
    ConnectionClosed,
}

impl PeerError {
    /// Returns `true` if this error should count against the peer's
    /// reputation (as opposed to e.g. a local shutdown).
    pub fn is_peer_fault(&self) -> bool {
        !matches!(self, PeerError::ConnectionClosed)
    }
}

/// A boxed, dynamically-dispatched error, matching the convention used by
/// the state and consensus crates' `tower::Service` impls.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
