//! Runtime configuration for the peer connection machinery and the
//! `PeerGroup` supervisor.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use ember_chain::parameters::Network;

use crate::constants;

/// Configuration accepted by [`crate::peer_set::PeerGroup`] and the
/// connections it supervises.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// The network to connect to.
    pub network: Network,

    /// The local address to listen for inbound connections on, if any.
    pub listen_addr: Option<std::net::SocketAddr>,

    /// A list of peer addresses to use as an initial connection seed, in
    /// addition to (or instead of) DNS seed discovery.
    pub initial_peers: Vec<std::net::SocketAddr>,

    /// The base of the user agent string we advertise in `version` messages,
    /// e.g. `"embernode"`.
    pub user_agent: String,

    /// The version component of the user agent string, e.g. `"0.1.0"`.
    pub user_agent_version: String,

    /// The target number of outbound connections to maintain.
    pub max_connections: usize,

    /// How long to wait for a new connection's handshake to complete.
    pub connect_timeout: Duration,

    /// The minimum number of peers that must request a broadcast
    /// transaction via `getdata` before `broadcast_transaction` resolves
    /// successfully.
    pub min_broadcast_connections: usize,

    /// Whether to proactively fetch transactions that a broadcast
    /// transaction depends on but that we don't yet have, before relaying.
    pub download_tx_dependencies: bool,
}

impl Config {
    /// Render the full BIP 14 user agent string, e.g. `/embernode:0.1.0/`.
    pub fn user_agent_string(&self) -> String {
        format!("/{}:{}/", self.user_agent, self.user_agent_version)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            listen_addr: None,
            initial_peers: Vec::new(),
            user_agent: "embernode".to_owned(),
            user_agent_version: env!("CARGO_PKG_VERSION").to_owned(),
            max_connections: 8,
            connect_timeout: constants::HANDSHAKE_TIMEOUT,
            min_broadcast_connections: 1,
            download_tx_dependencies: false,
        }
    }
}
