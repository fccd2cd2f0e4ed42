//! `embernode`'s on-disk configuration: the union of every component
//! config it wires together, loaded from a single TOML file covering
//! every component.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the `embernode` daemon.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EmberConfig {
    /// Peer discovery, handshake, and broadcast configuration.
    pub network: ember_network::Config,

    /// Pruned block store configuration.
    pub state: ember_state::config::Config,

    /// Tracing/logging configuration.
    pub tracing: TracingSection,
}

/// The `[tracing]` section: an `EnvFilter` directive string plus whether to
/// wrap panics/errors with `color-eyre`'s span-trace reporting.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TracingSection {
    /// A `tracing_subscriber::EnvFilter` directive string, e.g.
    /// `"embernode=info,ember_consensus=debug"`.
    pub filter: String,

    /// Whether to use `color-eyre`'s span-trace-aware error reporting
    /// instead of the default panic hook.
    pub use_color_eyre: bool,
}

impl Default for TracingSection {
    fn default() -> Self {
        TracingSection {
            filter: "info".to_owned(),
            use_color_eyre: true,
        }
    }
}
