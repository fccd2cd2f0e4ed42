//! Runtime configuration for the state service.

use serde::{Deserialize, Serialize};

/// Configuration for the state service.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// The number of blocks below the chain tip whose transaction bodies are
    /// retained in full, to allow reorganizing without re-fetching them.
    /// Blocks older than this are finalized: their effect on the UTXO set is
    /// kept, but their transaction bodies are discarded.
    pub max_reorg_depth: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_reorg_depth: 100,
        }
    }
}
