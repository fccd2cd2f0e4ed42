//! A network's full consensus parameter bundle.
//!
//! [`ember_chain::parameters::Network`] is just the mainnet/testnet tag;
//! this bundles the constants the chain engine needs alongside it (the
//! difficulty retarget schedule and the checkpoint list) so the engine
//! doesn't have to special-case the network inline.

use std::collections::HashMap;

use ember_chain::{
    block::{self, Height},
    parameters::{genesis, Network},
    work::difficulty::ExpandedDifficulty,
};

/// Blocks between difficulty retargets.
pub const RETARGET_INTERVAL: u32 = 2016;

/// The number of seconds a retarget interval is supposed to span.
pub const TARGET_TIMESPAN_SECONDS: i64 = 14 * 24 * 60 * 60;

/// The number of blocks a coinbase output must mature before it is spendable.
pub const SPENDABLE_COINBASE_DEPTH: u32 = 100;

/// The number of preceding block times used to compute a block's
/// median-time-past.
pub const MEDIAN_TIME_PAST_WINDOW: usize = 11;

/// Consensus parameters for a single network.
#[derive(Clone, Debug)]
pub struct Params {
    pub network: Network,
    pub retarget_interval: u32,
    pub target_timespan_seconds: i64,
    pub spendable_coinbase_depth: u32,
    /// Heights at which the block hash is pinned, as a defense against deep
    /// reorganizations of long-settled history.
    pub checkpoints: HashMap<Height, block::Hash>,
    /// The easiest difficulty threshold (`PowLimit`) a block on this network
    /// may declare. Kept alongside `network` rather than read directly off
    /// [`ExpandedDifficulty::target_difficulty_limit`] so that a custom
    /// parameter bundle (e.g. a low-difficulty regtest-style chain used in
    /// tests) can relax it without needing its own [`Network`] variant.
    pub pow_limit: ExpandedDifficulty,
}

impl Params {
    /// Returns the parameter bundle for `network`.
    pub fn new(network: Network) -> Self {
        let mut checkpoints = HashMap::new();
        checkpoints.insert(Height(0), genesis::genesis_hash(network));

        Params {
            network,
            retarget_interval: RETARGET_INTERVAL,
            target_timespan_seconds: TARGET_TIMESPAN_SECONDS,
            spendable_coinbase_depth: SPENDABLE_COINBASE_DEPTH,
            checkpoints,
            pow_limit: ExpandedDifficulty::target_difficulty_limit(network),
        }
    }
}
