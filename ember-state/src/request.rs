//! The `tower::Service` request/response types for the state service.

use std::sync::Arc;

use ember_chain::{block, transaction, transparent};

use crate::types::Utxo;

/// Either a block height or a block hash, for APIs that accept either.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HashOrHeight {
    Hash(block::Hash),
    Height(block::Height),
}

impl From<block::Hash> for HashOrHeight {
    fn from(hash: block::Hash) -> Self {
        HashOrHeight::Hash(hash)
    }
}

impl From<block::Height> for HashOrHeight {
    fn from(height: block::Height) -> Self {
        HashOrHeight::Height(height)
    }
}

/// A request to the state service.
#[derive(Debug)]
pub enum Request {
    /// Commit `block` to the state, connecting it to the current chain tip.
    CommitBlock(Arc<block::Block>),
    /// Returns the depth of the block identified by `HashOrHeight` below the
    /// current chain tip, or `None` if it isn't in the best chain.
    Depth(HashOrHeight),
    /// Returns the current best chain tip.
    Tip,
    /// Returns up to 32 block hashes, used to locate the fork point with a peer.
    BlockLocator,
    /// Returns the transaction with the given hash, if the state has it.
    Transaction(transaction::Hash),
    /// Returns the block identified by `HashOrHeight`, if any.
    Block(HashOrHeight),
    /// Returns the UTXO at `outpoint` once it becomes available, waiting if
    /// it is not yet known.
    AwaitUtxo(transparent::OutPoint),
}

/// A response from the state service.
#[derive(Debug)]
pub enum Response {
    Added(block::Hash),
    Depth(Option<u32>),
    Tip(Option<(block::Height, block::Hash)>),
    BlockLocator(Vec<block::Hash>),
    Transaction(Option<Arc<transaction::Transaction>>),
    Block(Option<Arc<block::Block>>),
    Utxo(Utxo),
}
