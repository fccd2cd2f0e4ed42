//! The `FullPrunedBlockStore` trait: the storage interface a chain engine
//! needs to commit blocks, maintain the UTXO set, and reorganize.

use ember_chain::{block, transparent};

use crate::{
    error::StoreError,
    types::{StoredBlock, StoredUndoableBlock, Utxo},
};

/// A persistent (or in-memory) index of pruned blocks and their undo data.
///
/// Blocks are keyed by hash, not height: a store must be able to hold more
/// than one block at a given height (a side branch sitting alongside the
/// best chain) without either overwriting the other. Height is only a
/// convenience index onto whichever block is currently part of the best
/// chain (see [`FullPrunedBlockStore::get_at_height`]); the chain engine
/// itself never relies on it; it always walks `previous_block_hash` links.
///
/// Implementations are responsible for atomicity of the batch-write methods:
/// either every change in a batch is visible after `commit_database_batch_write`,
/// or none are, even if the process crashes mid-batch.
pub trait FullPrunedBlockStore: Send + Sync + 'static {
    /// Stores `block` and its `undo` data, keyed by the block's own hash.
    fn put(&mut self, block: StoredBlock, undo: StoredUndoableBlock) -> Result<(), StoreError>;

    /// Returns the block with the given hash, if any, whether or not it is
    /// on the best chain.
    fn get(&self, hash: block::Hash) -> Option<StoredBlock>;

    /// Returns the block currently on the best chain at `height`, if any.
    fn get_at_height(&self, height: block::Height) -> Option<StoredBlock>;

    /// Returns the undo information for the block with the given hash, if any.
    fn get_undo(&self, hash: block::Hash) -> Option<StoredUndoableBlock>;

    /// Returns the hash and height of the current chain tip (the most-work
    /// chain seen so far, whether or not it has been fully verified).
    fn get_chain_head(&self) -> Option<(block::Hash, block::Height)>;

    /// Sets the current chain tip, and reindexes [`FullPrunedBlockStore::get_at_height`]
    /// for the heights between the previous tip's fork point and this one.
    fn set_chain_head(&mut self, hash: block::Hash, height: block::Height) -> Result<(), StoreError>;

    /// Returns the hash and height of the last fully script-verified block.
    fn get_verified_chain_head(&self) -> Option<(block::Hash, block::Height)>;

    /// Sets the last fully script-verified block.
    fn set_verified_chain_head(
        &mut self,
        hash: block::Hash,
        height: block::Height,
    ) -> Result<(), StoreError>;

    /// Records `utxo` as unspent at `outpoint`.
    fn add_unspent_transaction_output(
        &mut self,
        outpoint: transparent::OutPoint,
        utxo: Utxo,
    ) -> Result<(), StoreError>;

    /// Removes and returns the UTXO at `outpoint`, if it was unspent.
    fn remove_unspent_transaction_output(
        &mut self,
        outpoint: &transparent::OutPoint,
    ) -> Option<Utxo>;

    /// Returns the UTXO at `outpoint`, without removing it.
    fn get_transaction_output(&self, outpoint: &transparent::OutPoint) -> Option<Utxo>;

    /// Begins a batch of writes that are staged until `commit_database_batch_write`.
    fn begin_database_batch_write(&mut self) -> Result<(), StoreError>;

    /// Makes every write staged since `begin_database_batch_write` visible.
    fn commit_database_batch_write(&mut self) -> Result<(), StoreError>;

    /// Discards every write staged since `begin_database_batch_write`.
    fn abort_database_batch_write(&mut self) -> Result<(), StoreError>;

    /// Permanently discards the transaction bodies of best-chain blocks
    /// deeper than `max_reorg_depth` below the chain head, retaining only
    /// the [`crate::types::TransactionOutputChanges`] needed to undo them.
    fn finalize(&mut self, max_reorg_depth: u32) -> Result<(), StoreError>;
}

/// A boxed [`FullPrunedBlockStore`], used behind the [`crate::service`] layer
/// so callers don't need to name the concrete implementation.
pub type BoxStore = Box<dyn FullPrunedBlockStore>;
