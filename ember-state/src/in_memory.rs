//! A reference, in-memory implementation of [`FullPrunedBlockStore`].
//!
//! Disk-backed deployments plug in their own implementation of the trait;
//! this one exists so the chain engine and its tests have something to run
//! against without an external database.

use std::collections::HashMap;

use ember_chain::{block, transparent};

use crate::{
    error::StoreError,
    store::FullPrunedBlockStore,
    types::{StoredBlock, StoredUndoableBlock, TransactionOutputChanges, Utxo},
};

/// Staged writes for an in-progress batch. Nothing here is visible through
/// the read methods until [`InMemoryStateService::commit_database_batch_write`]
/// folds it into the committed maps.
#[derive(Default)]
struct BatchWrites {
    blocks_by_hash: HashMap<block::Hash, StoredBlock>,
    undo_by_hash: HashMap<block::Hash, StoredUndoableBlock>,
    utxos_added: HashMap<transparent::OutPoint, Utxo>,
    utxos_removed: Vec<transparent::OutPoint>,
    chain_head: Option<(block::Hash, block::Height)>,
    verified_chain_head: Option<(block::Hash, block::Height)>,
}

/// An in-memory [`FullPrunedBlockStore`].
///
/// Every block seen is kept in `blocks_by_hash`/`undo_by_hash`, whether or
/// not it ends up on the best chain; `best_chain_by_height` is a derived
/// index onto whichever hash currently occupies each height on the chain
/// rooted at `chain_head`, rebuilt incrementally on every `set_chain_head`.
///
/// Writes made between `begin_database_batch_write` and
/// `commit_database_batch_write` are staged in a shadow [`BatchWrites`]
/// struct and are invisible to readers (and discardable by
/// `abort_database_batch_write`) until the batch commits.
#[derive(Default)]
pub struct InMemoryStateService {
    blocks_by_hash: HashMap<block::Hash, StoredBlock>,
    undo_by_hash: HashMap<block::Hash, StoredUndoableBlock>,
    best_chain_by_height: HashMap<block::Height, block::Hash>,
    utxos: HashMap<transparent::OutPoint, Utxo>,
    chain_head: Option<(block::Hash, block::Height)>,
    verified_chain_head: Option<(block::Hash, block::Height)>,
    batch: Option<BatchWrites>,
}

impl InMemoryStateService {
    pub fn new() -> Self {
        Self::default()
    }

    fn batch_mut(&mut self) -> Result<&mut BatchWrites, StoreError> {
        self.batch.as_mut().ok_or(StoreError::NoBatchInProgress)
    }

    /// Walks `previous_block_hash` back from `(hash, height)`, overwriting
    /// `best_chain_by_height` until it reaches a height that already maps to
    /// this hash (the fork point with whatever used to be the best chain, or
    /// genesis). Only ever grows or corrects the index; never shrinks it, so
    /// heights abandoned by a reorg still resolve to their former occupant
    /// until the corresponding new-chain block is walked over them.
    fn reindex_best_chain(&mut self, mut hash: block::Hash, mut height: block::Height) {
        loop {
            if self.best_chain_by_height.get(&height) == Some(&hash) {
                return;
            }
            self.best_chain_by_height.insert(height, hash);
            let parent_hash = match self.blocks_by_hash.get(&hash) {
                Some(stored) => stored.block.header.previous_block_hash,
                None => return,
            };
            height = match height.previous() {
                Some(h) => h,
                None => return,
            };
            hash = parent_hash;
        }
    }
}

impl FullPrunedBlockStore for InMemoryStateService {
    fn put(&mut self, block: StoredBlock, undo: StoredUndoableBlock) -> Result<(), StoreError> {
        let hash = block.block.hash();
        let batch = self.batch_mut()?;
        batch.blocks_by_hash.insert(hash, block);
        batch.undo_by_hash.insert(hash, undo);
        Ok(())
    }

    fn get(&self, hash: block::Hash) -> Option<StoredBlock> {
        if let Some(batch) = &self.batch {
            if let Some(block) = batch.blocks_by_hash.get(&hash) {
                return Some(block.clone());
            }
        }
        self.blocks_by_hash.get(&hash).cloned()
    }

    fn get_at_height(&self, height: block::Height) -> Option<StoredBlock> {
        let hash = self.best_chain_by_height.get(&height)?;
        self.get(*hash)
    }

    fn get_undo(&self, hash: block::Hash) -> Option<StoredUndoableBlock> {
        if let Some(batch) = &self.batch {
            if let Some(undo) = batch.undo_by_hash.get(&hash) {
                return Some(undo.clone());
            }
        }
        self.undo_by_hash.get(&hash).cloned()
    }

    fn get_chain_head(&self) -> Option<(block::Hash, block::Height)> {
        self.batch
            .as_ref()
            .and_then(|batch| batch.chain_head)
            .or(self.chain_head)
    }

    fn set_chain_head(
        &mut self,
        hash: block::Hash,
        height: block::Height,
    ) -> Result<(), StoreError> {
        self.batch_mut()?.chain_head = Some((hash, height));
        Ok(())
    }

    fn get_verified_chain_head(&self) -> Option<(block::Hash, block::Height)> {
        self.batch
            .as_ref()
            .and_then(|batch| batch.verified_chain_head)
            .or(self.verified_chain_head)
    }

    fn set_verified_chain_head(
        &mut self,
        hash: block::Hash,
        height: block::Height,
    ) -> Result<(), StoreError> {
        self.batch_mut()?.verified_chain_head = Some((hash, height));
        Ok(())
    }

    fn add_unspent_transaction_output(
        &mut self,
        outpoint: transparent::OutPoint,
        utxo: Utxo,
    ) -> Result<(), StoreError> {
        self.batch_mut()?.utxos_added.insert(outpoint, utxo);
        Ok(())
    }

    fn remove_unspent_transaction_output(
        &mut self,
        outpoint: &transparent::OutPoint,
    ) -> Option<Utxo> {
        // Removal is only meaningful inside a batch: the returned value backs
        // undo data, and undo data is only ever built while committing a block.
        let existing = self.get_transaction_output(outpoint);
        if let Some(batch) = self.batch.as_mut() {
            // An output created and spent within the same batch (a chain of
            // transactions in one block) must not survive to commit time.
            if batch.utxos_added.remove(outpoint).is_none() {
                batch.utxos_removed.push(*outpoint);
            }
        }
        existing
    }

    fn get_transaction_output(&self, outpoint: &transparent::OutPoint) -> Option<Utxo> {
        if let Some(batch) = &self.batch {
            if let Some(utxo) = batch.utxos_added.get(outpoint) {
                return Some(utxo.clone());
            }
            if batch.utxos_removed.contains(outpoint) {
                return None;
            }
        }
        self.utxos.get(outpoint).cloned()
    }

    fn begin_database_batch_write(&mut self) -> Result<(), StoreError> {
        if self.batch.is_some() {
            return Err(StoreError::BatchAlreadyInProgress);
        }
        self.batch = Some(BatchWrites::default());
        Ok(())
    }

    fn commit_database_batch_write(&mut self) -> Result<(), StoreError> {
        let batch = self.batch.take().ok_or(StoreError::NoBatchInProgress)?;

        self.blocks_by_hash.extend(batch.blocks_by_hash);
        self.undo_by_hash.extend(batch.undo_by_hash);

        for outpoint in batch.utxos_removed {
            self.utxos.remove(&outpoint);
        }
        self.utxos.extend(batch.utxos_added);

        if let Some(head) = batch.verified_chain_head {
            self.verified_chain_head = Some(head);
        }
        if let Some((hash, height)) = batch.chain_head {
            self.chain_head = Some((hash, height));
            self.reindex_best_chain(hash, height);
        }

        Ok(())
    }

    fn abort_database_batch_write(&mut self) -> Result<(), StoreError> {
        self.batch.take().ok_or(StoreError::NoBatchInProgress)?;
        Ok(())
    }

    fn finalize(&mut self, max_reorg_depth: u32) -> Result<(), StoreError> {
        let (mut hash, tip_height) = match self.chain_head {
            Some(head) => head,
            None => return Ok(()),
        };

        let finalize_below = tip_height.0.saturating_sub(max_reorg_depth);
        let mut live_undo_blocks = 0u32;
        loop {
            let height = match self.blocks_by_hash.get(&hash) {
                Some(stored) => stored.height,
                None => break,
            };
            if height.0 >= finalize_below {
                live_undo_blocks += 1;
                match self.blocks_by_hash.get(&hash) {
                    Some(stored) => hash = stored.block.header.previous_block_hash,
                    None => break,
                }
                continue;
            }
            let already_finalized = matches!(
                self.undo_by_hash.get(&hash),
                Some(StoredUndoableBlock::TxOutChanges(_))
            );
            if already_finalized {
                break;
            }
            if let Some(StoredUndoableBlock::Transactions { changes, .. }) =
                self.undo_by_hash.get_mut(&hash)
            {
                let changes = std::mem::replace(changes, TransactionOutputChanges::default());
                self.undo_by_hash
                    .insert(hash, StoredUndoableBlock::TxOutChanges(changes));
            }
            match self.blocks_by_hash.get(&hash) {
                Some(stored) => hash = stored.block.header.previous_block_hash,
                None => break,
            }
        }
        metrics::gauge!("state.live_undo_blocks", live_undo_blocks as f64);
        Ok(())
    }
}
