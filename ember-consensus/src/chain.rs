//! `FullPrunedBlockChain`: the consensus engine that accepts blocks,
//! maintains the UTXO set, tracks the best chain, and performs
//! reorganizations via recorded undo data.
//!
//! The synchronous [`FullPrunedBlockChain`] holds the store and does the
//! actual work; [`Chain`] wraps it in an `Arc<Mutex<_>>` so `add` calls from
//! multiple peers are serialized (the single-writer invariant of the chain:
//! one worker, FIFO order).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};

use ember_chain::{
    block::{self, Block, Height},
    work::difficulty::Work,
};
use ember_state::{
    store::BoxStore,
    types::{StoredBlock, StoredUndoableBlock, TransactionOutputChanges, Utxo},
};

use crate::{
    block::check,
    error::{BlockError, TransactionError, VerificationError},
    parameters::Params,
    script::{legacy_sigop_count, ScriptVerifier},
    transaction::check as tx_check,
};

/// The maximum number of orphan blocks buffered in memory at once, across
/// every `prevHash` they're waiting on.
pub const MAX_ORPHANS: usize = 256;

/// The maximum allowed signature operations in a single block.
pub const MAX_BLOCK_SIGOPS: usize = 20_000;

/// An event emitted by [`FullPrunedBlockChain`] as blocks are connected or
/// the best chain changes. Delivered in chain order, a consequence of the
/// single-writer lock around `add`.
#[derive(Clone, Debug)]
pub enum ChainEvent {
    /// `block` was connected to the best chain at `height`.
    BlockConnected(Arc<Block>, Height),
    /// The best chain switched from `old_head` to `new_head`.
    Reorganize {
        old_head: block::Hash,
        new_head: block::Hash,
    },
}

/// The consensus engine itself. Not `Send`-shared directly; wrap in [`Chain`]
/// for concurrent access.
pub struct FullPrunedBlockChain {
    store: BoxStore,
    params: Params,
    script_verifier: Arc<dyn ScriptVerifier>,
    max_reorg_depth: u32,
    /// Blocks buffered because their parent hasn't arrived yet, keyed by the
    /// parent hash they're waiting on.
    orphans: HashMap<block::Hash, Vec<Arc<Block>>>,
    orphan_count: usize,
    listeners: broadcast::Sender<ChainEvent>,
}

impl FullPrunedBlockChain {
    /// Builds a chain engine over `store`, seeding it with `genesis` if it
    /// doesn't already have a chain head.
    ///
    /// The genesis block is never run through [`Block::verify`] or
    /// [`FullPrunedBlockChain::check_context`]: it has no parent to check
    /// its difficulty or median-time-past against, so it's trusted as a
    /// root axiom of the parameter bundle rather than validated the way a
    /// peer-supplied block is (ordinary block processing assumes a parent
    /// lookup always either succeeds or buffers an orphan; genesis is the
    /// one block for which neither is meaningful). Its coinbase output is
    /// intentionally never added to the UTXO set, matching Bitcoin's real
    /// chainstate,
    /// which has always treated the genesis coinbase as unspendable.
    pub fn new(
        params: Params,
        mut store: BoxStore,
        script_verifier: Arc<dyn ScriptVerifier>,
        max_reorg_depth: u32,
        genesis: Arc<Block>,
    ) -> Self {
        if store.get_chain_head().is_none() {
            let hash = genesis.hash();
            let work = genesis
                .header
                .difficulty_threshold
                .to_expanded()
                .map(|d| d.difficulty_work())
                .unwrap_or_else(Work::zero);
            let stored = StoredBlock {
                block: genesis.clone(),
                height: block::Height(0),
                cumulative_work: work,
            };
            let undo = StoredUndoableBlock::Transactions {
                transactions: genesis.transactions.clone(),
                changes: TransactionOutputChanges::default(),
            };
            store
                .begin_database_batch_write()
                .and_then(|_| store.put(stored, undo))
                .and_then(|_| store.set_chain_head(hash, block::Height(0)))
                .and_then(|_| store.commit_database_batch_write())
                .expect("seeding genesis into a fresh store does not fail");
        }

        let (listeners, _) = broadcast::channel(256);
        FullPrunedBlockChain {
            store,
            params,
            script_verifier,
            max_reorg_depth,
            orphans: HashMap::new(),
            orphan_count: 0,
            listeners,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.listeners.subscribe()
    }

    /// The current best-chain tip, if any block has been connected yet.
    pub fn tip(&self) -> Option<(block::Hash, Height)> {
        self.store.get_chain_head()
    }

    /// The number of orphan blocks currently buffered.
    pub fn orphan_count(&self) -> usize {
        self.orphan_count
    }

    /// Attempts to add `block` to the chain.
    ///
    /// Returns `Ok(true)` if the block was connected to the best chain,
    /// `Ok(false)` if it was stored as a side branch or buffered as an
    /// orphan (its parent isn't known yet), and `Err` if it failed
    /// structural or contextual validation.
    pub fn add(&mut self, block: Arc<Block>, now: DateTime<Utc>) -> Result<bool, VerificationError> {
        let connected = self.add_one(block, now)?;
        self.drain_orphans(now);
        self.store.finalize(self.max_reorg_depth).map_err(VerificationError::Store)?;
        Ok(connected)
    }

    /// The part of `add` that handles exactly one block: structural and
    /// contextual validation, then connect/reorganize/side-branch/orphan.
    /// Does not drain the orphan pool or finalize -- callers (either `add`
    /// itself, or `drain_orphans` reprocessing a buffered child) do that.
    fn add_one(&mut self, block: Arc<Block>, now: DateTime<Utc>) -> Result<bool, VerificationError> {
        let hash = block.hash();

        block.verify()?;
        check::coinbase_is_first(&block)?;

        // `Block::verify` already checked the merkle root matches, but a
        // malleable tree lets two different transaction lists share a root;
        // reject a block that reuses a transaction hash within itself.
        let tx_hashes: Vec<_> = block.transactions.iter().map(|tx| tx.hash()).collect();
        check::merkle_root_validity(&block, &tx_hashes)?;

        let parent = match self.store.get(block.header.previous_block_hash) {
            Some(parent) => parent,
            None => {
                self.buffer_orphan(block);
                return Ok(false);
            }
        };

        let height = parent
            .height
            .next()
            .ok_or_else(|| VerificationError::ReorganizeFailed(hash, "height overflow".into()))?;

        self.check_context(&block, &parent, height, now)?;

        let work = parent.cumulative_work
            + block
                .header
                .difficulty_threshold
                .to_expanded()
                .expect("difficulty already validated by block.verify")
                .difficulty_work();

        let candidate = StoredBlock {
            block: block.clone(),
            height,
            cumulative_work: work,
        };

        let current_head = self.store.get_chain_head();

        match current_head {
            Some((head_hash, _)) if block.header.previous_block_hash == head_hash => {
                self.connect(candidate)?;
                Ok(true)
            }
            Some((head_hash, _)) => {
                let head_work = self
                    .store
                    .get(head_hash)
                    .map(|s| s.cumulative_work)
                    .unwrap_or_else(Work::zero);
                if work > head_work {
                    self.reorganize(candidate)?;
                    Ok(true)
                } else {
                    self.store_side_branch(candidate)?;
                    Ok(false)
                }
            }
            None => {
                // `new` always seeds a genesis block before returning, so
                // there's always a chain head by the time `add` can be
                // called; this only exists so a bug in that invariant fails
                // safe (accepts the block) rather than panicking.
                self.connect(candidate)?;
                Ok(true)
            }
        }
    }

    /// Context validation: median-time-past, difficulty
    /// retargeting, and checkpoints.
    fn check_context(
        &self,
        block: &Block,
        parent: &StoredBlock,
        height: Height,
        now: DateTime<Utc>,
    ) -> Result<(), VerificationError> {
        let hash = block.hash();

        check::time_is_valid_at(&block.header, now, &height, &hash)
            .map_err(BlockError::Time)?;

        check::difficulty_is_valid(
            &block.header,
            self.params.network,
            self.params.pow_limit,
            &height,
            &hash,
        )?;

        let median = self.median_time_past(block.header.previous_block_hash);
        if block.header.time <= median {
            return Err(BlockError::TimeTooOld(height, block.header.time, median).into());
        }

        if height.0 % self.params.retarget_interval == 0 && height.0 > 0 {
            let first_block = self
                .nth_ancestor(
                    block.header.previous_block_hash,
                    self.params.retarget_interval - 1,
                )
                .ok_or_else(|| VerificationError::ReorganizeFailed(hash, "missing retarget anchor".into()))?;

            let actual_timespan = (parent.block.header.time - first_block.block.header.time)
                .num_seconds();

            let old_difficulty = parent
                .block
                .header
                .difficulty_threshold
                .to_expanded()
                .expect("parent difficulty already validated");
            let expected = old_difficulty.retarget(
                actual_timespan,
                self.params.target_timespan_seconds,
                self.params.network,
            );
            let expected_bits =
                ember_chain::work::difficulty::CompactDifficulty::from_expanded(expected).to_bits();
            let found_bits = block.header.difficulty_threshold.to_bits();
            if expected_bits != found_bits {
                return Err(BlockError::BadDifficultyAdjustment(height, expected_bits, found_bits).into());
            }
        } else if block.header.difficulty_threshold.to_bits()
            != parent.block.header.difficulty_threshold.to_bits()
        {
            return Err(BlockError::BadDifficultyAdjustment(
                height,
                parent.block.header.difficulty_threshold.to_bits(),
                block.header.difficulty_threshold.to_bits(),
            )
            .into());
        }

        if let Some(expected_hash) = self.params.checkpoints.get(&height) {
            if *expected_hash != hash {
                return Err(BlockError::CheckpointMismatch(height, hash).into());
            }
        }

        Ok(())
    }

    /// The median of the timestamps of the `MEDIAN_TIME_PAST_WINDOW` blocks
    /// ending at (and including) the block with hash `tip_hash`.
    fn median_time_past(&self, tip_hash: block::Hash) -> DateTime<Utc> {
        let mut times = Vec::with_capacity(crate::parameters::params::MEDIAN_TIME_PAST_WINDOW);
        let mut cursor = Some(tip_hash);
        for _ in 0..crate::parameters::params::MEDIAN_TIME_PAST_WINDOW {
            let hash = match cursor {
                Some(hash) => hash,
                None => break,
            };
            let stored = match self.store.get(hash) {
                Some(stored) => stored,
                None => break,
            };
            times.push(stored.block.header.time);
            cursor = Some(stored.block.header.previous_block_hash);
        }
        times.sort();
        times[times.len() / 2]
    }

    /// Walks `previous_block_hash` back `n` times from `hash`, returning the
    /// `n`-th ancestor (the block itself, if `n` is 0).
    fn nth_ancestor(&self, hash: block::Hash, n: u32) -> Option<StoredBlock> {
        let mut stored = self.store.get(hash)?;
        for _ in 0..n {
            stored = self.store.get(stored.block.header.previous_block_hash)?;
        }
        Some(stored)
    }

    /// Connects `candidate` directly onto the current chain head.
    fn connect(&mut self, candidate: StoredBlock) -> Result<(), VerificationError> {
        self.store.begin_database_batch_write().map_err(VerificationError::Store)?;

        match self.connect_in_batch(&candidate) {
            Ok(undo) => {
                let hash = candidate.block.hash();
                let height = candidate.height;
                let block = candidate.block.clone();
                self.store
                    .put(candidate, undo)
                    .map_err(VerificationError::Store)?;
                self.store
                    .set_chain_head(hash, height)
                    .map_err(VerificationError::Store)?;
                self.store
                    .commit_database_batch_write()
                    .map_err(VerificationError::Store)?;
                let _ = self.listeners.send(ChainEvent::BlockConnected(block, height));
                Ok(())
            }
            Err(e) => {
                let _ = self.store.abort_database_batch_write();
                Err(e)
            }
        }
    }

    /// Stores `candidate` without connecting it: it doesn't extend the
    /// current best chain, but it may later if a reorganization picks it up.
    fn store_side_branch(&mut self, candidate: StoredBlock) -> Result<(), VerificationError> {
        self.store.begin_database_batch_write().map_err(VerificationError::Store)?;
        let undo = StoredUndoableBlock::Transactions {
            transactions: candidate.block.transactions.clone(),
            changes: TransactionOutputChanges::default(),
        };
        let result = self
            .store
            .put(candidate, undo)
            .and_then(|_| self.store.commit_database_batch_write());
        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = self.store.abort_database_batch_write();
                Err(VerificationError::Store(e))
            }
        }
    }

    /// Reorganizes the chain so that `candidate` becomes the new head
    /// disconnects the current head down to the fork point,
    /// newest first, then reconnects the winning branch, oldest first,
    /// re-running full validation. Aborts and restores the previous head on
    /// any failure along the winning branch.
    fn reorganize(&mut self, candidate: StoredBlock) -> Result<(), VerificationError> {
        let (old_head_hash, old_head_height) = self
            .store
            .get_chain_head()
            .expect("reorganize is only called once a head exists");

        let fork_height = self.find_fork_height(old_head_hash, old_head_height, &candidate)?;

        self.store.begin_database_batch_write().map_err(VerificationError::Store)?;

        let result =
            self.reorganize_in_batch(old_head_hash, old_head_height, fork_height, &candidate);

        match result {
            Ok(()) => {
                let new_hash = candidate.block.hash();
                self.store
                    .set_chain_head(new_hash, candidate.height)
                    .map_err(VerificationError::Store)?;
                self.store
                    .commit_database_batch_write()
                    .map_err(VerificationError::Store)?;
                let _ = self.listeners.send(ChainEvent::Reorganize {
                    old_head: old_head_hash,
                    new_head: new_hash,
                });
                Ok(())
            }
            Err(e) => {
                let _ = self.store.abort_database_batch_write();
                Err(VerificationError::ReorganizeFailed(
                    candidate.block.hash(),
                    e.to_string(),
                ))
            }
        }
    }

    fn reorganize_in_batch(
        &mut self,
        old_head_hash: block::Hash,
        old_head_height: Height,
        fork_height: Height,
        candidate: &StoredBlock,
    ) -> Result<(), VerificationError> {
        // Disconnect the old branch, newest block first.
        let mut cursor = old_head_hash;
        let mut height = old_head_height;
        while height.0 > fork_height.0 {
            let undo = self.store.get_undo(cursor).ok_or_else(|| {
                VerificationError::ReorganizeFailed(candidate.block.hash(), "missing undo data".into())
            })?;
            let changes = undo.changes();
            for (outpoint, utxo) in &changes.spent {
                self.store
                    .add_unspent_transaction_output(*outpoint, utxo.clone())
                    .map_err(VerificationError::Store)?;
            }
            for outpoint in &changes.created {
                self.store.remove_unspent_transaction_output(outpoint);
            }
            let stored = self
                .store
                .get(cursor)
                .ok_or(VerificationError::UnknownParent(cursor))?;
            cursor = stored.block.header.previous_block_hash;
            height = height.previous().expect("fork_height <= height");
        }

        // Reconnect the new branch, oldest block first, re-running full
        // validation (including script verification) against the rebuilt
        // UTXO set.
        let mut chain = Vec::new();
        let mut cursor = candidate.block.header.previous_block_hash;
        let mut cursor_height = candidate.height.previous().expect("candidate is not genesis in a reorg");
        while cursor_height.0 > fork_height.0 {
            let stored = self
                .store
                .get(cursor)
                .ok_or_else(|| VerificationError::UnknownParent(cursor))?;
            cursor = stored.block.header.previous_block_hash;
            cursor_height = stored.height.previous().unwrap_or(Height(0));
            chain.push(stored);
        }
        chain.reverse();
        chain.push(candidate.clone());

        for stored in chain {
            let undo = self.connect_in_batch(&stored)?;
            self.store
                .put(stored, undo)
                .map_err(VerificationError::Store)?;
        }

        Ok(())
    }

    /// Finds the height of the lowest common ancestor of the current head
    /// and `candidate`, by walking the deeper chain up to the shallower
    /// one's height and then both in lockstep.
    fn find_fork_height(
        &self,
        head_hash: block::Hash,
        head_height: Height,
        candidate: &StoredBlock,
    ) -> Result<Height, VerificationError> {
        let mut head_cursor = head_height;
        // `cand_hash` is the candidate's *parent*, one height below
        // `candidate.height`; `cand_cursor` must track the height of
        // `cand_hash` itself, not of `candidate`, to stay in the same
        // (hash, height) convention `head_hash`/`head_cursor` use.
        let mut cand_cursor = candidate.height.previous().unwrap_or(Height(0));
        let mut head_hash = head_hash;
        let mut cand_hash = candidate.block.header.previous_block_hash;

        while cand_cursor.0 > head_cursor.0 {
            let stored = self
                .store
                .get(cand_hash)
                .ok_or(VerificationError::UnknownParent(cand_hash))?;
            cand_hash = stored.block.header.previous_block_hash;
            cand_cursor = stored.height.previous().unwrap_or(Height(0));
        }
        while head_cursor.0 > cand_cursor.0 {
            let stored = self
                .store
                .get(head_hash)
                .ok_or(VerificationError::UnknownParent(head_hash))?;
            head_hash = stored.block.header.previous_block_hash;
            head_cursor = stored.height.previous().unwrap_or(Height(0));
        }

        while head_hash != cand_hash {
            let head_stored = self
                .store
                .get(head_hash)
                .ok_or(VerificationError::UnknownParent(head_hash))?;
            let cand_stored = self
                .store
                .get(cand_hash)
                .ok_or(VerificationError::UnknownParent(cand_hash))?;
            head_hash = head_stored.block.header.previous_block_hash;
            cand_hash = cand_stored.block.header.previous_block_hash;
            head_cursor = head_stored.height.previous().unwrap_or(Height(0));
        }

        Ok(head_cursor)
    }

    /// Validates and connects a single block's
    /// transactions against the live UTXO set, inside an already-open batch.
    /// Returns the undo data needed to later disconnect the block.
    fn connect_in_batch(&mut self, stored: &StoredBlock) -> Result<StoredUndoableBlock, VerificationError> {
        use ember_chain::amount::{Amount, NegativeAllowed, NonNegative};

        let block = &stored.block;
        let height = stored.height;

        let mut changes = TransactionOutputChanges::default();
        let mut fees = Amount::<NegativeAllowed>::zero();
        let mut sigops = 0usize;

        for (tx_index, tx) in block.transactions.iter().enumerate() {
            tx_check::has_inputs_and_outputs(tx)?;
            tx_check::outputs_are_valid(tx)?;

            if tx_index == 0 {
                // Coinbase: no UTXO lookups, just account for its outputs.
                for output in &tx.outputs {
                    sigops += legacy_sigop_count(&output.lock_script);
                }
            } else {
                tx_check::has_no_duplicate_inputs(tx)?;

                let mut inputs_value = Amount::<NegativeAllowed>::zero();
                for (input_index, input) in tx.inputs.iter().enumerate() {
                    let outpoint = match input {
                        ember_chain::transparent::Input::PrevOut { outpoint, .. } => *outpoint,
                        ember_chain::transparent::Input::Coinbase { .. } => {
                            return Err(TransactionError::CoinbaseInputFound.into())
                        }
                    };

                    let utxo = self
                        .store
                        .get_transaction_output(&outpoint)
                        .ok_or(TransactionError::MissingOrSpentOutput(outpoint))?;

                    if utxo.is_coinbase
                        && height.0.saturating_sub(utxo.height.0) < self.params.spendable_coinbase_depth
                    {
                        return Err(TransactionError::ImmatureCoinbaseSpend.into());
                    }

                    let output = ember_chain::transparent::Output {
                        value: utxo.value,
                        lock_script: utxo.script.clone(),
                    };

                    if let ember_chain::transparent::Input::PrevOut { unlock_script, .. } = input {
                        sigops += legacy_sigop_count(unlock_script);
                    }
                    sigops += legacy_sigop_count(&output.lock_script);

                    self.script_verifier
                        .verify(tx, input_index, &outpoint, &output)?;

                    inputs_value = (inputs_value + utxo.value.widen())
                        .map_err(|_| TransactionError::ValueOverflow)?;

                    self.store.remove_unspent_transaction_output(&outpoint);
                    changes.spent.push((outpoint, utxo));
                }

                let outputs_value: Amount<NegativeAllowed> = tx
                    .outputs
                    .iter()
                    .try_fold(Amount::<NonNegative>::zero().widen(), |acc, output| {
                        acc + output.value.widen()
                    })
                    .map_err(|_| TransactionError::ValueOverflow)?;

                let tx_fee = (inputs_value - outputs_value).map_err(|_| TransactionError::ValueOverflow)?;
                if tx_fee.satoshis() < 0 {
                    return Err(TransactionError::ValueOverflow.into());
                }
                fees = (fees + tx_fee).map_err(|_| TransactionError::ValueOverflow)?;
                for output in &tx.outputs {
                    sigops += legacy_sigop_count(&output.lock_script);
                }
            }

            let hash = tx.hash();
            for (index, output) in tx.outputs.iter().enumerate() {
                let outpoint = ember_chain::transparent::OutPoint {
                    hash,
                    index: index as u32,
                };
                let utxo = Utxo::from_output(output, hash, index as u32, height, tx_index == 0);
                self.store
                    .add_unspent_transaction_output(outpoint, utxo)
                    .map_err(VerificationError::Store)?;
                changes.created.push(outpoint);
            }
        }

        if sigops > MAX_BLOCK_SIGOPS {
            return Err(BlockError::TooManySigOps(sigops, MAX_BLOCK_SIGOPS).into());
        }

        let fees_nonneg = Amount::<NonNegative>::try_from(fees.satoshis())
            .map_err(|_| TransactionError::ValueOverflow)?;
        check::subsidy_is_valid(block, self.params.network, fees_nonneg)?;

        Ok(StoredUndoableBlock::Transactions {
            transactions: block.transactions.clone(),
            changes,
        })
    }

    /// Buffers an orphan block, bounded by [`MAX_ORPHANS`]. The newest
    /// orphan is dropped if the pool is already full.
    fn buffer_orphan(&mut self, block: Arc<Block>) {
        if self.orphan_count >= MAX_ORPHANS {
            tracing::warn!(hash = %block.hash(), "orphan pool full, dropping block");
            return;
        }
        let prev = block.header.previous_block_hash;
        self.orphans.entry(prev).or_default().push(block);
        self.orphan_count += 1;
    }

    /// Reprocesses every orphan whose parent is now known, breadth-first, so
    /// a chain of orphans connects as soon as its root arrives.
    fn drain_orphans(&mut self, now: DateTime<Utc>) {
        let mut queue: VecDeque<block::Hash> = self.orphans.keys().copied().collect();

        while let Some(parent_hash) = queue.pop_front() {
            if self.store.get(parent_hash).is_none() {
                continue;
            }
            let children = match self.orphans.remove(&parent_hash) {
                Some(children) => children,
                None => continue,
            };
            for child in children {
                self.orphan_count = self.orphan_count.saturating_sub(1);
                let child_hash = child.hash();
                if self.add_one(child, now).is_ok() {
                    queue.push_back(child_hash);
                }
            }
        }
    }
}

/// A shared, concurrency-safe handle to a [`FullPrunedBlockChain`].
///
/// Calls to [`Chain::add`] are serialized through an internal
/// [`tokio::sync::Mutex`], giving the single-writer linearizability
/// UTXO mutation never races, and `ChainEvent`s are
/// delivered in the order their blocks were connected.
#[derive(Clone)]
pub struct Chain {
    inner: Arc<Mutex<FullPrunedBlockChain>>,
}

impl Chain {
    pub fn new(chain: FullPrunedBlockChain) -> Self {
        Chain {
            inner: Arc::new(Mutex::new(chain)),
        }
    }

    pub async fn add(&self, block: Arc<Block>) -> Result<bool, VerificationError> {
        let now = Utc::now();
        self.inner.lock().await.add(block, now)
    }

    pub async fn tip(&self) -> Option<(block::Hash, Height)> {
        self.inner.lock().await.tip()
    }

    pub async fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.inner.lock().await.subscribe()
    }

    pub async fn orphan_count(&self) -> usize {
        self.inner.lock().await.orphan_count()
    }
}

/// Scenarios 1, 2, 3, and 5 from the generated-chain test suite: a block
/// that must connect or throw, a reorganization across a competing branch,
/// coinbase immaturity, and finalization reclaiming old transaction bodies.
#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use chrono::{DateTime, Duration, NaiveDateTime, Utc};

    use ember_chain::{
        amount::{Amount, NonNegative},
        block::Header,
        parameters::{Network, GENESIS_PREVIOUS_BLOCK_HASH},
        transaction::{LockTime, Transaction},
        transparent::{self, CoinbaseData, Script},
        work::difficulty::CompactDifficulty,
    };
    use ember_state::{in_memory::InMemoryStateService, store::FullPrunedBlockStore};

    use crate::script::AlwaysValid;

    use super::*;

    /// `0x207fffff`: the loosest threshold the compact-difficulty encoding
    /// can represent (exponent 32, maximal mantissa). A block hash still
    /// has to clear it -- about half of nonces do -- so [`mine`] searches.
    const EASY_BITS: u32 = 0x207f_ffff;

    fn base_time() -> DateTime<Utc> {
        DateTime::<Utc>::from_utc(NaiveDateTime::from_timestamp(1_600_000_000, 0), Utc)
    }

    fn test_params(spendable_coinbase_depth: u32) -> Params {
        let mut params = Params::new(Network::Mainnet);
        params.pow_limit = CompactDifficulty::from_bits(EASY_BITS)
            .to_expanded()
            .expect("easy bits expand");
        // The real mainnet checkpoint at height 0 doesn't match our
        // synthetic genesis block below.
        params.checkpoints.clear();
        params.spendable_coinbase_depth = spendable_coinbase_depth;
        params
    }

    fn coinbase_tx(height: block::Height, value: i64, tag: u8) -> Arc<Transaction> {
        let input = transparent::Input::Coinbase {
            height: Some(ember_chain::cached::Cached::from(height)),
            data: CoinbaseData::new(vec![tag]),
            sequence: 0xFFFF_FFFF,
        };
        let output = transparent::Output {
            value: Amount::<NonNegative>::try_from(value).expect("value in range"),
            lock_script: Script(vec![tag]),
        };
        Arc::new(Transaction::new(
            1,
            vec![input],
            vec![output],
            LockTime::unlocked(),
        ))
    }

    fn spend_tx(outpoint: transparent::OutPoint, value: i64, tag: u8) -> Arc<Transaction> {
        let input = transparent::Input::PrevOut {
            outpoint,
            unlock_script: Script(vec![0x51]),
            sequence: 0xFFFF_FFFF,
        };
        let output = transparent::Output {
            value: Amount::<NonNegative>::try_from(value).expect("value in range"),
            lock_script: Script(vec![tag]),
        };
        Arc::new(Transaction::new(
            1,
            vec![input],
            vec![output],
            LockTime::unlocked(),
        ))
    }

    /// Searches nonces until `transactions` forms a block that clears
    /// [`EASY_BITS`], then returns it. Deterministic: `Block::hash` has no
    /// hidden randomness, so the same inputs always land on the same nonce.
    fn mine(
        prev_hash: block::Hash,
        time: DateTime<Utc>,
        transactions: Vec<Arc<Transaction>>,
    ) -> Arc<Block> {
        let merkle_root = transactions.iter().map(|tx| tx.hash()).collect();
        for nonce in 0u32..10_000 {
            let header = Header::new(
                1,
                prev_hash,
                merkle_root,
                time,
                CompactDifficulty::from_bits(EASY_BITS),
                nonce,
            );
            let block = Block {
                header,
                transactions: transactions.clone(),
            };
            if block.verify().is_ok() {
                return Arc::new(block);
            }
        }
        panic!("exhausted nonce search without clearing the easy test difficulty");
    }

    fn test_genesis() -> Arc<Block> {
        mine(
            GENESIS_PREVIOUS_BLOCK_HASH,
            base_time(),
            vec![coinbase_tx(block::Height(0), 5_000_000_000, 0)],
        )
    }

    fn new_chain_with_depth(max_reorg_depth: u32, spendable_coinbase_depth: u32) -> (FullPrunedBlockChain, Arc<Block>) {
        let genesis = test_genesis();
        let store: BoxStore = Box::new(InMemoryStateService::new());
        let chain = FullPrunedBlockChain::new(
            test_params(spendable_coinbase_depth),
            store,
            Arc::new(AlwaysValid),
            max_reorg_depth,
            genesis.clone(),
        );
        (chain, genesis)
    }

    fn new_chain() -> (FullPrunedBlockChain, Arc<Block>) {
        new_chain_with_depth(1000, 100)
    }

    #[test]
    fn genesis_is_the_initial_head() {
        let (chain, genesis) = new_chain();
        assert_eq!(chain.tip(), Some((genesis.hash(), block::Height(0))));
    }

    #[test]
    fn a_simple_chain_connects_block_by_block() {
        let (mut chain, genesis) = new_chain();
        let now = Utc::now();

        let mut prev_hash = genesis.hash();
        let mut time = base_time() + Duration::seconds(600);
        for height in 1..=5u32 {
            let block = mine(
                prev_hash,
                time,
                vec![coinbase_tx(block::Height(height), 5_000_000_000, height as u8)],
            );
            let hash = block.hash();
            assert!(
                chain.add(block, now).expect("block is valid"),
                "height {} should connect",
                height
            );
            assert_eq!(chain.tip(), Some((hash, block::Height(height))));
            prev_hash = hash;
            time = time + Duration::seconds(600);
        }
    }

    #[test]
    fn a_block_reusing_a_transaction_hash_is_rejected_and_head_is_unchanged() {
        let (mut chain, genesis) = new_chain();
        let now = Utc::now();
        let tx = coinbase_tx(block::Height(1), 5_000_000_000, 1);
        // Two copies of the same transaction: the merkle root is still
        // consistent (duplicating the last leaf of an odd level), but this
        // must still be rejected.
        let block = mine(genesis.hash(), base_time() + Duration::seconds(600), vec![tx.clone(), tx]);

        let result = chain.add(block, now);
        assert!(result.is_err());
        assert_eq!(chain.tip(), Some((genesis.hash(), block::Height(0))));
    }

    #[test]
    fn coinbase_spend_is_rejected_before_maturity_and_accepted_after() {
        // A 3-block maturity window keeps the test short: spend attempted
        // at height 2 (depth 2) must fail, at height 3 (depth 3) succeed.
        let (mut chain, genesis) = new_chain_with_depth(1000, 3);
        let now = Utc::now();
        let genesis_outpoint = transparent::OutPoint {
            hash: genesis.transactions[0].hash(),
            index: 0,
        };

        let mut prev_hash = genesis.hash();
        let mut time = base_time() + Duration::seconds(600);

        // Height 1: an unrelated coinbase-only block, to get the spend
        // attempt to height 2.
        let block1 = mine(
            prev_hash,
            time,
            vec![coinbase_tx(block::Height(1), 5_000_000_000, 1)],
        );
        prev_hash = block1.hash();
        time = time + Duration::seconds(600);
        assert!(chain.add(block1, now).unwrap());

        // Height 2: attempt to spend the genesis coinbase at depth 2 -- immature.
        let immature_spend = spend_tx(genesis_outpoint, 4_999_990_000, 2);
        let block2 = mine(
            prev_hash,
            time,
            vec![
                coinbase_tx(block::Height(2), 5_000_010_000, 2),
                immature_spend,
            ],
        );
        let result = chain.add(block2, now);
        assert!(matches!(
            result,
            Err(VerificationError::Transaction(TransactionError::ImmatureCoinbaseSpend))
        ));
        assert_eq!(chain.tip(), Some((prev_hash, block::Height(1))));

        // Height 2 again, this time coinbase-only (so the chain can advance
        // to height 3 where the same spend is mature).
        let block2 = mine(
            prev_hash,
            time,
            vec![coinbase_tx(block::Height(2), 5_000_000_000, 2)],
        );
        prev_hash = block2.hash();
        time = time + Duration::seconds(600);
        assert!(chain.add(block2, now).unwrap());

        // Height 3: the same spend is now mature (depth 3).
        let mature_spend = spend_tx(genesis_outpoint, 4_999_990_000, 3);
        let block3 = mine(
            prev_hash,
            time,
            vec![
                coinbase_tx(block::Height(3), 5_000_010_000, 3),
                mature_spend,
            ],
        );
        assert!(chain.add(block3, now).expect("mature spend connects"));
    }

    #[test]
    fn reorganize_switches_head_and_utxo_to_the_heavier_branch() {
        let (mut chain, genesis) = new_chain();
        let now = Utc::now();
        let mut time = base_time() + Duration::seconds(600);

        // Branch A: two blocks on top of genesis.
        let a1 = mine(genesis.hash(), time, vec![coinbase_tx(block::Height(1), 5_000_000_000, 0xA1)]);
        time = time + Duration::seconds(600);
        let a2 = mine(a1.hash(), time, vec![coinbase_tx(block::Height(2), 5_000_000_000, 0xA2)]);
        time = time + Duration::seconds(600);

        assert!(chain.add(a1.clone(), now).unwrap());
        assert!(chain.add(a2.clone(), now).unwrap());
        assert_eq!(chain.tip(), Some((a2.hash(), block::Height(2))));

        let a2_outpoint = transparent::OutPoint {
            hash: a2.transactions[0].hash(),
            index: 0,
        };
        assert!(chain
            .store
            .get_transaction_output(&a2_outpoint)
            .is_some());

        // Branch B: three blocks from genesis, overtaking A on total work.
        let mut b_time = base_time() + Duration::seconds(600);
        let b1 = mine(genesis.hash(), b_time, vec![coinbase_tx(block::Height(1), 5_000_000_000, 0xB1)]);
        b_time = b_time + Duration::seconds(600);
        let b2 = mine(b1.hash(), b_time, vec![coinbase_tx(block::Height(2), 5_000_000_000, 0xB2)]);
        b_time = b_time + Duration::seconds(600);
        let b3 = mine(b2.hash(), b_time, vec![coinbase_tx(block::Height(3), 5_000_000_000, 0xB3)]);

        assert!(!chain.add(b1.clone(), now).unwrap(), "b1 is only a side branch");
        assert!(!chain.add(b2.clone(), now).unwrap(), "b2 is still behind A");
        assert!(chain.add(b3.clone(), now).unwrap(), "b3 overtakes A's chain work");

        assert_eq!(chain.tip(), Some((b3.hash(), block::Height(3))));

        // A's exclusive outputs are gone; B's are present.
        assert!(chain
            .store
            .get_transaction_output(&a2_outpoint)
            .is_none());
        for block in [&b1, &b2, &b3] {
            let outpoint = transparent::OutPoint {
                hash: block.transactions[0].hash(),
                index: 0,
            };
            assert!(
                chain.store.get_transaction_output(&outpoint).is_some(),
                "B's outputs must be in the UTXO set after reorg"
            );
        }
    }

    #[test]
    fn finalization_drops_full_bodies_past_the_reorg_window() {
        let (mut chain, genesis) = new_chain_with_depth(2, 100);
        let now = Utc::now();
        let mut prev_hash = genesis.hash();
        let mut time = base_time() + Duration::seconds(600);

        let mut hashes = vec![genesis.hash()];
        for height in 1..=5u32 {
            let block = mine(
                prev_hash,
                time,
                vec![coinbase_tx(block::Height(height), 5_000_000_000, height as u8)],
            );
            prev_hash = block.hash();
            time = time + Duration::seconds(600);
            chain.add(block, now).expect("connects");
            hashes.push(prev_hash);
        }

        // Head is at height 5 with max_reorg_depth 2: genesis (0) and
        // height 1-2 are more than 2 blocks behind and must be finalized;
        // heights 3-5 are within the window and keep their full bodies.
        for &height in &[0usize, 1, 2] {
            let undo = chain
                .store
                .get_undo(hashes[height])
                .expect("undo data always exists for a connected block");
            assert!(
                matches!(undo, StoredUndoableBlock::TxOutChanges(_)),
                "block at height {} should be finalized",
                height
            );
        }
        for &height in &[3usize, 4, 5] {
            let undo = chain
                .store
                .get_undo(hashes[height])
                .expect("undo data always exists for a connected block");
            assert!(
                matches!(undo, StoredUndoableBlock::Transactions { .. }),
                "block at height {} should still retain its transactions",
                height
            );
        }
    }
}
