//! Types stored by a [`crate::store::FullPrunedBlockStore`].

use std::sync::Arc;

use ember_chain::{
    amount::{Amount, NonNegative},
    block::{self, Block},
    transaction,
    transparent::{self, Script},
    work::difficulty::Work,
};

/// A UTXO, as recorded in the store's unspent-output index.
///
/// This is the same information carried by a [`transparent::Output`], plus
/// the bookkeeping the store needs to answer maturity and undo questions
/// without re-parsing the transaction that created it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Utxo {
    /// The transaction that created this output.
    pub hash: transaction::Hash,
    /// The index of this output within that transaction.
    pub index: u32,
    /// The value of the output.
    pub value: Amount<NonNegative>,
    /// The output's locking script.
    pub script: Script,
    /// The height of the block that created this output.
    pub height: block::Height,
    /// Whether the output was created by a coinbase transaction (and is
    /// therefore subject to the maturity rule before it can be spent).
    pub is_coinbase: bool,
}

impl Utxo {
    pub fn from_output(
        output: &transparent::Output,
        hash: transaction::Hash,
        index: u32,
        height: block::Height,
        is_coinbase: bool,
    ) -> Self {
        Utxo {
            hash,
            index,
            value: output.value,
            script: output.lock_script.clone(),
            height,
            is_coinbase,
        }
    }
}

/// A block as committed to the store: its header, transactions, height, and
/// the cumulative chain work up to and including it.
#[derive(Clone, Debug)]
pub struct StoredBlock {
    pub block: Arc<Block>,
    pub height: block::Height,
    pub cumulative_work: Work,
}

/// The per-output deltas needed to undo a block's effect on the UTXO set,
/// without retaining the block's full transaction bodies.
#[derive(Clone, Debug, Default)]
pub struct TransactionOutputChanges {
    /// Outputs this block spent, keyed by the outpoint they consumed. The
    /// stored [`Utxo`] is the value that must be reinstated on rollback.
    pub spent: Vec<(transparent::OutPoint, Utxo)>,
    /// Outpoints this block created. Reinstating the block removes these
    /// from the UTXO set.
    pub created: Vec<transparent::OutPoint>,
}

/// Undo information for a committed block.
///
/// The [`TransactionOutputChanges`] needed to disconnect the block are
/// always present, computed once when the block was connected (that's the
/// only point at which the value of a spent output is still at hand). While
/// a block is within the reorg window its full transaction list is also
/// kept alongside those changes, for callers that want the original body.
/// Once a block is finalized (older than the reorg window) the transaction
/// list is dropped and only the output deltas survive.
#[derive(Clone, Debug)]
pub enum StoredUndoableBlock {
    Transactions {
        transactions: Vec<Arc<transaction::Transaction>>,
        changes: TransactionOutputChanges,
    },
    TxOutChanges(TransactionOutputChanges),
}

impl StoredUndoableBlock {
    /// Returns the output-level changes needed to disconnect this block,
    /// regardless of whether its transaction bodies are still retained.
    pub fn changes(&self) -> &TransactionOutputChanges {
        match self {
            StoredUndoableBlock::Transactions { changes, .. } => changes,
            StoredUndoableBlock::TxOutChanges(changes) => changes,
        }
    }
}
