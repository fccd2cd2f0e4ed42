//! Error types for block, transaction, and subsidy validation.

use ember_chain::{block, parameters::Network, work::difficulty::ExpandedDifficulty};
use thiserror::Error;

/// An error describing why a block failed validation.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum BlockError {
    /// block has no transactions
    #[error("block has no transactions")]
    NoTransactions,

    /// block {1:?} has invalid difficulty threshold {0:?}
    #[error("block {1:?} has invalid difficulty threshold")]
    InvalidDifficulty(block::Height, block::Hash),

    /// block {1:?} difficulty threshold {2:?} is less than the {3:?} minimum of {4:?}
    #[error("block {1:?} difficulty threshold is above the network minimum difficulty")]
    TargetDifficultyLimit(
        block::Height,
        block::Hash,
        ExpandedDifficulty,
        Network,
        ExpandedDifficulty,
    ),

    /// block {1:?} hash does not meet the difficulty threshold {2:?}
    #[error("block {1:?} hash does not meet the difficulty threshold")]
    DifficultyFilter(block::Height, block::Hash, ExpandedDifficulty, Network),

    /// block has a merkle root mismatch
    #[error("block merkle root {expected:?} does not match computed root {actual:?}")]
    BadMerkleRoot {
        actual: block::merkle::Root,
        expected: block::merkle::Root,
    },

    /// block contains duplicate transactions
    #[error("block contains duplicate transactions")]
    DuplicateTransaction,

    /// block subsidy is invalid
    #[error(transparent)]
    Subsidy(#[from] SubsidyError),

    /// block fails a structural or contextual transaction check
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// block time is invalid
    #[error(transparent)]
    Time(#[from] block::BlockTimeError),

    /// block contains too many signature operations
    #[error("block contains {0} signature operations, more than the {1} limit")]
    TooManySigOps(usize, usize),

    /// block does not build on the current chain tip
    #[error("block's previous_block_hash {0:?} does not match the current chain tip")]
    NonContiguous(block::Hash),

    /// block's height does not match an expected checkpoint
    #[error("block at height {0:?} does not match the checkpoint hash {1:?}")]
    CheckpointMismatch(block::Height, block::Hash),

    /// block's difficulty_threshold does not match the retarget computed from its parents
    #[error("block at height {0:?} has difficulty_threshold {2:#x}, expected {1:#x} after retargeting")]
    BadDifficultyAdjustment(block::Height, u32, u32),

    /// block's time is not greater than the median of the preceding 11 block times
    #[error("block at height {0:?} has time {1:?}, which is not after the median-time-past {2:?}")]
    TimeTooOld(
        block::Height,
        chrono::DateTime<chrono::Utc>,
        chrono::DateTime<chrono::Utc>,
    ),
}

/// An error describing why a transaction failed validation.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum TransactionError {
    /// the coinbase transaction must be the first in the block
    #[error("coinbase transaction must be the first in the block")]
    CoinbasePosition,

    /// coinbase input found in a non-coinbase transaction
    #[error("coinbase input found in a non-coinbase transaction")]
    CoinbaseInputFound,

    /// transaction has no inputs
    #[error("transaction has no inputs")]
    NoInputs,

    /// transaction has no outputs
    #[error("transaction has no outputs")]
    NoOutputs,

    /// transaction spends the same outpoint twice
    #[error("transaction spends the same outpoint twice")]
    DuplicateInput,

    /// transaction output value sum overflows the money supply
    #[error("transaction output total overflows the money supply")]
    OutputOverflow,

    /// transaction attempts to spend a nonexistent or already-spent output
    #[error("transaction spends a nonexistent or already-spent output {0:?}")]
    MissingOrSpentOutput(ember_chain::transparent::OutPoint),

    /// transaction spends more than it has available
    #[error("transaction spends more than the sum of its inputs")]
    ValueOverflow,

    /// coinbase output spent before reaching maturity
    #[error("coinbase output spent before reaching the maturity depth")]
    ImmatureCoinbaseSpend,

    /// script evaluation failed
    #[error("script evaluation failed: {0}")]
    InvalidScript(String),

    /// transaction locktime has not been reached
    #[error("transaction locktime has not been reached")]
    LockTimeNotReached,
}

/// An error describing why a block's coinbase subsidy is invalid.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum SubsidyError {
    /// block does not contain a coinbase transaction
    #[error("block does not have a coinbase transaction")]
    NoCoinbase,

    /// coinbase output total exceeds the block subsidy plus fees
    #[error("coinbase output total {total} exceeds the subsidy+fees limit {limit}")]
    SubsidyTooHigh { total: i64, limit: i64 },

    /// the subsidy amount itself could not be represented
    #[error(transparent)]
    Amount(#[from] ember_chain::amount::Error),
}

/// Errors surfaced by the chain engine while connecting or reorganizing.
///
/// Combines [`BlockError`] with the store-facing failures (missing parent,
/// failed reorg) that only arise once a block is validated in the context of
/// the chain it's being added to.
#[derive(Error, Debug)]
pub enum VerificationError {
    /// {0}
    #[error(transparent)]
    Block(#[from] BlockError),

    /// {0}
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// the parent of this block is not known
    #[error("parent block {0:?} is not known")]
    UnknownParent(block::Hash),

    /// chain reorganization failed and was rolled back
    #[error("reorganization to block {0:?} failed and was rolled back: {1}")]
    ReorganizeFailed(block::Hash, String),

    /// the orphan pool is full and the block was dropped
    #[error("orphan pool is full, dropped block {0:?}")]
    OrphanPoolFull(block::Hash),

    /// a block's own structural checks (header, Merkle root, transactions) failed
    #[error(transparent)]
    Structural(#[from] ember_chain::block::BlockVerifyError),

    /// the store reported an I/O or consistency failure
    #[error(transparent)]
    Store(#[from] ember_state::StoreError),
}
