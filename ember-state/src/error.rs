//! Errors returned by the block store.

use thiserror::Error;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// attempted to commit a batch write with none in progress
    #[error("no database batch write is in progress")]
    NoBatchInProgress,

    /// attempted to begin a batch write while one was already in progress
    #[error("a database batch write is already in progress")]
    BatchAlreadyInProgress,

    /// attempted to finalize past the tip of the store
    #[error("finalization depth {0} exceeds the height of the chain")]
    FinalizeDepthExceedsChain(u32),

    /// the requested height or hash is not present in the store
    #[error("block not found")]
    NotFound,
}
