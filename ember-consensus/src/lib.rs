//! Consensus rules for a full-pruned Bitcoin block chain: structural and
//! contextual block/transaction validation, subsidy and difficulty
//! arithmetic, and the [`chain::FullPrunedBlockChain`] engine that ties them
//! together with a [`ember_state::store::FullPrunedBlockStore`] to connect,
//! reorganize, and finalize blocks.

pub mod block;
pub mod chain;
pub mod error;
pub mod parameters;
pub mod script;
pub mod transaction;

pub use chain::{Chain, ChainEvent, FullPrunedBlockChain};
pub use error::{BlockError, SubsidyError, TransactionError, VerificationError};
pub use parameters::Params;
pub use script::{batch::BatchVerifier, AlwaysValid, ScriptVerifier};
