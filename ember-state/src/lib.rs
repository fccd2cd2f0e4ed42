//! Storage and indexing for a pruned, reorganizable Bitcoin block chain.
//!
//! The store keeps every block header and, for blocks within the reorg
//! window, their full transaction bodies; older blocks are finalized down to
//! the UTXO-set deltas needed to undo them. See [`store::FullPrunedBlockStore`]
//! for the interface and [`in_memory::InMemoryStateService`] for the
//! reference implementation used by tests and by default.

pub mod config;
pub mod error;
pub mod in_memory;
pub mod request;
pub mod service;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::StoreError;
pub use request::{HashOrHeight, Request, Response};
pub use service::StateService;
pub use store::FullPrunedBlockStore;
pub use types::{StoredBlock, StoredUndoableBlock, TransactionOutputChanges, Utxo};

/// A boxed, dynamically-dispatched error, matching the convention used by
/// the network and consensus crates' `tower::Service` impls.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
