//! Peer-to-peer networking for a Bitcoin full node: the wire protocol codec,
//! a single peer's connection state machine, and the `PeerGroup` supervisor
//! that maintains a pool of outbound connections.
//!
//! This crate has no knowledge of chain validation; it only knows how to
//! speak the wire protocol and keep a healthy set of peers connected. The
//! chain engine consumes [`peer_set::PeerGroup`] to download blocks and
//! relay transactions.

pub mod address_book;
pub mod config;
pub mod constants;
pub mod error;
pub mod meta_addr;
pub mod peer;
pub mod peer_set;
pub mod protocol;

pub use config::Config;
pub use error::{BoxError, PeerError};
pub use meta_addr::MetaAddr;
pub use peer_set::{GroupEvent, PeerGroup};
