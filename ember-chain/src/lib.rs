//! The core data structures used by a Bitcoin full node: blocks, transactions,
//! the transparent (non-script) parts of the legacy transaction format, the
//! amount type, and the consensus-critical serialization that ties them to
//! their on-wire byte representation.
//!
//! This crate has no knowledge of the network or of chain state; it only
//! describes what a block or transaction *is* and how to encode, decode, and
//! hash one.

#![allow(clippy::unit_arg)]

pub mod amount;
pub mod block;
pub mod cached;
pub mod compactint;
pub mod fmt;
pub mod parameters;
pub mod serialization;
pub mod transaction;
pub mod transparent;
pub mod work;

pub use serialization::{BitcoinDeserialize, BitcoinDeserializeInto, BitcoinSerialize, SerializationError};
