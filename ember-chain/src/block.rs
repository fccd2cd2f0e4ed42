//! Blocks and block-related structures (heights, headers, etc.)
#![allow(clippy::unit_arg)]

mod hash;
mod header;
mod height;
mod serialize;

pub mod merkle;

#[cfg(any(test, feature = "proptest-impl"))]
mod arbitrary;
#[cfg(test)]
mod tests;

use std::{convert::TryInto, fmt, io::Read, iter::FromIterator, sync::Arc};

use crate::compactint::CompactInt;
use crate::{BitcoinDeserialize, BitcoinSerialize, SerializationError};
use bitcoin_serde_derive::BtcSerialize;
use bytes::{Buf, BytesMut};
pub use hash::Hash;
pub use header::BlockTimeError;
pub use header::{CountedHeader, Header};
pub use height::Height;

use serde::{Deserialize, Serialize};

use crate::{fmt::DisplayToDebug, transaction::Transaction, transparent};

use self::serialize::MAX_BLOCK_BYTES;

/// A Bitcoin block, containing a header and a list of transactions.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, BtcSerialize)]
pub struct Block {
    /// The block header, containing block metadata.
    pub header: Header,
    /// The block transactions.
    pub transactions: Vec<std::sync::Arc<Transaction>>,
}

/// Don't ever use this in production. Seriously.
///
/// Having this method makes testing easier. That's it.
/// TODO: Refactor tests to remove this method. Then burn this method.
impl BitcoinDeserialize for Block {
    fn bitcoin_deserialize<R: Read>(reader: R) -> Result<Self, SerializationError>
    where
        Self: Sized,
    {
        eprintln!("Using Block::bitcoin_deserialize is not safe! It can result in silent data corruption. Seriously, don't.");
        let mut src = reader.bytes().map(|result| match result {
            // For real. Look at this. Don't use this in production. Ever.
            Err(e) => panic!("Error deserializing block! {}", e),
            Ok(byte) => byte,
        });
        let mut src = BytesMut::from_iter(&mut src);
        Block::deserialize_from_buf(&mut src)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fmter = f.debug_struct("Block");
        if let Some(height) = self.coinbase_height() {
            fmter.field("height", &height);
        }

        fmter.field("hash", &DisplayToDebug(self.hash())).finish()
    }
}

/// A structural defect found while verifying a [`Block`] on its own, without
/// reference to the chain it would be connected to.
#[derive(thiserror::Error, Debug)]
pub enum BlockVerifyError {
    /// block has no transactions
    #[error("block has no transactions")]
    NoTransactions,

    /// block's proof of work does not satisfy its own difficulty threshold
    #[error("block hash does not satisfy its difficulty threshold")]
    InvalidProofOfWork,

    /// block's merkle root does not match its transactions
    #[error("merkle root mismatch: header says {expected:?}, transactions hash to {actual:?}")]
    BadMerkleRoot {
        expected: merkle::Root,
        actual: merkle::Root,
    },

    /// a transaction in the block is structurally invalid
    #[error(transparent)]
    Transaction(#[from] crate::transaction::TransactionVerifyError),
}

impl Block {
    /// Checks this block's internal structural validity: its proof of work
    /// satisfies its own difficulty threshold, its transactions merkle-ize to
    /// the root recorded in the header, and each transaction passes its own
    /// structural checks.
    ///
    /// This does not check anything that depends on the rest of the chain
    /// (coinbase maturity, UTXO availability, difficulty retargeting,
    /// checkpoints) -- that's [`crate`]'s caller's job, not this crate's.
    pub fn verify(&self) -> Result<(), BlockVerifyError> {
        if self.transactions.is_empty() {
            return Err(BlockVerifyError::NoTransactions);
        }

        let hash = self.hash();
        if let Some(threshold) = self.header.difficulty_threshold.to_expanded() {
            if hash > threshold {
                return Err(BlockVerifyError::InvalidProofOfWork);
            }
        } else {
            return Err(BlockVerifyError::InvalidProofOfWork);
        }

        let actual_merkle_root: merkle::Root =
            self.transactions.iter().map(|tx| tx.hash()).collect();
        if actual_merkle_root != self.header.merkle_root {
            return Err(BlockVerifyError::BadMerkleRoot {
                expected: self.header.merkle_root,
                actual: actual_merkle_root,
            });
        }

        for transaction in &self.transactions {
            transaction.verify()?;
        }

        Ok(())
    }

    /// Return the block height reported in the coinbase transaction, if any.
    /// Invariant: This method assumes that the height is pre-cached by some early construction/deserialization function.
    /// TODO: this invariant is not upheld by the implementation of bitcoin_deserialize for transparent::Input
    /// Instead, it needs to be delegated to a higher-level function which is aware of the status of BIP34 activation.
    pub fn coinbase_height(&self) -> Option<Height> {
        if let Some(height) = self.header.reported_height() {
            return Some(Height(height as u32));
        }
        self.transactions
            .get(0)
            .and_then(|tx| tx.inputs.get(0))
            .and_then(|input| match input {
                transparent::Input::Coinbase { ref height, .. } => match height {
                    Some(cached_height) => cached_height.value(),
                    None => None,
                },
                _ => None,
            })
    }

    /// Compute the hash of this block.
    pub fn hash(&self) -> Hash {
        Hash::from(self)
    }

    /// Deserializes a block's wire encoding.
    ///
    /// This only performs the structural parsing needed to produce a `Block`
    /// value; it doesn't check proof of work, the merkle root, or any
    /// per-transaction consensus rule. Callers that need those checks call
    /// [`Block::verify`] on the result.
    pub fn deserialize_from_buf(src: &mut BytesMut) -> Result<Self, SerializationError> {
        let header = Header::deserialize_from_buf(src.split_to(Header::len()))?;

        let mut src = src.reader().take(MAX_BLOCK_BYTES - Header::len() as u64);
        let tx_count = {
            let tx_count = CompactInt::bitcoin_deserialize(&mut src)?;
            tx_count.value()
        };

        // Sanity check number of transactions to prevent DOS attacks
        if tx_count > MAX_BLOCK_BYTES / (36 * 4) {
            return Err(SerializationError::Parse(
                "Block contained too many transactions for each to have at least one input",
            ));
        }
        let mut transactions = Vec::with_capacity(
            tx_count
                .try_into()
                .expect("usize::min must be greater than MAX_BLOCK_BYTES / (36 * 4)"),
        );

        for _ in 0..tx_count {
            transactions.push(<Arc<Transaction>>::bitcoin_deserialize(&mut src)?);
        }

        Ok(Block {
            header,
            transactions,
        })
    }
}

impl<'a> From<&'a Block> for Hash {
    fn from(block: &'a Block) -> Hash {
        (&block.header).into()
    }
}
