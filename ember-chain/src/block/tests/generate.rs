//! Hand-built blocks used by size-limit and serialization tests.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::{iter::FromIterator, sync::Arc};

use crate::{
    transaction::{LockTime, Transaction},
    transparent::{self, CoinbaseData, Script},
    work::difficulty::CompactDifficulty,
};

use super::super::{serialize::MAX_BLOCK_BYTES, merkle, Block, Hash, Header};

/// Builds a block header with arbitrary-but-fixed field values.
pub fn block_header() -> Header {
    Header::new(
        4,
        Hash([0; 32]),
        merkle::Root([0; 32]),
        DateTime::<Utc>::from_utc(NaiveDateTime::from_timestamp(1_231_006_505, 0), Utc),
        CompactDifficulty::from_bits(0x1d00ffff),
        2083236893,
    )
}

fn dummy_transaction() -> Transaction {
    let input = transparent::Input::PrevOut {
        outpoint: transparent::OutPoint {
            hash: crate::transaction::Hash([7; 32]),
            index: 0,
        },
        unlock_script: Script(vec![0x51]),
        sequence: 0xFFFF_FFFF,
    };
    let output = dummy_output();
    Transaction::new(1, vec![input], vec![output], LockTime::unlocked())
}

fn dummy_output() -> transparent::Output {
    use crate::amount::{Amount, NonNegative};
    use std::convert::TryFrom;

    transparent::Output {
        value: Amount::<NonNegative>::try_from(5_000_000_000i64).unwrap(),
        lock_script: Script(vec![0x76, 0xa9, 0x14]),
    }
}

/// Generate a block with multiple transactions just below limit
pub fn large_multi_transaction_block() -> Block {
    multi_transaction_block(false)
}

/// Generate a block with one transaction and multiple inputs just below limit
pub fn large_single_transaction_block() -> Block {
    single_transaction_block(false)
}

/// Generate a block with multiple transactions just above limit
pub fn oversized_multi_transaction_block() -> Block {
    multi_transaction_block(true)
}

/// Generate a block with one transaction and multiple inputs just above limit
pub fn oversized_single_transaction_block() -> Block {
    single_transaction_block(true)
}

fn multi_transaction_block(oversized: bool) -> Block {
    let tx = dummy_transaction();
    let coinbase_input = transparent::Input::Coinbase {
        height: None,
        data: CoinbaseData(Vec::new()),
        sequence: 0,
    };
    let output = dummy_output();
    let coinbase = Transaction::new(
        1,
        vec![coinbase_input],
        vec![output],
        LockTime::Height(crate::block::Height(0)),
    );

    let header = block_header();
    let header_len = Header::len();
    let tx_len = tx.len();

    let mut max_transactions_in_block =
        (MAX_BLOCK_BYTES as usize - header_len - coinbase.len()) / tx_len;
    if oversized {
        max_transactions_in_block += 1;
    }

    let transactions = std::iter::once(Arc::new(coinbase))
        .chain(std::iter::repeat(Arc::new(tx)))
        .take(max_transactions_in_block + 1)
        .collect::<Vec<_>>();

    let mut header = header;
    header.merkle_root = merkle::Root::from_iter(transactions.iter().map(|tx| tx.hash()));

    Block {
        header,
        transactions,
    }
}

fn single_transaction_block(oversized: bool) -> Block {
    let coinbase = transparent::Input::Coinbase {
        height: None,
        data: CoinbaseData(Vec::new()),
        sequence: 0,
    };
    let output = dummy_output();

    let header = block_header();
    let header_len = Header::len();

    let lock_time = LockTime::Time(DateTime::<Utc>::from_utc(
        NaiveDateTime::from_timestamp(61, 0),
        Utc,
    ));

    let output_len = output.len();
    let coinbase_len = coinbase.len();
    let lock_time_len = 4;

    let mut max_outputs_in_tx =
        (MAX_BLOCK_BYTES as usize - header_len - coinbase_len - lock_time_len) / output_len;
    if oversized {
        max_outputs_in_tx += 1;
    }

    let inputs = vec![coinbase];
    let outputs = std::iter::repeat(output).take(max_outputs_in_tx).collect();

    let big_transaction = Transaction::new(1, inputs, outputs, lock_time);

    let transactions = vec![Arc::new(big_transaction)];
    let mut header = header;
    header.merkle_root = merkle::Root::from_iter(transactions.iter().map(|tx| tx.hash()));

    Block {
        header,
        transactions,
    }
}
