pub(crate) mod generate;
mod prop;

use super::serialize::MAX_BLOCK_BYTES;
use crate::serialization::BitcoinSerialize;

#[test]
fn large_multi_transaction_block_is_under_the_limit() {
    let block = generate::large_multi_transaction_block();
    let bytes = block.bitcoin_serialize_to_vec().unwrap();
    assert!(bytes.len() as u64 <= MAX_BLOCK_BYTES);
}

#[test]
fn oversized_multi_transaction_block_is_over_the_limit() {
    let block = generate::oversized_multi_transaction_block();
    let bytes = block.bitcoin_serialize_to_vec().unwrap();
    assert!(bytes.len() as u64 > MAX_BLOCK_BYTES);
}

#[test]
fn large_single_transaction_block_is_under_the_limit() {
    let block = generate::large_single_transaction_block();
    let bytes = block.bitcoin_serialize_to_vec().unwrap();
    assert!(bytes.len() as u64 <= MAX_BLOCK_BYTES);
}

#[test]
fn oversized_single_transaction_block_is_over_the_limit() {
    let block = generate::oversized_single_transaction_block();
    let bytes = block.bitcoin_serialize_to_vec().unwrap();
    assert!(bytes.len() as u64 > MAX_BLOCK_BYTES);
}
