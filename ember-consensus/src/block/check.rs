//! Consensus check functions

use chrono::{DateTime, Utc};

use ember_chain::{
    block::{Block, Hash, Header, Height},
    parameters::Network,
    transaction,
    work::difficulty::ExpandedDifficulty,
};

use crate::error::*;

use super::subsidy;

/// Returns `Ok(())` if there is exactly one coinbase transaction in `Block`,
/// and that coinbase transaction is the first transaction in the block.
///
/// The first (and only the first) transaction in a block is a coinbase
/// transaction, which collects and spends any block subsidy and transaction
/// fees paid by the other transactions in the block.
pub fn coinbase_is_first(block: &Block) -> Result<(), BlockError> {
    let first = block
        .transactions
        .get(0)
        .ok_or(BlockError::NoTransactions)?;
    let mut rest = block.transactions.iter().skip(1);
    if !first.is_coinbase() {
        return Err(TransactionError::CoinbasePosition)?;
    }
    if rest.any(|tx| tx.contains_coinbase_input()) {
        return Err(TransactionError::CoinbaseInputFound)?;
    }

    Ok(())
}

/// Returns `Ok(())` if `hash` passes:
///   - `pow_limit`, the network's target difficulty limit (PoWLimit), and
///   - the difficulty filter,
/// based on the fields in `header`.
///
/// If the block is invalid, returns an error containing `height` and `hash`.
pub fn difficulty_is_valid(
    header: &Header,
    network: Network,
    pow_limit: ExpandedDifficulty,
    height: &Height,
    hash: &Hash,
) -> Result<(), BlockError> {
    let difficulty_threshold = header
        .difficulty_threshold
        .to_expanded()
        .ok_or(BlockError::InvalidDifficulty(*height, *hash))?;

    // Note: the comparisons in this function are u256 integer comparisons, like
    // core clients. Greater values represent *less* work.

    // The PowLimit check doesn't actually depend on any previous blocks,
    // so it's checked here rather than during context validation.
    if difficulty_threshold > pow_limit {
        Err(BlockError::TargetDifficultyLimit(
            *height,
            *hash,
            difficulty_threshold,
            network,
            pow_limit,
        ))?;
    }

    // The difficulty filter is also context-free. Testnet's minimum-difficulty
    // rule (blocks more than 20 minutes apart may use the minimum difficulty) is
    // a change to the retarget algorithm, not to this filter, so it's handled
    // during context validation instead.
    if hash > &difficulty_threshold {
        Err(BlockError::DifficultyFilter(
            *height,
            *hash,
            difficulty_threshold,
            network,
        ))?;
    }

    Ok(())
}

/// Returns `Ok(())` if the coinbase output total in `block` does not exceed
/// the block subsidy for its height plus `fees`, the sum of the transaction
/// fees paid by every other transaction in the block.
pub fn subsidy_is_valid(
    block: &Block,
    network: Network,
    fees: ember_chain::amount::Amount<ember_chain::amount::NonNegative>,
) -> Result<(), BlockError> {
    let height = block.coinbase_height().ok_or(SubsidyError::NoCoinbase)?;
    let coinbase = block.transactions.get(0).ok_or(SubsidyError::NoCoinbase)?;

    let subsidy = subsidy::general::block_subsidy(height, network)?;
    let limit = (subsidy.widen() + fees.widen()).map_err(|_| SubsidyError::Amount(
        ember_chain::amount::Error::Addition,
    ))?;

    let coinbase_total: i64 = coinbase.outputs.iter().map(|o| o.value.satoshis()).sum();

    if coinbase_total > limit.satoshis() {
        return Err(SubsidyError::SubsidyTooHigh {
            total: coinbase_total,
            limit: limit.satoshis(),
        })?;
    }

    Ok(())
}

/// Returns `Ok(())` if `header.time` is less than or equal to
/// 2 hours in the future, according to the node's local clock (`now`).
///
/// This is a non-deterministic rule, as clocks vary over time and between
/// nodes, so it isn't strictly a consensus rule: a block rejected under this
/// check now may be accepted later once `now` catches up to it.
///
/// If the header time is invalid, returns an error containing `height` and `hash`.
pub fn time_is_valid_at(
    header: &Header,
    now: DateTime<Utc>,
    height: &Height,
    hash: &Hash,
) -> Result<(), ember_chain::block::BlockTimeError> {
    header.time_is_valid_at(now, height, hash)
}

/// Check Merkle root validity.
///
/// `transaction_hashes` is a precomputed list of transaction hashes.
pub fn merkle_root_validity(
    block: &Block,
    transaction_hashes: &[transaction::Hash],
) -> Result<(), BlockError> {
    let merkle_root = transaction_hashes.iter().cloned().collect();

    if block.header.merkle_root != merkle_root {
        return Err(BlockError::BadMerkleRoot {
            actual: merkle_root,
            expected: block.header.merkle_root,
        });
    }

    // Bitcoin's transaction Merkle trees are malleable, allowing blocks with
    // duplicate transactions to have the same Merkle root as blocks without
    // duplicate transactions. Duplicate transactions should cause a block to be
    // rejected, as duplicate transactions imply that the block contains a
    // double-spend.  As a defense-in-depth, however, we also check that there
    // are no duplicate transaction hashes, by collecting into a HashSet.
    use std::collections::HashSet;
    if transaction_hashes.len() != transaction_hashes.iter().collect::<HashSet<_>>().len() {
        return Err(BlockError::DuplicateTransaction);
    }

    Ok(())
}
