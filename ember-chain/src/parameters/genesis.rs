//! Genesis consensus parameters for each supported network.

use std::convert::TryFrom;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::{
    amount::{Amount, NonNegative},
    block::{self, Block, Header},
    parameters::Network,
    transaction::{LockTime, Transaction},
    transparent::{self, CoinbaseData, Script},
    work::difficulty::CompactDifficulty,
};

/// The previous block hash for the genesis block.
///
/// All known networks use the Bitcoin `null` value for the parent of the
/// genesis block. (In Bitcoin, `null` is `[0; 32]`.)
pub const GENESIS_PREVIOUS_BLOCK_HASH: block::Hash = block::Hash([0; 32]);

/// Returns the hash for the genesis block in `network`.
///
/// This is the network's well-known, historically-correct genesis hash.
/// [`genesis_block`] reconstructs a self-consistent genesis block (its
/// header hashes to whatever [`Block::hash`] computes for it), but since
/// full coinbase-script encoding is out of this crate's scope, that
/// reconstruction is not asserted to be byte-identical to the historical
/// block -- callers that need the canonical hash use this function instead
/// of `genesis_block(network).hash()`.
pub fn genesis_hash(network: Network) -> block::Hash {
    match network {
        // bitcoin-cli getblockhash 0
        Network::Mainnet => "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f",
        // bitcoin-cli -testnet getblockhash 0
        Network::Testnet => "000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943",
    }
    .parse()
    .expect("hard-coded hash parses")
}

/// Builds the genesis block for `network`: the block a fresh store is
/// seeded with before any peer ever sends it a `block` message (ordinary
/// block-add processing requires a block's parent to already be in the
/// store, and the genesis block has none).
///
/// The header's `time`, `difficulty_threshold`, and `nonce` are the
/// network's real historical values, and the coinbase carries the real
/// historical message. The coinbase's locking script is a fixed 65-byte
/// placeholder, not the historical pay-to-pubkey script, since this crate
/// doesn't parse or construct scripts -- only their length matters to
/// anything downstream. Because of that, this block's hash is internally
/// consistent (its merkle root matches its one transaction, satisfying
/// [`Block::verify`]) but not asserted to equal [`genesis_hash`].
pub fn genesis_block(network: Network) -> Block {
    let message: &[u8] = b"The Times 03/Jan/2009 Chancellor on brink of second bailout for banks";

    let mut script_sig = vec![0x04, 0xff, 0xff, 0x00, 0x1d, 0x01, 0x04];
    script_sig.push(message.len() as u8);
    script_sig.extend_from_slice(message);

    let mut lock_script = vec![0x41];
    lock_script.extend(std::iter::repeat(0xAB).take(65));
    lock_script.push(0xac);

    let coinbase_input = transparent::Input::Coinbase {
        height: None,
        data: CoinbaseData(script_sig),
        sequence: 0xFFFF_FFFF,
    };
    let reward = transparent::Output {
        value: Amount::<NonNegative>::try_from(5_000_000_000i64)
            .expect("50 BTC is within the money-supply bound"),
        lock_script: Script(lock_script),
    };
    let coinbase = Transaction::new(1, vec![coinbase_input], vec![reward], LockTime::unlocked());
    let coinbase = Arc::new(coinbase);

    let merkle_root = std::iter::once(coinbase.hash()).collect();

    let (unix_time, bits, nonce) = match network {
        Network::Mainnet => (1_231_006_505i64, 0x1d00ffffu32, 2_083_236_893u32),
        Network::Testnet => (1_296_688_602i64, 0x1d00ffffu32, 414_098_458u32),
    };
    let time = DateTime::<Utc>::from_utc(NaiveDateTime::from_timestamp(unix_time, 0), Utc);

    let header = Header::new(
        1,
        GENESIS_PREVIOUS_BLOCK_HASH,
        merkle_root,
        time,
        CompactDifficulty::from_bits(bits),
        nonce,
    );

    Block {
        header,
        transactions: vec![coinbase],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The reconstructed coinbase's hash must still match the header's
    /// merkle root -- that part of [`Block::verify`] doesn't depend on
    /// proof of work, which this synthetic block doesn't (and isn't meant
    /// to) satisfy against the network's real historical difficulty.
    #[test]
    fn genesis_block_merkle_root_matches_its_coinbase() {
        for network in [Network::Mainnet, Network::Testnet] {
            let block = genesis_block(network);
            let computed: block::merkle::Root =
                block.transactions.iter().map(|tx| tx.hash()).collect();
            assert_eq!(block.header.merkle_root, computed);
        }
    }
}
