//! Activation heights for Bitcoin soft forks that changed consensus rules.

use NetworkUpgrade::*;

use crate::block;
use crate::parameters::{Network, Network::*};

use std::collections::BTreeMap;
use std::ops::Bound::*;

use chrono::{DateTime, Duration, Utc};

/// A Bitcoin soft fork that changed the network protocol or consensus rules
/// in a backwards-compatible way.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum NetworkUpgrade {
    /// The protocol at the Genesis block, before any soft forks had been activated.
    Genesis,
    /// [`BIP 34`](https://github.com/bitcoin/bips/blob/master/bip-0034.mediawiki):
    /// blocks must contain their height (number) in the coinbase input, and
    /// version-2 blocks were introduced. Active since core v0.7.0; enforced
    /// for version-2 blocks as of block 224413, and mandatory for all blocks
    /// since block 227931.
    BIP34,
    /// [`BIP 66`](https://github.com/bitcoin/bips/blob/master/bip-0066.mediawiki):
    /// strict DER signature encoding, introduced with version-3 blocks.
    BIP66,
    /// [`BIP 65`](https://github.com/bitcoin/bips/blob/master/bip-0065.mediawiki):
    /// `OP_CHECKLOCKTIMEVERIFY`.
    BIP65,
    /// [`BIP 112`](https://github.com/bitcoin/bips/blob/master/bip-0112.mediawiki):
    /// `OP_CHECKSEQUENCEVERIFY`.
    CSV,
    /// Segregated Witness: moves witness data (signatures, scripts) out of
    /// the legacy transaction serialization and into a separate structure
    /// committed to by the coinbase transaction. Includes BIP 141, 143, 144
    /// and 145.
    SegWit,
}

/// Mainnet soft fork activation heights.
///
/// This is actually a bijective map, but it is const, so we use a vector and
/// check uniqueness in the unit tests.
pub(crate) const MAINNET_ACTIVATION_HEIGHTS: &[(block::Height, NetworkUpgrade)] = &[
    (block::Height(0), Genesis),
    (block::Height(227931), BIP34),
    (block::Height(363725), BIP66),
    (block::Height(388381), BIP65),
    (block::Height(419328), CSV),
    (block::Height(481824), SegWit),
];

/// Testnet soft fork activation heights.
pub(crate) const TESTNET_ACTIVATION_HEIGHTS: &[(block::Height, NetworkUpgrade)] = &[
    (block::Height(0), Genesis),
    (block::Height(21111), BIP34),
    (block::Height(330776), BIP66),
    (block::Height(581885), BIP65),
    (block::Height(770112), CSV),
    (block::Height(834624), SegWit),
];

/// The target block spacing, in seconds.
const POW_TARGET_SPACING: i64 = 10 * 60;

/// The number of blocks in a difficulty retarget window.
pub const POW_AVERAGING_WINDOW: usize = 2016;

/// The multiplier used to derive the testnet minimum-difficulty block time gap.
const TESTNET_MINIMUM_DIFFICULTY_GAP_MULTIPLIER: i32 = 2;

impl NetworkUpgrade {
    /// Returns the activation heights for `network`, keyed by height.
    ///
    /// If a future soft fork's activation height is not yet known, it does
    /// not appear in this list.
    pub(crate) fn activation_list(network: Network) -> BTreeMap<block::Height, NetworkUpgrade> {
        match network {
            Mainnet => MAINNET_ACTIVATION_HEIGHTS,
            Testnet => TESTNET_ACTIVATION_HEIGHTS,
        }
        .iter()
        .cloned()
        .collect()
    }

    /// Returns the active soft fork for `network` and `height`.
    pub fn current(network: Network, height: block::Height) -> NetworkUpgrade {
        NetworkUpgrade::activation_list(network)
            .range(..=height)
            .map(|(_, nu)| *nu)
            .next_back()
            .expect("every height has a current soft fork, Genesis at minimum")
    }

    /// Returns the next soft fork scheduled to activate after `height`, if any.
    pub fn next(network: Network, height: block::Height) -> Option<NetworkUpgrade> {
        NetworkUpgrade::activation_list(network)
            .range((Excluded(height), Unbounded))
            .map(|(_, nu)| *nu)
            .next()
    }

    /// Returns the activation height for this soft fork on `network`.
    pub fn activation_height(&self, network: Network) -> Option<block::Height> {
        NetworkUpgrade::activation_list(network)
            .iter()
            .filter(|(_, nu)| nu == &self)
            .map(|(height, _)| *height)
            .next()
    }

    /// Returns the target block spacing.
    pub fn target_spacing(&self) -> Duration {
        Duration::seconds(POW_TARGET_SPACING)
    }

    /// Returns the target block spacing for `network` and `height`.
    pub fn target_spacing_for_height(network: Network, height: block::Height) -> Duration {
        NetworkUpgrade::current(network, height).target_spacing()
    }

    /// Returns the minimum difficulty block spacing for `network` and `height`,
    /// or `None` if the testnet minimum-difficulty rule doesn't apply.
    pub fn minimum_difficulty_spacing_for_height(
        network: Network,
        height: block::Height,
    ) -> Option<Duration> {
        match network {
            Network::Mainnet => None,
            Network::Testnet => {
                let current = NetworkUpgrade::current(network, height);
                Some(current.target_spacing() * TESTNET_MINIMUM_DIFFICULTY_GAP_MULTIPLIER)
            }
        }
    }

    /// Returns whether the gap between `block_time` and `previous_block_time`
    /// is large enough to trigger testnet's minimum-difficulty rule.
    pub fn is_testnet_min_difficulty_block(
        network: Network,
        block_height: block::Height,
        block_time: DateTime<Utc>,
        previous_block_time: DateTime<Utc>,
    ) -> bool {
        let block_time_gap = block_time - previous_block_time;
        match NetworkUpgrade::minimum_difficulty_spacing_for_height(network, block_height) {
            Some(min_difficulty_gap) => block_time_gap > min_difficulty_gap,
            None => false,
        }
    }

    /// Returns the difficulty-retarget averaging window timespan for this soft fork.
    pub fn averaging_window_timespan(&self) -> Duration {
        self.target_spacing() * (POW_AVERAGING_WINDOW as _)
    }

    /// Returns the averaging window timespan for `network` and `height`.
    pub fn averaging_window_timespan_for_height(network: Network, height: block::Height) -> Duration {
        NetworkUpgrade::current(network, height).averaging_window_timespan()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn activation_heights_are_unique_and_sorted() {
        for list in &[MAINNET_ACTIVATION_HEIGHTS, TESTNET_ACTIVATION_HEIGHTS] {
            let mut seen = HashSet::new();
            let mut last_height = None;
            for (height, _) in list.iter() {
                assert!(seen.insert(*height), "duplicate activation height");
                if let Some(last) = last_height {
                    assert!(*height > last, "activation heights must be increasing");
                }
                last_height = Some(*height);
            }
        }
    }

    #[test]
    fn current_at_genesis_is_genesis() {
        assert_eq!(
            NetworkUpgrade::current(Network::Mainnet, block::Height(0)),
            NetworkUpgrade::Genesis
        );
    }

    #[test]
    fn current_after_segwit_activation() {
        assert_eq!(
            NetworkUpgrade::current(Network::Mainnet, block::Height(481824)),
            NetworkUpgrade::SegWit
        );
        assert_eq!(
            NetworkUpgrade::current(Network::Mainnet, block::Height(481823)),
            NetworkUpgrade::CSV
        );
    }
}
