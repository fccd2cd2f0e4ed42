//! Proof-of-work difficulty representations and conversions.
//!
//! Bitcoin headers carry difficulty as a 4-byte "compact" floating-point
//! encoding (`nBits`). Comparisons against a block hash, and the arithmetic
//! used for difficulty retargeting, need the expanded 256-bit integer form
//! instead. [`CompactDifficulty`] is the wire representation; [`ExpandedDifficulty`]
//! and [`Work`] are derived, in-memory-only representations.

use std::{
    cmp::{Ordering, PartialOrd},
    fmt,
};

use primitive_types::U256;

use crate::{
    block::Hash,
    parameters::Network,
    serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError},
};

/// A 4-byte compact representation of a 256-bit difficulty threshold, as
/// stored in a block header's `nBits` field.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct CompactDifficulty(pub(crate) u32);

/// An expanded 256-bit difficulty threshold.
///
/// A block hash is valid if, interpreted as a 256-bit little-endian integer,
/// it is less than or equal to this threshold. Smaller values mean more work
/// was required, so this type's `Ord` is the reverse of [`Work`]'s.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct ExpandedDifficulty(U256);

/// The amount of proof-of-work represented by a difficulty threshold,
/// measured so that larger values mean more work. Accumulated `Work`
/// across a chain of blocks is the `chainWork` used to pick the best chain.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Work(U256);

impl CompactDifficulty {
    /// Creates a `CompactDifficulty` from its wire representation.
    pub fn from_bits(bits: u32) -> Self {
        CompactDifficulty(bits)
    }

    /// Returns the wire representation of this difficulty.
    pub fn to_bits(self) -> u32 {
        self.0
    }

    /// Expands this compact difficulty into a 256-bit threshold.
    ///
    /// Returns `None` if the encoding is malformed: the exponent byte
    /// implies a mantissa wider than 256 bits, or the mantissa's top bit
    /// is set (Bitcoin's compact encoding reserves that bit as a sign flag
    /// and never sets it for valid difficulties).
    pub fn to_expanded(self) -> Option<ExpandedDifficulty> {
        let bits = self.0;
        let exponent = (bits >> 24) as u8;
        let mantissa = bits & 0x007F_FFFF;
        let is_negative = bits & 0x0080_0000 != 0;

        if is_negative || mantissa == 0 {
            return None;
        }

        let value = if exponent <= 3 {
            U256::from(mantissa >> (8 * (3 - exponent as u32)))
        } else {
            if exponent > 32 {
                return None;
            }
            U256::from(mantissa) << (8 * (exponent as u32 - 3))
        };

        Some(ExpandedDifficulty(value))
    }

    /// Returns the `CompactDifficulty` that exactly represents `work`,
    /// rounding down the mantissa to 3 significant bytes.
    pub fn from_expanded(difficulty: ExpandedDifficulty) -> Self {
        let value = difficulty.0;
        if value.is_zero() {
            return CompactDifficulty(0);
        }

        let mut size = (value.bits() + 7) / 8;
        let mut compact = if size <= 3 {
            (value.low_u32()) << (8 * (3 - size))
        } else {
            (value >> (8 * (size - 3))).low_u32()
        };

        // If the top bit of the 3-byte mantissa would be set, it would be
        // misread as a sign bit, so shift right and bump the exponent.
        if compact & 0x0080_0000 != 0 {
            compact >>= 8;
            size += 1;
        }

        CompactDifficulty((size as u32) << 24 | compact)
    }
}

impl ExpandedDifficulty {
    /// The maximum difficulty threshold (easiest target) for `network`,
    /// also known as `PowLimit`.
    pub fn target_difficulty_limit(network: Network) -> ExpandedDifficulty {
        match network {
            Network::Mainnet => ExpandedDifficulty(U256::from(0xFFFFu64) << (8 * (0x1D - 3))),
            Network::Testnet => ExpandedDifficulty(U256::from(0xFFFFu64) << (8 * (0x1D - 3))),
        }
    }

    /// Returns the amount of `Work` represented by this difficulty threshold.
    pub fn difficulty_work(&self) -> Work {
        // work = 2^256 / (difficulty + 1)
        let difficulty_plus_one = self.0.saturating_add(U256::one());
        let numerator = U256::MAX - difficulty_plus_one + U256::one();
        Work(numerator / difficulty_plus_one)
    }

    /// Computes the next difficulty threshold after a retarget.
    ///
    /// Scales `self` by `actual_timespan_seconds / target_timespan_seconds`,
    /// clamping the timespan (and so the scale factor) to `[1/4, 4]` the way
    /// Bitcoin Core's `CalculateNextWorkRequired` does, then clamps the
    /// result so it never exceeds `network`'s difficulty limit.
    pub fn retarget(
        self,
        actual_timespan_seconds: i64,
        target_timespan_seconds: i64,
        network: Network,
    ) -> ExpandedDifficulty {
        let min_timespan = target_timespan_seconds / 4;
        let max_timespan = target_timespan_seconds * 4;
        let actual_timespan = actual_timespan_seconds
            .clamp(min_timespan, max_timespan)
            .max(1) as u64;

        let scaled = self
            .0
            .saturating_mul(U256::from(actual_timespan))
            / U256::from(target_timespan_seconds as u64);

        let limit = Self::target_difficulty_limit(network).0;
        ExpandedDifficulty(scaled.min(limit))
    }
}

impl fmt::Debug for ExpandedDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExpandedDifficulty")
            .field(&format!("{:#x}", self.0))
            .finish()
    }
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Work").field(&format!("{:#x}", self.0)).finish()
    }
}

/// Difficulty thresholds compare as 256-bit integers: a *smaller* threshold
/// means a block hash had to satisfy a tighter bound, i.e. more work.
impl PartialOrd for ExpandedDifficulty {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.0.cmp(&other.0))
    }
}

impl Ord for ExpandedDifficulty {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// A block hash is interpreted as a little-endian 256-bit integer when
/// compared against a difficulty threshold.
impl PartialEq<ExpandedDifficulty> for Hash {
    fn eq(&self, other: &ExpandedDifficulty) -> bool {
        U256::from_little_endian(&self.0) == other.0
    }
}

impl PartialOrd<ExpandedDifficulty> for Hash {
    fn partial_cmp(&self, other: &ExpandedDifficulty) -> Option<Ordering> {
        U256::from_little_endian(&self.0).partial_cmp(&other.0)
    }
}

impl BitcoinSerialize for CompactDifficulty {
    fn bitcoin_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.bitcoin_serialize(target)
    }
}

impl BitcoinDeserialize for CompactDifficulty {
    fn bitcoin_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(CompactDifficulty(u32::bitcoin_deserialize(reader)?))
    }
}

impl Work {
    /// The zero amount of work, the identity element for chain-work accumulation.
    pub fn zero() -> Self {
        Work(U256::zero())
    }
}

impl std::ops::Add for Work {
    type Output = Work;

    fn add(self, rhs: Self) -> Self::Output {
        Work(self.0.saturating_add(rhs.0))
    }
}

impl std::iter::Sum for Work {
    fn sum<I: Iterator<Item = Work>>(iter: I) -> Self {
        iter.fold(Work::zero(), |acc, w| acc + w)
    }
}

#[cfg(any(test, feature = "proptest-impl"))]
mod arbitrary {
    use super::*;
    use proptest::prelude::*;

    impl proptest::arbitrary::Arbitrary for CompactDifficulty {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with(_args: ()) -> Self::Strategy {
            // Restrict the exponent and mantissa to values `to_expanded` accepts,
            // so generated headers don't spuriously fail PoW-limit checks.
            (1u8..=29, 0x0001u32..=0x007F_FFFF)
                .prop_map(|(exponent, mantissa)| {
                    CompactDifficulty(((exponent as u32) << 24) | mantissa)
                })
                .boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_roundtrips_through_expanded() {
        for bits in [0x1d00ffffu32, 0x1b0404cb, 0x207fffff] {
            let compact = CompactDifficulty::from_bits(bits);
            let expanded = compact.to_expanded().expect("valid compact difficulty");
            let roundtripped = CompactDifficulty::from_expanded(expanded);
            assert_eq!(roundtripped.0, bits);
        }
    }

    #[test]
    fn negative_mantissa_is_rejected() {
        let compact = CompactDifficulty::from_bits(0x01800000);
        assert!(compact.to_expanded().is_none());
    }

    #[test]
    fn lower_expanded_difficulty_is_more_work() {
        let easy = CompactDifficulty::from_bits(0x1d00ffff)
            .to_expanded()
            .unwrap();
        let hard = CompactDifficulty::from_bits(0x1b0404cb)
            .to_expanded()
            .unwrap();
        assert!(hard < easy);
        assert!(hard.difficulty_work() > easy.difficulty_work());
    }
}
