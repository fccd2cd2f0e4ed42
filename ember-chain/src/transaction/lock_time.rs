use chrono::{DateTime, TimeZone, Utc};

use crate::{
    block::Height,
    serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError},
};

/// The Bitcoin `nLockTime` field: either a block height or a Unix timestamp
/// below which a transaction must not be mined.
///
/// A transaction's `nLockTime` is interpreted as a block height if it is
/// less than `LOCKTIME_THRESHOLD` (500,000,000), and as a Unix timestamp
/// otherwise.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(proptest_derive::Arbitrary))]
pub enum LockTime {
    /// The transaction may be mined starting at this block height (inclusive).
    Height(Height),
    /// The transaction may be mined starting at this time (inclusive).
    Time(DateTime<Utc>),
}

/// The threshold separating `nLockTime` height values from time values.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

impl LockTime {
    /// Returns a [`LockTime`] that places no restriction on when the
    /// transaction can be mined.
    pub fn unlocked() -> Self {
        LockTime::Height(Height(0))
    }

    /// Returns the raw `nLockTime` value.
    pub fn to_u32(self) -> u32 {
        match self {
            LockTime::Height(height) => height.0,
            LockTime::Time(time) => time.timestamp() as u32,
        }
    }
}

impl BitcoinSerialize for LockTime {
    fn bitcoin_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.to_u32().bitcoin_serialize(target)
    }
}

impl BitcoinDeserialize for LockTime {
    fn bitcoin_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        let raw = u32::bitcoin_deserialize(reader)?;
        if raw < LOCKTIME_THRESHOLD {
            Ok(LockTime::Height(Height(raw)))
        } else {
            Ok(LockTime::Time(Utc.timestamp(raw as i64, 0)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_is_a_height() {
        let lock = LockTime::bitcoin_deserialize(&200_000u32.to_le_bytes()[..]).unwrap();
        assert!(matches!(lock, LockTime::Height(Height(200_000))));
    }

    #[test]
    fn at_or_above_threshold_is_a_time() {
        let lock =
            LockTime::bitcoin_deserialize(&LOCKTIME_THRESHOLD.to_le_bytes()[..]).unwrap();
        assert!(matches!(lock, LockTime::Time(_)));
    }

    #[test]
    fn roundtrips_through_wire_format() {
        let original = LockTime::Height(Height(12345));
        let bytes = original.bitcoin_serialize_to_vec().unwrap();
        let parsed = LockTime::bitcoin_deserialize(&bytes[..]).unwrap();
        assert_eq!(original, parsed);
    }
}
