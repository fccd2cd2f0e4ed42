use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// The height of a block in the chain, counted from the genesis block at height 0.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, serde::Serialize, serde::Deserialize,
)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(proptest_derive::Arbitrary))]
pub struct Height(pub u32);

impl Height {
    /// The height of the genesis block.
    pub const MIN: Height = Height(0);

    /// The largest height that fits in the `nLockTime`/BIP-34 field, matching Bitcoin Core.
    pub const MAX: Height = Height(499_999_999);

    /// Returns the height one block before this one, or `None` at the genesis block.
    pub fn previous(self) -> Option<Height> {
        self.0.checked_sub(1).map(Height)
    }

    /// Returns the height one block after this one, or `None` on overflow.
    pub fn next(self) -> Option<Height> {
        self.0.checked_add(1).map(Height)
    }

    /// Returns this height as a `usize`.
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for Height {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl BitcoinSerialize for Height {
    fn bitcoin_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.bitcoin_serialize(target)
    }
}

impl BitcoinDeserialize for Height {
    fn bitcoin_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Height(u32::bitcoin_deserialize(reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_has_no_previous() {
        assert_eq!(Height::MIN.previous(), None);
    }

    #[test]
    fn ordering_follows_the_wrapped_integer() {
        assert!(Height(1) > Height(0));
        assert!(Height(100).next().unwrap() > Height(100));
    }
}
