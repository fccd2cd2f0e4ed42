//! The transaction Merkle tree committed to by a block header.

use std::iter::FromIterator;

use crate::{
    serialization::{sha256d, BitcoinDeserialize, BitcoinSerialize, SerializationError},
    transaction,
};

/// The root of a block's transaction Merkle tree.
#[derive(Copy, Clone, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(proptest_derive::Arbitrary))]
pub struct Root(pub [u8; 32]);

impl std::fmt::Debug for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.debug_tuple("merkle::Root")
            .field(&hex::encode(&reversed))
            .finish()
    }
}

impl BitcoinSerialize for Root {
    fn bitcoin_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.bitcoin_serialize(target)
    }
}

impl BitcoinDeserialize for Root {
    fn bitcoin_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Root(<[u8; 32]>::bitcoin_deserialize(reader)?))
    }
}

/// Computes a Merkle root the way Bitcoin Core does: if a level has an odd
/// number of nodes, the last node is duplicated before hashing pairs.
///
/// Note: this construction allows an attacker to produce two distinct
/// transaction sets with the same root by duplicating the last transaction
/// (CVE-2012-2459). Block validation must separately reject blocks whose
/// transaction list contains two adjacent identical hashes.
impl FromIterator<transaction::Hash> for Root {
    fn from_iter<I: IntoIterator<Item = transaction::Hash>>(iter: I) -> Self {
        let mut level: Vec<[u8; 32]> = iter.into_iter().map(|hash| hash.0).collect();

        if level.is_empty() {
            return Root([0; 32]);
        }

        while level.len() > 1 {
            if level.len() % 2 == 1 {
                let last = *level.last().unwrap();
                level.push(last);
            }
            level = level
                .chunks_exact(2)
                .map(|pair| {
                    let mut concat = Vec::with_capacity(64);
                    concat.extend_from_slice(&pair[0]);
                    concat.extend_from_slice(&pair[1]);
                    sha256d::hash(&concat)
                })
                .collect();
        }

        Root(level[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_transaction_root_is_its_hash() {
        let hash = transaction::Hash([7; 32]);
        let root: Root = std::iter::once(hash).collect();
        assert_eq!(root.0, hash.0);
    }

    #[test]
    fn odd_count_duplicates_the_last_hash() {
        let a = transaction::Hash([1; 32]);
        let b = transaction::Hash([2; 32]);
        let three = vec![a, b, b].into_iter().collect::<Root>();
        let two = vec![a, b].into_iter().collect::<Root>();
        // Duplicating the last node means {a, b} and {a, b, b} share a root.
        assert_eq!(three.0, two.0);
    }

    #[test]
    fn empty_root_is_zero() {
        let root: Root = std::iter::empty().collect();
        assert_eq!(root.0, [0; 32]);
    }
}
