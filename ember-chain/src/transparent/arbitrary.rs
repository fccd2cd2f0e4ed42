use proptest::{collection::vec, prelude::*};

use super::{CoinbaseData, Input, OutPoint, Script};

impl Arbitrary for CoinbaseData {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        vec(any::<u8>(), 0..95).prop_map(CoinbaseData).boxed()
    }
}

impl Input {
    /// Generates an arbitrary `PrevOut` input.
    pub fn prevout_strategy() -> BoxedStrategy<Self> {
        (any::<OutPoint>(), any::<Script>(), any::<u32>())
            .prop_map(|(outpoint, unlock_script, sequence)| Input::PrevOut {
                outpoint,
                unlock_script,
                sequence,
            })
            .boxed()
    }

    /// Generates an arbitrary coinbase input.
    pub fn coinbase_strategy() -> BoxedStrategy<Self> {
        (any::<CoinbaseData>(), any::<u32>())
            .prop_map(|(data, sequence)| Input::Coinbase {
                height: None,
                data,
                sequence,
            })
            .boxed()
    }

    /// Generates a vector of `len` arbitrary non-coinbase inputs.
    pub fn vec_strategy(len: impl Into<proptest::collection::SizeRange>) -> BoxedStrategy<Vec<Self>> {
        vec(Input::prevout_strategy(), len).boxed()
    }
}

impl Arbitrary for Input {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        prop_oneof![Input::prevout_strategy(), Input::coinbase_strategy()].boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::{BitcoinDeserialize, BitcoinSerialize};
    use proptest::prelude::*;
    use std::io::Cursor;

    proptest! {
        #[test]
        fn input_roundtrip(input in any::<Input>()) {
            let mut bytes = Cursor::new(Vec::new());
            input.bitcoin_serialize(&mut bytes)?;
            bytes.set_position(0);
            let parsed = Input::bitcoin_deserialize(&mut bytes)?;
            // Coinbase inputs never round-trip their cached height, since it
            // isn't part of the wire encoding.
            match (&input, &parsed) {
                (Input::Coinbase { data: d1, .. }, Input::Coinbase { data: d2, .. }) => {
                    prop_assert_eq!(&d1.0, &d2.0);
                }
                _ => prop_assert_eq!(input, parsed),
            }
        }
    }
}
