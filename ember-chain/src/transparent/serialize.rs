//! Wire (de)serialization for transaction inputs and outputs.
//!
//! Bitcoin's wire format doesn't tag an input as "coinbase" with an explicit
//! discriminant: a coinbase input is simply the one whose outpoint is the
//! null value (`hash = [0; 32]`, `index = 0xFFFFFFFF`). [`Input`] is
//! deserialized by reading the outpoint first and branching on that.

use std::io::{self, Read};

use crate::{
    compactint::CompactInt,
    serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError},
    transaction,
};

use super::{CoinbaseData, Input, OutPoint, Script};

/// The null transaction hash used in a coinbase input's outpoint.
const COINBASE_OUTPOINT_HASH: transaction::Hash = transaction::Hash([0; 32]);

/// The null output index used in a coinbase input's outpoint.
const COINBASE_OUTPOINT_INDEX: u32 = 0xFFFF_FFFF;

impl OutPoint {
    /// Returns `true` if this is the null outpoint that marks a coinbase input.
    pub fn is_coinbase(&self) -> bool {
        self.hash == COINBASE_OUTPOINT_HASH && self.index == COINBASE_OUTPOINT_INDEX
    }

    /// Returns the null outpoint used to mark a coinbase input.
    pub fn coinbase() -> Self {
        OutPoint {
            hash: COINBASE_OUTPOINT_HASH,
            index: COINBASE_OUTPOINT_INDEX,
        }
    }
}

impl BitcoinDeserialize for OutPoint {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(OutPoint {
            hash: transaction::Hash::bitcoin_deserialize(&mut reader)?,
            index: u32::bitcoin_deserialize(&mut reader)?,
        })
    }
}

impl BitcoinSerialize for Input {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        match self {
            Input::PrevOut {
                outpoint,
                unlock_script,
                sequence,
            } => {
                outpoint.bitcoin_serialize(&mut writer)?;
                unlock_script.bitcoin_serialize(&mut writer)?;
                sequence.bitcoin_serialize(&mut writer)
            }
            Input::Coinbase {
                data, sequence, ..
            } => {
                OutPoint::coinbase().bitcoin_serialize(&mut writer)?;
                data.bitcoin_serialize(&mut writer)?;
                sequence.bitcoin_serialize(&mut writer)
            }
        }
    }
}

impl BitcoinDeserialize for Input {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let outpoint = OutPoint::bitcoin_deserialize(&mut reader)?;

        if outpoint.is_coinbase() {
            let len = CompactInt::bitcoin_deserialize(&mut reader)?.value();
            let mut bytes = Vec::new();
            (&mut reader).take(len).read_to_end(&mut bytes)?;
            let sequence = u32::bitcoin_deserialize(&mut reader)?;
            Ok(Input::Coinbase {
                height: None,
                data: CoinbaseData(bytes),
                sequence,
            })
        } else {
            Ok(Input::PrevOut {
                outpoint,
                unlock_script: Script::bitcoin_deserialize(&mut reader)?,
                sequence: u32::bitcoin_deserialize(&mut reader)?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transparent::Output;
    use crate::{
        amount::{Amount, NonNegative},
        serialization::BitcoinSerialize,
    };
    use std::convert::TryFrom;
    use std::io::Cursor;

    #[test]
    fn prevout_input_roundtrips() {
        let input = Input::PrevOut {
            outpoint: OutPoint {
                hash: transaction::Hash([7; 32]),
                index: 3,
            },
            unlock_script: Script(vec![0xAB, 0xCD]),
            sequence: 0xFFFF_FFFF,
        };
        let bytes = input.bitcoin_serialize_to_vec().unwrap();
        let parsed = Input::bitcoin_deserialize(Cursor::new(bytes)).unwrap();
        assert_eq!(input, parsed);
    }

    #[test]
    fn coinbase_input_roundtrips_and_is_detected() {
        let input = Input::Coinbase {
            height: None,
            data: CoinbaseData(vec![0x03, 0x4c, 0x86, 0x09]),
            sequence: 0xFFFF_FFFF,
        };
        let bytes = input.bitcoin_serialize_to_vec().unwrap();
        let parsed = Input::bitcoin_deserialize(Cursor::new(bytes)).unwrap();
        assert!(matches!(parsed, Input::Coinbase { .. }));
        match (&input, &parsed) {
            (
                Input::Coinbase { data: d1, .. },
                Input::Coinbase { data: d2, .. },
            ) => assert_eq!(d1.0, d2.0),
            _ => unreachable!(),
        }
    }

    #[test]
    fn output_roundtrips() {
        let output = Output {
            value: Amount::<NonNegative>::try_from(5_000_000_000i64).unwrap(),
            lock_script: Script(vec![0x76, 0xa9]),
        };
        let bytes = output.bitcoin_serialize_to_vec().unwrap();
        let parsed = Output::bitcoin_deserialize(Cursor::new(bytes)).unwrap();
        assert_eq!(output, parsed);
    }
}
