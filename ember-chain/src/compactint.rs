//! Bitcoin's variable-length integer ("CompactSize") encoding.
//!
//! Values below 0xFD are encoded as a single byte. Otherwise a 1-byte marker
//! (`0xFD`/`0xFE`/`0xFF`) selects a 2/4/8-byte little-endian payload. Only the
//! *shortest* encoding that represents a given value is canonical; decoding a
//! wider-than-necessary encoding is a parse error.

use crate::{BitcoinDeserialize, BitcoinSerialize, SerializationError};
use byteorder::{LittleEndian, WriteBytesExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompactInt(u64);

impl CompactInt {
    pub fn new() -> CompactInt {
        CompactInt(0)
    }

    pub fn from(value: usize) -> CompactInt {
        CompactInt(value as u64)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The number of bytes a [`CompactInt`] holding `value` serializes to.
    pub fn size(value: usize) -> usize {
        if value < 253 {
            1
        } else if value <= std::u16::MAX as usize {
            3
        } else if value <= std::u32::MAX as usize {
            5
        } else {
            9
        }
    }
}

impl Default for CompactInt {
    fn default() -> Self {
        CompactInt::new()
    }
}

impl BitcoinSerialize for CompactInt {
    fn bitcoin_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        if self.value() < 253 {
            target.write_all(&[self.value() as u8])
        } else if self.value() <= std::u16::MAX as u64 {
            target.write_all(&[0xFD])?;
            target.write_u16::<LittleEndian>(self.value() as u16)
        } else if self.value() <= std::u32::MAX as u64 {
            target.write_all(&[0xFE])?;
            target.write_u32::<LittleEndian>(self.value() as u32)
        } else {
            target.write_all(&[0xFF])?;
            target.write_u64::<LittleEndian>(self.value())
        }
    }
}

impl BitcoinDeserialize for CompactInt {
    fn bitcoin_deserialize<R: std::io::Read>(
        mut target: R,
    ) -> Result<CompactInt, SerializationError> {
        let first = u8::bitcoin_deserialize(&mut target)?;
        if first < 0xFD {
            return Ok(CompactInt::from(first as usize));
        }
        if first == 0xFD {
            let value = u16::bitcoin_deserialize(&mut target)?;
            if value < 0xFD {
                return Err(SerializationError::NonCanonical(
                    "CompactInt encoded with 0xFD prefix but fits in one byte",
                ));
            }
            return Ok(CompactInt::from(value as usize));
        }
        if first == 0xFE {
            let value = u32::bitcoin_deserialize(&mut target)?;
            if value <= std::u16::MAX as u32 {
                return Err(SerializationError::NonCanonical(
                    "CompactInt encoded with 0xFE prefix but fits in a u16",
                ));
            }
            return Ok(CompactInt::from(value as usize));
        }
        let value = u64::bitcoin_deserialize(&mut target)?;
        if value <= std::u32::MAX as u64 {
            return Err(SerializationError::NonCanonical(
                "CompactInt encoded with 0xFF prefix but fits in a u32",
            ));
        }
        Ok(CompactInt(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(value: u64) {
        let ci = CompactInt(value);
        let mut bytes = Vec::new();
        ci.bitcoin_serialize(&mut bytes).unwrap();
        assert_eq!(bytes.len(), CompactInt::size(value as usize));
        let parsed = CompactInt::bitcoin_deserialize(Cursor::new(bytes)).unwrap();
        assert_eq!(parsed.value(), value);
    }

    #[test]
    fn roundtrips_across_boundaries() {
        for value in [0, 1, 252, 253, 254, 0xFFFF, 0x1_0000, u32::MAX as u64, u32::MAX as u64 + 1] {
            roundtrip(value);
        }
    }

    #[test]
    fn rejects_non_canonical_encodings() {
        // 0xFD followed by a u16 that fits in one byte.
        let bytes = [0xFDu8, 0x05, 0x00];
        assert!(matches!(
            CompactInt::bitcoin_deserialize(Cursor::new(bytes)),
            Err(SerializationError::NonCanonical(_))
        ));

        // 0xFE followed by a u32 that fits in a u16.
        let bytes = [0xFEu8, 0x05, 0x00, 0x00, 0x00];
        assert!(matches!(
            CompactInt::bitcoin_deserialize(Cursor::new(bytes)),
            Err(SerializationError::NonCanonical(_))
        ));
    }
}
