//! Newtype wrappers for primitive protocol types.
//!
//! These types exist to attach serialization behavior (and a little bit of
//! domain meaning) to otherwise-anonymous integers and byte strings that
//! appear in several different messages.

use std::io;

use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use ember_chain::{
    parameters::Network, BitcoinDeserialize, BitcoinSerialize, SerializationError,
};

/// A magic number identifying the network.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Magic(pub [u8; 4]);

impl std::fmt::Debug for Magic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("Magic").field(&hex::encode(&self.0)).finish()
    }
}

impl From<Network> for Magic {
    fn from(network: Network) -> Self {
        Magic(network.magic())
    }
}

/// A protocol version number.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ProtocolVersion(pub u32);

impl BitcoinSerialize for ProtocolVersion {
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        target.write_u32::<LittleEndian>(self.0)
    }
}

impl BitcoinDeserialize for ProtocolVersion {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(ProtocolVersion(reader.read_u32::<LittleEndian>()?))
    }
}

/// A nonce used to detect self-connections, and to pair `ping`/`pong` messages.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Nonce(pub u64);

impl Nonce {
    /// Generate a random nonce, for use in `version` or `ping` messages.
    pub fn random() -> Self {
        use rand::Rng;
        Nonce(rand::thread_rng().gen())
    }
}

impl BitcoinSerialize for Nonce {
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        target.write_u64::<LittleEndian>(self.0)
    }
}

impl BitcoinDeserialize for Nonce {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Nonce(reader.read_u64::<LittleEndian>()?))
    }
}

/// The raw bytes of a BIP 37 bloom filter.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Filter(pub Vec<u8>);

/// The tweak value used to salt a BIP 37 bloom filter's hash functions.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Tweak(pub u32);

bitflags! {
    /// Services advertised by a peer, as a bitfield.
    ///
    /// Bit values and names follow the [Bitcoin protocol
    /// documentation](https://en.bitcoin.it/wiki/Protocol_documentation#version).
    #[derive(Default)]
    pub struct PeerServices: u64 {
        /// Whether the peer can serve the complete block chain.
        const NODE_NETWORK = 1;
        /// Whether the peer supports the getutxo protocol extension (BIP 64).
        const NODE_GETUTXO = 1 << 1;
        /// Whether the peer supports bloom-filtered connections (BIP 111).
        const NODE_BLOOM = 1 << 2;
        /// Whether the peer supports direct segwit blocks (BIP 144).
        const NODE_WITNESS = 1 << 3;
        /// Whether the peer only maintains a limited (pruned) recent portion
        /// of the block chain (BIP 159).
        const NODE_NETWORK_LIMITED = 1 << 10;
    }
}

impl BitcoinSerialize for PeerServices {
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        target.write_u64::<LittleEndian>(self.bits())
    }
}

impl BitcoinDeserialize for PeerServices {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        // Unknown/future bits are preserved by `bits()`/`from_bits_truncate` only
        // drops bits outside of `u64`, which can't happen here; so this never
        // silently discards services we don't recognize yet.
        Ok(PeerServices::from_bits_truncate(
            reader.read_u64::<LittleEndian>()?,
        ))
    }
}
