use bitcoin_serde_derive::{BtcDeserialize, BtcSerialize};
use ember_chain::{
    block, compactint::CompactInt, transaction, BitcoinDeserialize, BitcoinSerialize,
    SerializationError,
};

#[derive(BtcDeserialize, BtcSerialize, Debug, Clone, PartialEq, Eq)]
pub struct MerkleBlock {
    pub block_header: block::Header,
    pub transaction_count: u32,
    pub hashes: Vec<transaction::Hash>,
    pub flags: Vec<u8>,
}
impl MerkleBlock {
    fn serialized_size(&self) -> usize {
        block::Header::len()
            + 4
            + CompactInt::size(self.hashes.len())
            + (self.hashes.len() * 32)
            + CompactInt::size(self.flags.len())
            + self.flags.len()
    }
}
