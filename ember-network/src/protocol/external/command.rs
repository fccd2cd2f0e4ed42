//! The 12-byte ASCII command string that identifies a message on the wire.

use std::io;

use ember_chain::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// A Bitcoin message type, as identified by its 12-byte ASCII command string.
///
/// On the wire this is a fixed 12-byte field, NUL-padded; here we model it as
/// an enum so that unknown or malformed commands are rejected as early as
/// possible, rather than being threaded through the rest of the decoder as a
/// raw string.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
#[allow(missing_docs)]
pub enum Command {
    Version,
    Verack,
    Addr,
    Inv,
    GetData,
    NotFound,
    GetBlocks,
    GetHeaders,
    Tx,
    Block,
    Headers,
    GetAddr,
    MemPool,
    Ping,
    Pong,
    Reject,
    Alert,
    FilterLoad,
    FilterAdd,
    FilterClear,
    MerkleBlock,
    SendHeaders,
    FeeFilter,
    SendCmpct,
    CmpctBlock,
    GetBlockTxn,
    BlockTxn,
}

impl Command {
    /// Returns the 12-byte, NUL-padded ASCII command string used on the wire.
    pub fn bytes(&self) -> &'static [u8; 12] {
        match self {
            Command::Version => b"version\0\0\0\0\0",
            Command::Verack => b"verack\0\0\0\0\0\0",
            Command::Addr => b"addr\0\0\0\0\0\0\0\0",
            Command::Inv => b"inv\0\0\0\0\0\0\0\0\0",
            Command::GetData => b"getdata\0\0\0\0\0",
            Command::NotFound => b"notfound\0\0\0\0",
            Command::GetBlocks => b"getblocks\0\0\0",
            Command::GetHeaders => b"getheaders\0\0",
            Command::Tx => b"tx\0\0\0\0\0\0\0\0\0\0",
            Command::Block => b"block\0\0\0\0\0\0\0",
            Command::Headers => b"headers\0\0\0\0\0",
            Command::GetAddr => b"getaddr\0\0\0\0\0",
            Command::MemPool => b"mempool\0\0\0\0\0",
            Command::Ping => b"ping\0\0\0\0\0\0\0\0",
            Command::Pong => b"pong\0\0\0\0\0\0\0\0",
            Command::Reject => b"reject\0\0\0\0\0\0",
            Command::Alert => b"alert\0\0\0\0\0\0\0",
            Command::FilterLoad => b"filterload\0\0",
            Command::FilterAdd => b"filteradd\0\0\0",
            Command::FilterClear => b"filterclear\0",
            Command::MerkleBlock => b"merkleblock\0",
            Command::SendHeaders => b"sendheaders\0",
            Command::FeeFilter => b"feefilter\0\0\0",
            Command::SendCmpct => b"sendcmpct\0\0\0",
            Command::CmpctBlock => b"cmpctblock\0\0",
            Command::GetBlockTxn => b"getblocktxn\0",
            Command::BlockTxn => b"blocktxn\0\0\0\0",
        }
    }
}

impl BitcoinSerialize for Command {
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        target.write_all(self.bytes())
    }
}

impl BitcoinDeserialize for Command {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        let raw = <[u8; 12]>::bitcoin_deserialize(reader)?;
        // The command string is ASCII, NUL-padded on the right; trim the
        // padding before matching so that we don't have to enumerate every
        // possible padding width by hand.
        let end = raw.iter().position(|&b| b == 0).unwrap_or(12);
        match &raw[..end] {
            b"version" => Ok(Command::Version),
            b"verack" => Ok(Command::Verack),
            b"addr" => Ok(Command::Addr),
            b"inv" => Ok(Command::Inv),
            b"getdata" => Ok(Command::GetData),
            b"notfound" => Ok(Command::NotFound),
            b"getblocks" => Ok(Command::GetBlocks),
            b"getheaders" => Ok(Command::GetHeaders),
            b"tx" => Ok(Command::Tx),
            b"block" => Ok(Command::Block),
            b"headers" => Ok(Command::Headers),
            b"getaddr" => Ok(Command::GetAddr),
            b"mempool" => Ok(Command::MemPool),
            b"ping" => Ok(Command::Ping),
            b"pong" => Ok(Command::Pong),
            b"reject" => Ok(Command::Reject),
            b"alert" => Ok(Command::Alert),
            b"filterload" => Ok(Command::FilterLoad),
            b"filteradd" => Ok(Command::FilterAdd),
            b"filterclear" => Ok(Command::FilterClear),
            b"merkleblock" => Ok(Command::MerkleBlock),
            b"sendheaders" => Ok(Command::SendHeaders),
            b"feefilter" => Ok(Command::FeeFilter),
            b"sendcmpct" => Ok(Command::SendCmpct),
            b"cmpctblock" => Ok(Command::CmpctBlock),
            b"getblocktxn" => Ok(Command::GetBlockTxn),
            b"blocktxn" => Ok(Command::BlockTxn),
            _ => Err(SerializationError::Parse("unrecognized command string")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_bytes_round_trip() {
        let commands = [
            Command::Version,
            Command::Verack,
            Command::Addr,
            Command::Inv,
            Command::GetData,
            Command::NotFound,
            Command::GetBlocks,
            Command::GetHeaders,
            Command::Tx,
            Command::Block,
            Command::Headers,
            Command::GetAddr,
            Command::MemPool,
            Command::Ping,
            Command::Pong,
            Command::Reject,
            Command::Alert,
            Command::FilterLoad,
            Command::FilterAdd,
            Command::FilterClear,
            Command::MerkleBlock,
            Command::SendHeaders,
            Command::FeeFilter,
            Command::SendCmpct,
            Command::CmpctBlock,
            Command::GetBlockTxn,
            Command::BlockTxn,
        ];
        for command in commands.iter().copied() {
            assert_eq!(command.bytes().len(), 12);
            let decoded = Command::bitcoin_deserialize(&command.bytes()[..]).unwrap();
            assert_eq!(decoded, command);
        }
    }
}
