//! Metadata about a peer address, as gossiped over the `addr` message and
//! tracked internally by the address book.

use std::io;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};

use ember_chain::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

use crate::protocol::external::types::PeerServices;

/// An advertised peer address, together with the services it claims to
/// offer and the last time we (or our informant) saw it active.
///
/// On the wire, this is the per-entry payload of the `addr` message: a
/// 4-byte timestamp, an 8-byte service bitfield, and a 16-byte IPv6 (or
/// IPv4-mapped) address followed by a big-endian port.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MetaAddr {
    /// The peer's address and port.
    pub addr: SocketAddr,
    /// The services the peer claims to provide.
    pub services: PeerServices,
    /// The last time this address was seen alive, truncated to the second.
    pub last_seen: DateTime<Utc>,
}

impl MetaAddr {
    /// Construct a [`MetaAddr`] as it would be reported right now.
    pub fn new(addr: SocketAddr, services: PeerServices) -> MetaAddr {
        MetaAddr {
            addr,
            services,
            last_seen: Utc::now(),
        }
    }
}

impl BitcoinSerialize for MetaAddr {
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.last_seen.bitcoin_serialize(&mut target)?;
        self.services.bitcoin_serialize(&mut target)?;
        self.addr.bitcoin_serialize(&mut target)
    }
}

impl BitcoinDeserialize for MetaAddr {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(MetaAddr {
            last_seen: DateTime::<Utc>::bitcoin_deserialize(&mut reader)?,
            services: PeerServices::bitcoin_deserialize(&mut reader)?,
            addr: SocketAddr::bitcoin_deserialize(&mut reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn meta_addr_round_trip() {
        let addr = MetaAddr::new(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8333),
            PeerServices::NODE_NETWORK,
        );
        let mut bytes = Vec::new();
        addr.bitcoin_serialize(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 4 + 8 + 16 + 2);
        let parsed = MetaAddr::bitcoin_deserialize(&bytes[..]).unwrap();
        assert_eq!(addr.addr, parsed.addr);
        assert_eq!(addr.services, parsed.services);
        assert_eq!(addr.last_seen.timestamp(), parsed.last_seen.timestamp());
    }
}
