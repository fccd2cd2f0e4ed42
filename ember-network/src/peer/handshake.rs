//! The `version`/`verack` handshake that promotes a raw TCP connection into
//! a running [`super::Connection`] plus a [`super::Client`] handle.

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use ember_chain::block;

use crate::{
    config::Config,
    constants,
    error::PeerError,
    protocol::external::{
        types::{Nonce, PeerServices, ProtocolVersion},
        Codec, Message, Version,
    },
};

use super::{
    connection::{Connection, PeerEvent},
    Client,
};

/// The peer's state after a successful handshake: what it told us about
/// itself in its `version` message.
#[derive(Clone, Debug)]
pub struct PeerInfo {
    /// The negotiated protocol version (the lower of ours and theirs).
    pub version: ProtocolVersion,
    /// The services the peer advertises.
    pub services: PeerServices,
    /// The peer's self-reported best block height at connection time.
    pub best_block: block::Height,
    /// The peer's advertised user agent string.
    pub user_agent: String,
}

/// Run the `version`/`verack` handshake over `stream`, then spawn the
/// background [`Connection`] task that services it.
///
/// On success, returns a [`Client`] handle for issuing requests and the
/// [`PeerInfo`] the peer reported about itself. `events` receives a
/// `PeerEvent::Connected` as soon as the handshake completes, followed by
/// whatever events the connection produces over its lifetime.
pub async fn handshake(
    stream: TcpStream,
    addr: SocketAddr,
    config: Config,
    our_best_height: block::Height,
    events: mpsc::Sender<PeerEvent>,
) -> Result<(Client, PeerInfo), PeerError> {
    let local_addr = stream
        .local_addr()
        .unwrap_or_else(|_| SocketAddr::new(std::net::Ipv4Addr::UNSPECIFIED.into(), 0));

    let mut framed = Framed::new(
        stream,
        Codec::builder()
            .for_network(config.network)
            .with_metrics_label(addr.to_string())
            .finish(),
    );

    let our_version = Version::new(
        constants::CURRENT_VERSION,
        addr,
        PeerServices::NODE_NETWORK,
        PeerServices::NODE_NETWORK,
        local_addr,
        Nonce::random(),
        config.user_agent_string(),
        our_best_height,
        true,
    );

    let their_version = tokio::time::timeout(config.connect_timeout, async {
        framed
            .send(Message::Version(our_version))
            .await
            .map_err(PeerError::Protocol)?;

        let their_version = match framed.next().await {
            Some(Ok(Message::Version(v))) => v,
            Some(Ok(_)) => {
                return Err(PeerError::HandshakeRejected(
                    "expected version as first message",
                ))
            }
            Some(Err(e)) => return Err(PeerError::Protocol(e)),
            None => return Err(PeerError::ConnectionClosed),
        };

        if their_version.version < constants::MIN_ACCEPTED_VERSION {
            return Err(PeerError::HandshakeRejected(
                "peer protocol version too old",
            ));
        }

        framed
            .send(Message::Verack)
            .await
            .map_err(PeerError::Protocol)?;

        match framed.next().await {
            Some(Ok(Message::Verack)) => {}
            Some(Ok(_)) => return Err(PeerError::HandshakeRejected("expected verack")),
            Some(Err(e)) => return Err(PeerError::Protocol(e)),
            None => return Err(PeerError::ConnectionClosed),
        }

        Ok(their_version)
    })
    .await
    .map_err(|_: tokio::time::Elapsed| PeerError::Timeout("handshake"))??;

    let negotiated = std::cmp::min(constants::CURRENT_VERSION, their_version.version);
    framed.codec_mut().reconfigure_version(negotiated);

    let info = PeerInfo {
        version: negotiated,
        services: their_version.services,
        best_block: their_version.best_block,
        user_agent: their_version.user_agent.clone(),
    };

    let (requests_tx, requests_rx) = mpsc::channel(32);
    let connection = Connection::new(addr, framed, requests_rx, events.clone());

    events
        .send(PeerEvent::Connected {
            addr,
            best_block: info.best_block,
            services: info.services,
        })
        .await
        .ok();

    tokio::spawn(connection.run());

    Ok((Client::new(requests_tx), info))
}
