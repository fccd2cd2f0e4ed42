//! The client half of a peer connection: a `tower::Service<Request>` handle
//! that a caller can clone and drive, paired with a background
//! [`crate::peer::Connection`] task that owns the socket.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::channel::oneshot;
use tokio::sync::mpsc;
use tower::Service;

use ember_chain::{block, transaction};

use crate::{error::PeerError, meta_addr::MetaAddr, protocol::external::InventoryHash};

/// A request that can be made of a connected peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// Ask the peer to respond with a `pong`, refreshing our RTT estimate.
    Ping,

    /// Ask the peer for a sample of addresses it knows about.
    GetAddr,

    /// Request block inventory between the given locator and an optional
    /// stop hash; the peer is expected to respond with an `inv`.
    GetBlocks {
        /// Known block hashes, ordered from highest to lowest height.
        known_blocks: Vec<block::Hash>,
        /// The last block to include, if not the whole remaining chain.
        stop: Option<block::Hash>,
    },

    /// Request block headers, following the same locator/stop convention as
    /// [`Request::GetBlocks`].
    GetHeaders {
        /// Known block hashes, ordered from highest to lowest height.
        known_blocks: Vec<block::Hash>,
        /// The last header to include, if not the whole remaining chain.
        stop: Option<block::Hash>,
    },

    /// Request the given inventory items by hash.
    GetData(Vec<InventoryHash>),

    /// Announce that we have a transaction the peer may want.
    AdvertiseTransactions(Vec<transaction::Hash>),

    /// Announce that we have a block the peer may want.
    AdvertiseBlock(block::Hash),

    /// Push a transaction directly to the peer, without waiting for a
    /// `getdata` (used once a broadcast's `getdata` has arrived).
    PushTransaction(Arc<transaction::Transaction>),

    /// Send the peer a sample of addresses, in reply to its `getaddr`.
    SendAddresses(Vec<MetaAddr>),
}

/// A peer's response to a [`Request`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// The request was accepted; no further data is returned (e.g.
    /// `PushTransaction`, `AdvertiseBlock`).
    Nil,
    /// A `pong` was received in reply to our `ping`.
    Pong,
    /// Addresses received in reply to `getaddr`.
    Addresses(Vec<MetaAddr>),
    /// Blocks streamed in reply to `getdata`/`getblocks`.
    Blocks(Vec<Arc<block::Block>>),
    /// Headers received in reply to `getheaders`.
    Headers(Vec<block::CountedHeader>),
}

/// An in-flight request handed off from [`Client`] to [`super::Connection`].
pub(super) struct ClientRequest {
    pub(super) request: Request,
    pub(super) tx: oneshot::Sender<Result<Response, PeerError>>,
}

/// A handle to a single peer connection, usable as a `tower::Service`.
///
/// Cloning a [`Client`] is cheap; all clones share the same background
/// [`super::Connection`] task and are multiplexed through its request queue.
#[derive(Clone, Debug)]
pub struct Client {
    requests: mpsc::Sender<ClientRequest>,
}

impl Client {
    pub(super) fn new(requests: mpsc::Sender<ClientRequest>) -> Self {
        Client { requests }
    }
}

impl Service<Request> for Client {
    type Response = Response;
    type Error = PeerError;
    type Future = Pin<Box<dyn Future<Output = Result<Response, PeerError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.requests
            .poll_ready(cx)
            .map_err(|_| PeerError::ConnectionClosed)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let (tx, rx) = oneshot::channel();
        let mut requests = self.requests.clone();
        Box::pin(async move {
            requests
                .send(ClientRequest { request, tx })
                .await
                .map_err(|_| PeerError::ConnectionClosed)?;
            rx.await.map_err(|_| PeerError::ConnectionClosed)?
        })
    }
}
