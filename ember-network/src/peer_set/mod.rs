//! `PeerGroup`: discovers, connects to, and supervises a target number of
//! outbound peers; elects a download peer; fans broadcasts and listener
//! events out.

mod candidate_set;

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};

use ember_chain::{block, transaction};

use crate::{
    address_book::AddressBook,
    config::Config,
    constants,
    error::PeerError,
    peer::{self, Client, PeerEvent, PeerInfo, Request},
};

use self::candidate_set::CandidateSet;

/// An event fanned out to every [`PeerGroup::subscribe`]r.
///
/// Unlike [`PeerEvent`], which is internal to a single connection, this is
/// the node-wide view: connects/disconnects, and content the chain or its
/// listeners may care about.
#[derive(Clone, Debug)]
pub enum GroupEvent {
    /// A peer finished its handshake and is now connected.
    PeerConnected {
        /// The peer's address.
        addr: SocketAddr,
        /// What the peer told us about itself.
        info: PeerInfo,
    },
    /// A peer's connection ended.
    PeerDisconnected(SocketAddr),
    /// A connected peer announced a block we didn't already know about.
    BlockAnnounced {
        /// The announcing peer.
        addr: SocketAddr,
        /// The announced block hash.
        hash: block::Hash,
    },
    /// A full block arrived, fetched automatically in response to an
    /// announcement via the inv/getdata flow.
    BlockReceived(Arc<block::Block>),
    /// A connected peer pushed us a transaction.
    TransactionReceived(Arc<transaction::Transaction>),
    /// The elected download peer changed.
    DownloadPeerChanged(Option<SocketAddr>),
}

struct ConnectedPeer {
    client: Client,
    info: PeerInfo,
    ewma_rtt_millis: Option<f64>,
}

struct PendingBroadcast {
    tx: Arc<transaction::Transaction>,
    acked: HashSet<SocketAddr>,
    respond: Option<oneshot::Sender<Result<(), PeerError>>>,
}

enum Command {
    Broadcast {
        tx: Arc<transaction::Transaction>,
        respond: oneshot::Sender<Result<(), PeerError>>,
    },
    BroadcastTimedOut(transaction::Hash),
    Connected {
        addr: SocketAddr,
        client: Client,
        info: PeerInfo,
    },
    ConnectFailed(SocketAddr),
    SetMaxConnections(usize),
    RequestBlocks {
        known_blocks: Vec<block::Hash>,
        stop: Option<block::Hash>,
    },
    Stop,
}

/// A handle to a running peer supervisor. Cloning a [`PeerGroup`] is cheap;
/// all clones talk to the same background supervisor task.
#[derive(Clone)]
pub struct PeerGroup {
    commands: mpsc::Sender<Command>,
    listeners: broadcast::Sender<GroupEvent>,
    shared: Arc<Mutex<SharedState>>,
}

#[derive(Default)]
struct SharedState {
    connected: HashSet<SocketAddr>,
    download_peer: Option<SocketAddr>,
}

impl PeerGroup {
    /// Start the supervisor task and return a handle to it.
    ///
    /// `our_best_height` is used in the `version` message sent to every
    /// newly connected peer; callers whose chain tip moves should re-derive
    /// it themselves since the supervisor only reads it once, at startup.
    pub fn spawn(config: Config, our_best_height: block::Height) -> PeerGroup {
        let (commands_tx, commands_rx) = mpsc::channel(64);
        let (listeners, _) = broadcast::channel(256);
        let shared = Arc::new(Mutex::new(SharedState::default()));

        let mut candidates = CandidateSet::new();
        candidates.add(config.initial_peers.iter().copied());

        let supervisor = Supervisor {
            config,
            our_best_height,
            commands: commands_tx.clone(),
            commands_rx,
            listeners: listeners.clone(),
            shared: shared.clone(),
            address_book: AddressBook::new(),
            candidates,
            connected: HashMap::new(),
            pending_broadcasts: HashMap::new(),
        };

        tokio::spawn(supervisor.run());

        PeerGroup {
            commands: commands_tx,
            listeners,
            shared,
        }
    }

    /// Subscribe to node-wide peer/content events.
    pub fn subscribe(&self) -> broadcast::Receiver<GroupEvent> {
        self.listeners.subscribe()
    }

    /// The number of peers currently connected.
    pub fn connection_count(&self) -> usize {
        self.shared.lock().expect("peer group lock poisoned").connected.len()
    }

    /// The peer currently elected to drive block download, if any.
    pub fn download_peer(&self) -> Option<SocketAddr> {
        self.shared
            .lock()
            .expect("peer group lock poisoned")
            .download_peer
    }

    /// Reconfigure the target number of outbound connections.
    pub async fn set_max_connections(&self, max_connections: usize) {
        let _ = self
            .commands
            .send(Command::SetMaxConnections(max_connections))
            .await;
    }

    /// Broadcast a transaction to all connected peers, completing once at
    /// least `min_broadcast_connections` peers have requested it via
    /// `getdata`, or failing once [`constants::REQUEST_TIMEOUT`] elapses
    /// without reaching that quorum.
    pub async fn broadcast_transaction(
        &self,
        tx: Arc<transaction::Transaction>,
    ) -> Result<(), PeerError> {
        let (respond, rx) = oneshot::channel();
        self.commands
            .send(Command::Broadcast { tx, respond })
            .await
            .map_err(|_| PeerError::ConnectionClosed)?;
        rx.await.map_err(|_| PeerError::ConnectionClosed)?
    }

    /// Asks the elected download peer for block inventory starting after
    /// `known_blocks` (a locator, highest to lowest) up to `stop` (or the
    /// remainder of its chain). The peer replies with an `inv`; any blocks
    /// it announces that we don't already have are fetched automatically
    /// and surfaced via [`GroupEvent::BlockReceived`]. A no-op if there is
    /// currently no download peer.
    pub async fn request_blocks(&self, known_blocks: Vec<block::Hash>, stop: Option<block::Hash>) {
        let _ = self
            .commands
            .send(Command::RequestBlocks { known_blocks, stop })
            .await;
    }

    /// Stop the supervisor: close every peer socket and cancel pending
    /// connection attempts.
    pub async fn stop(&self) {
        let _ = self.commands.send(Command::Stop).await;
    }
}

struct Supervisor {
    config: Config,
    our_best_height: block::Height,
    commands: mpsc::Sender<Command>,
    commands_rx: mpsc::Receiver<Command>,
    listeners: broadcast::Sender<GroupEvent>,
    shared: Arc<Mutex<SharedState>>,
    address_book: AddressBook,
    candidates: CandidateSet,
    connected: HashMap<SocketAddr, ConnectedPeer>,
    pending_broadcasts: HashMap<transaction::Hash, PendingBroadcast>,
}

impl Supervisor {
    async fn run(mut self) {
        let (events_tx, mut events_rx) = mpsc::channel::<PeerEvent>(256);
        let mut connect_tick = tokio::time::interval(Duration::from_secs(1));
        let mut max_connections = self.config.max_connections;

        loop {
            tokio::select! {
                biased;

                command = self.commands_rx.recv() => {
                    match command {
                        Some(Command::Stop) | None => break,
                        Some(Command::SetMaxConnections(n)) => max_connections = n,
                        Some(Command::Connected { addr, client, info }) => {
                            self.candidates.remove(&addr);
                            self.connected.insert(
                                addr,
                                ConnectedPeer { client, info: info.clone(), ewma_rtt_millis: None },
                            );
                            self.sync_shared();
                            self.elect_download_peer();
                            let _ = self.listeners.send(GroupEvent::PeerConnected { addr, info });
                        }
                        Some(Command::ConnectFailed(addr)) => {
                            self.candidates.report_failed(addr);
                        }
                        Some(Command::Broadcast { tx, respond }) => {
                            self.start_broadcast(tx, respond).await;
                        }
                        Some(Command::BroadcastTimedOut(hash)) => {
                            if let Some(mut pending) = self.pending_broadcasts.remove(&hash) {
                                if let Some(respond) = pending.respond.take() {
                                    let _ = respond.send(Err(PeerError::Timeout("broadcast_transaction")));
                                }
                            }
                        }
                        Some(Command::RequestBlocks { known_blocks, stop }) => {
                            self.request_blocks(known_blocks, stop);
                        }
                    }
                }

                event = events_rx.recv() => {
                    if let Some(event) = event {
                        self.handle_peer_event(event).await;
                    }
                }

                _ = connect_tick.tick() => {
                    self.maybe_connect(max_connections, events_tx.clone());
                }
            }
        }

        self.connected.clear();
    }

    fn maybe_connect(&mut self, max_connections: usize, events_tx: mpsc::Sender<PeerEvent>) {
        if self.connected.len() >= max_connections {
            return;
        }
        let addr = match self.candidates.next_candidate() {
            Some(addr) => addr,
            None => return,
        };
        // Claim it immediately so the next tick doesn't also dial it.
        self.candidates.remove(&addr);

        let config = self.config.clone();
        let our_best_height = self.our_best_height;
        let commands = self.commands.clone();

        tokio::spawn(async move {
            let outcome = connect_one(addr, config, our_best_height, events_tx).await;
            let command = match outcome {
                Ok((client, info)) => Command::Connected { addr, client, info },
                Err(_) => Command::ConnectFailed(addr),
            };
            let _ = commands.send(command).await;
        });
    }

    async fn handle_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Disconnected { addr } => {
                self.connected.remove(&addr);
                self.candidates.report_disconnected(addr);
                self.sync_shared();
                self.elect_download_peer();
                let _ = self.listeners.send(GroupEvent::PeerDisconnected(addr));
            }
            PeerEvent::Rtt { addr, ewma_millis } => {
                if let Some(peer) = self.connected.get_mut(&addr) {
                    peer.ewma_rtt_millis = Some(ewma_millis);
                }
                self.elect_download_peer();
            }
            PeerEvent::Addresses(addrs) => {
                self.address_book.extend(addrs.iter().copied());
                self.candidates.add(addrs.iter().map(|a| a.addr));
            }
            PeerEvent::GetAddr { addr } => {
                if let Some(peer) = self.connected.get(&addr) {
                    let sample = self.address_book.sample(constants::MAX_ADDR_PER_MESSAGE);
                    let mut client = peer.client.clone();
                    tokio::spawn(async move {
                        use tower::Service;
                        let _ = Service::call(&mut client, Request::SendAddresses(sample)).await;
                    });
                }
            }
            PeerEvent::BlockAnnounced { addr, hash } => {
                let _ = self.listeners.send(GroupEvent::BlockAnnounced { addr, hash });
            }
            PeerEvent::Transaction(tx) => {
                let _ = self.listeners.send(GroupEvent::TransactionReceived(tx));
            }
            PeerEvent::Block(block) => {
                let _ = self.listeners.send(GroupEvent::BlockReceived(block));
            }
            PeerEvent::DataRequested { addr, items } => {
                self.service_data_request(addr, items).await;
            }
            PeerEvent::Connected { .. } => {
                // Handled via `Command::Connected`, which carries the
                // `Client` handle this event alone doesn't have.
            }
        }
    }

    async fn service_data_request(
        &mut self,
        addr: SocketAddr,
        items: Vec<crate::protocol::external::InventoryHash>,
    ) {
        use crate::protocol::external::InventoryHash;
        use tower::Service;

        for item in items {
            if let InventoryHash::Tx(hash) = item {
                let reached_quorum = if let Some(pending) = self.pending_broadcasts.get_mut(&hash) {
                    if pending.acked.insert(addr) {
                        if let Some(peer) = self.connected.get(&addr) {
                            let mut client = peer.client.clone();
                            let tx = pending.tx.clone();
                            tokio::spawn(async move {
                                let _ = Service::call(&mut client, Request::PushTransaction(tx)).await;
                            });
                        }
                    }
                    pending.acked.len() >= self.config.min_broadcast_connections
                } else {
                    false
                };
                if reached_quorum {
                    if let Some(mut pending) = self.pending_broadcasts.remove(&hash) {
                        if let Some(respond) = pending.respond.take() {
                            let _ = respond.send(Ok(()));
                        }
                    }
                }
            }
        }
    }

    async fn start_broadcast(
        &mut self,
        tx: Arc<transaction::Transaction>,
        respond: oneshot::Sender<Result<(), PeerError>>,
    ) {
        use tower::Service;

        let hash = tx.hash();

        if self.connected.is_empty() {
            let _ = respond.send(Err(PeerError::Overloaded("no connected peers")));
            return;
        }

        self.pending_broadcasts.insert(
            hash,
            PendingBroadcast {
                tx,
                acked: HashSet::new(),
                respond: Some(respond),
            },
        );

        for peer in self.connected.values() {
            let mut client = peer.client.clone();
            tokio::spawn(async move {
                let _ = Service::call(&mut client, Request::AdvertiseTransactions(vec![hash])).await;
            });
        }

        let commands = self.commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(constants::REQUEST_TIMEOUT).await;
            let _ = commands.send(Command::BroadcastTimedOut(hash)).await;
        });
    }

    /// Sends a `getblocks` request to the elected download peer only --
    /// only the download peer requests blocks; others are observers. The
    /// resulting `inv`/`getdata`/`block` flow is handled
    /// automatically by the peer's connection task.
    fn request_blocks(&mut self, known_blocks: Vec<block::Hash>, stop: Option<block::Hash>) {
        let download_peer = self.shared.lock().expect("peer group lock poisoned").download_peer;
        let addr = match download_peer {
            Some(addr) => addr,
            None => return,
        };
        if let Some(peer) = self.connected.get(&addr) {
            let mut client = peer.client.clone();
            tokio::spawn(async move {
                use tower::Service;
                let _ = Service::call(&mut client, Request::GetBlocks { known_blocks, stop }).await;
            });
        }
    }

    fn elect_download_peer(&mut self) {
        let elected = self
            .connected
            .iter()
            .max_by(|(_, a), (_, b)| {
                a.info.best_block.cmp(&b.info.best_block).then_with(|| {
                    // Lower RTT wins ties; peers with no sample yet are
                    // treated as having the worst (infinite) RTT.
                    let rtt_a = a.ewma_rtt_millis.unwrap_or(f64::INFINITY);
                    let rtt_b = b.ewma_rtt_millis.unwrap_or(f64::INFINITY);
                    rtt_b.partial_cmp(&rtt_a).unwrap_or(std::cmp::Ordering::Equal)
                })
            })
            .map(|(addr, _)| *addr);

        let changed = {
            let mut shared = self.shared.lock().expect("peer group lock poisoned");
            if shared.download_peer != elected {
                shared.download_peer = elected;
                true
            } else {
                false
            }
        };
        if changed {
            let _ = self.listeners.send(GroupEvent::DownloadPeerChanged(elected));
        }
    }

    fn sync_shared(&self) {
        let mut shared = self.shared.lock().expect("peer group lock poisoned");
        shared.connected = self.connected.keys().copied().collect();
    }
}

async fn connect_one(
    addr: SocketAddr,
    config: Config,
    our_best_height: block::Height,
    events_tx: mpsc::Sender<PeerEvent>,
) -> Result<(Client, PeerInfo), PeerError> {
    let connect_timeout = config.connect_timeout;
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| PeerError::Timeout("connect"))?
        .map_err(PeerError::Io)?;
    peer::handshake(stream, addr, config, our_best_height, events_tx).await
}

/// Integration tests driving a real [`PeerGroup`] against loopback TCP
/// "peers" that speak just enough of the wire protocol (handshake, then
/// `inv`/`getdata`/`tx`) to exercise `broadcast_transaction`'s quorum logic
/// end to end, without a real remote node.
#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use std::convert::TryFrom;
    use tokio::net::TcpListener;
    use tokio_util::codec::Framed;

    use ember_chain::{
        amount::{Amount, NonNegative},
        parameters::Network,
        transaction::{LockTime, Transaction},
        transparent::{self, Script},
    };

    use crate::protocol::external::{
        types::{Nonce, PeerServices, ProtocolVersion},
        Codec, InventoryHash, Message, Version,
    };

    fn dummy_tx() -> Arc<Transaction> {
        let input = transparent::Input::PrevOut {
            outpoint: transparent::OutPoint {
                hash: ember_chain::transaction::Hash([9; 32]),
                index: 0,
            },
            unlock_script: Script(vec![0x51]),
            sequence: 0xFFFF_FFFF,
        };
        let output = transparent::Output {
            value: Amount::<NonNegative>::try_from(1_000).unwrap(),
            lock_script: Script(vec![0x76, 0xa9, 0x14]),
        };
        Arc::new(Transaction::new(1, vec![input], vec![output], LockTime::unlocked()))
    }

    /// Accepts one connection on `listener`, completes the inbound side of
    /// the handshake, then waits for the broadcaster's `inv` for `tx_hash`
    /// and answers with `getdata` followed by draining the resulting `tx`.
    async fn mock_peer(listener: TcpListener, tx_hash: transaction::Hash) {
        let (stream, addr) = listener.accept().await.expect("accept succeeds");
        let mut framed = Framed::new(
            stream,
            Codec::builder().for_network(Network::Mainnet).finish(),
        );

        match framed.next().await {
            Some(Ok(Message::Version(_))) => {}
            other => panic!("expected version, got {:?}", other.map(|r| r.is_ok())),
        }

        let our_version = Version::new(
            ProtocolVersion(70016),
            addr,
            PeerServices::NODE_NETWORK,
            PeerServices::NODE_NETWORK,
            addr,
            Nonce::random(),
            "/mock:0.1.0/".to_owned(),
            block::Height(0),
            true,
        );
        framed
            .send(Message::Version(our_version))
            .await
            .expect("send version");

        match framed.next().await {
            Some(Ok(Message::Verack)) => {}
            other => panic!("expected verack, got {:?}", other.map(|r| r.is_ok())),
        }
        framed.send(Message::Verack).await.expect("send verack");

        loop {
            match framed.next().await {
                Some(Ok(Message::Inv(items))) => {
                    if items.contains(&InventoryHash::Tx(tx_hash)) {
                        framed
                            .send(Message::GetData(vec![InventoryHash::Tx(tx_hash)]))
                            .await
                            .expect("send getdata");
                    }
                }
                Some(Ok(Message::Tx(received))) => {
                    assert_eq!(received.hash(), tx_hash);
                    break;
                }
                Some(Ok(Message::Ping(nonce))) => {
                    framed.send(Message::Pong(nonce)).await.expect("send pong");
                }
                Some(Ok(_)) => {}
                other => panic!("connection ended early: {:?}", other.map(|r| r.is_ok())),
            }
        }

        // Keep the connection open until the test finishes so the peer
        // group doesn't see a spurious disconnect mid-broadcast.
        futures::future::pending::<()>().await;
    }

    #[tokio::test]
    async fn broadcast_succeeds_once_quorum_requests_it() {
        let tx = dummy_tx();
        let tx_hash = tx.hash();

        let mut addrs = Vec::new();
        let mut mock_peers = Vec::new();
        for _ in 0..3 {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
            addrs.push(listener.local_addr().expect("local_addr"));
            mock_peers.push(tokio::spawn(mock_peer(listener, tx_hash)));
        }

        let config = Config {
            initial_peers: addrs,
            max_connections: 3,
            min_broadcast_connections: 2,
            connect_timeout: Duration::from_secs(5),
            ..Config::default()
        };

        let peers = PeerGroup::spawn(config, block::Height(0));

        let outcome = tokio::time::timeout(
            Duration::from_secs(15),
            peers.broadcast_transaction(tx),
        )
        .await
        .expect("broadcast did not time out");

        assert!(outcome.is_ok(), "broadcast should reach quorum: {:?}", outcome);

        for handle in mock_peers {
            handle.abort();
        }
        peers.stop().await;
    }
}
