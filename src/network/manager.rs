// Peer manager
//
// Discovers candidates over DNS seeds and addr gossip, keeps up to
// MAX_PEERS sessions alive, and runs the two sync drivers: header sync
// (tail locators) and merkle sync (batched filtered-block download with a
// persistent watermark).

use crate::chain::Chain;
use crate::core::Hash256;
use crate::network::message::{GetHeadersMsg, InvKind, InvVec, Message};
use crate::network::peer::{PeerSession, SessionContext, SessionError};
use crate::params::{NCONFIRMED, PROTOCOL_VERSION};
use crate::storage::{Store, StoreError, BUCKET_STATUS};
use crate::wallet::{KeyStore, Ledger};
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{sleep, timeout};

/// Ceiling on concurrent sessions
pub const MAX_PEERS: usize = 10;
/// Deadline for a dial attempt
const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
/// Pause between discovery/dial rounds
const DISCOVERY_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Probe interval once header sync has caught up
const CAUGHT_UP_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Wait on header feedback before issuing the next locator round
const HEADER_ROUND_TIMEOUT: Duration = Duration::from_secs(60);
/// Filtered blocks requested per merkle batch
const MERKLE_BATCH: u64 = 500;
/// Wait for one merkle batch to finish before re-requesting leftovers
const MERKLE_ROUND_TIMEOUT: Duration = Duration::from_secs(120);

const STATUS_LASTMERKLE: &[u8] = b"lastmerkle";

/// Feedback from sessions to the manager and drivers
#[derive(Debug, Clone)]
pub enum PeerEvent {
    Handshaked { peer: SocketAddr, start_height: u32 },
    HeadersApplied { peer: SocketAddr, last: Option<Hash256> },
    MerkleDone { peer: SocketAddr, block: Hash256 },
    MerkleFailed { peer: SocketAddr, block: Hash256 },
    AddrGossip(Vec<SocketAddr>),
    Disconnected(SocketAddr),
}

struct PeerHandle {
    sender: mpsc::Sender<Message>,
    start_height: u32,
}

/// Connection pool plus sync drivers
pub struct PeerManager {
    chain: Arc<Chain>,
    ledger: Arc<Ledger>,
    keystore: Arc<KeyStore>,
    status: sled::Tree,
    candidates: RwLock<HashMap<String, SocketAddr>>,
    alive: RwLock<HashMap<SocketAddr, PeerHandle>>,
    self_addr: Arc<RwLock<SocketAddr>>,
    events_tx: mpsc::UnboundedSender<PeerEvent>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<PeerEvent>>,
    headers_tx: mpsc::UnboundedSender<Option<Hash256>>,
    headers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Option<Hash256>>>,
    merkle_tx: mpsc::UnboundedSender<(Hash256, bool)>,
    merkle_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(Hash256, bool)>>,
    bloom_tweak: u32,
    shutdown: watch::Sender<bool>,
}

impl PeerManager {
    pub fn new(
        store: &Store,
        chain: Arc<Chain>,
        ledger: Arc<Ledger>,
        keystore: Arc<KeyStore>,
    ) -> Result<Arc<Self>, StoreError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (headers_tx, headers_rx) = mpsc::unbounded_channel();
        let (merkle_tx, merkle_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        let port = chain.params().port;
        Ok(Arc::new(Self {
            status: store.bucket(BUCKET_STATUS)?,
            chain,
            ledger,
            keystore,
            candidates: RwLock::new(HashMap::new()),
            alive: RwLock::new(HashMap::new()),
            self_addr: Arc::new(RwLock::new(SocketAddr::new(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                port,
            ))),
            events_tx,
            events_rx: tokio::sync::Mutex::new(events_rx),
            headers_tx,
            headers_rx: tokio::sync::Mutex::new(headers_rx),
            merkle_tx,
            merkle_rx: tokio::sync::Mutex::new(merkle_rx),
            bloom_tweak: rand::random(),
            shutdown,
        }))
    }

    fn session_context(&self) -> SessionContext {
        SessionContext {
            chain: self.chain.clone(),
            ledger: self.ledger.clone(),
            keystore: self.keystore.clone(),
            self_addr: self.self_addr.clone(),
            events: self.events_tx.clone(),
            bloom_tweak: self.bloom_tweak,
        }
    }

    /// Run discovery, the dialer, the event pump and both sync drivers
    /// until `stop` is called.
    pub async fn run(self: Arc<Self>) {
        let tasks = [
            tokio::spawn(Self::discovery_loop(self.clone())),
            tokio::spawn(Self::event_loop(self.clone())),
            tokio::spawn(Self::header_sync_loop(self.clone())),
            tokio::spawn(Self::merkle_sync_loop(self.clone())),
        ];
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Signal every driver and session to wind down
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub async fn peer_count(&self) -> usize {
        self.alive.read().await.len()
    }

    /// Register a candidate address (seed, gossip or configuration)
    pub async fn add_candidate(&self, addr: SocketAddr) {
        self.candidates
            .write()
            .await
            .insert(addr.to_string(), addr);
    }

    async fn resolve_seeds(&self) {
        let params = self.chain.params();
        for seed in &params.dns_seeds {
            let query = format!("{}:{}", seed, params.port);
            match tokio::net::lookup_host(&query).await {
                Ok(addrs) => {
                    for addr in addrs {
                        self.add_candidate(addr).await;
                    }
                }
                Err(e) => log::warn!("dns seed {} failed: {}", seed, e),
            };
        }
        log::info!(
            "discovery: {} candidate peers",
            self.candidates.read().await.len()
        );
    }

    async fn discovery_loop(manager: Arc<Self>) {
        let mut shutdown = manager.shutdown.subscribe();
        loop {
            if manager.stopping() {
                return;
            }
            manager.resolve_seeds().await;
            manager.dial_candidates().await;
            tokio::select! {
                _ = sleep(DISCOVERY_INTERVAL) => {}
                _ = shutdown.changed() => return,
            }
        }
    }

    /// Dial candidates until the pool is full
    async fn dial_candidates(&self) {
        let targets: Vec<SocketAddr> = {
            let candidates = self.candidates.read().await;
            let alive = self.alive.read().await;
            candidates
                .values()
                .filter(|addr| !alive.contains_key(*addr))
                .copied()
                .collect()
        };
        for addr in targets {
            if self.alive.read().await.len() >= MAX_PEERS || self.stopping() {
                break;
            }
            self.connect(addr).await;
        }
        let count = self.alive.read().await.len();
        if count < MAX_PEERS {
            log::debug!("peer pool below target: {}/{}", count, MAX_PEERS);
        }
    }

    /// Dial one peer and spawn its session
    pub async fn connect(&self, addr: SocketAddr) {
        let stream = match timeout(DIAL_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                log::debug!("dial {} failed: {}", addr, e);
                return;
            }
            Err(_) => {
                log::debug!("dial {} timed out", addr);
                return;
            }
        };
        log::info!("connected to {}", addr);
        let (session, sender) = PeerSession::new(stream, addr, self.session_context());
        self.alive.write().await.insert(
            addr,
            PeerHandle {
                sender,
                start_height: 0,
            },
        );

        let events = self.events_tx.clone();
        tokio::spawn(async move {
            match run_session(session).await {
                Ok(()) => log::info!("session {} ended", addr),
                Err(e) => log::info!("session {} closed: {}", addr, e),
            }
            let _ = events.send(PeerEvent::Disconnected(addr));
        });
    }

    /// Route one command to an alive session (the least-recently used
    /// rotation is immaterial; any synced peer can serve any request).
    async fn send_any(&self, msg: Message) -> bool {
        let alive = self.alive.read().await;
        for handle in alive.values() {
            if handle.sender.try_send(msg.clone()).is_ok() {
                return true;
            }
        }
        false
    }

    async fn event_loop(manager: Arc<Self>) {
        let mut shutdown = manager.shutdown.subscribe();
        let mut events = manager.events_rx.lock().await;
        loop {
            let event = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => event,
                    None => return,
                },
                _ = shutdown.changed() => return,
            };
            match event {
                PeerEvent::Handshaked { peer, start_height } => {
                    if let Some(handle) = manager.alive.write().await.get_mut(&peer) {
                        handle.start_height = start_height;
                    }
                }
                PeerEvent::HeadersApplied { last, .. } => {
                    let _ = manager.headers_tx.send(last);
                }
                PeerEvent::MerkleDone { block, .. } => {
                    let _ = manager.merkle_tx.send((block, true));
                }
                PeerEvent::MerkleFailed { block, .. } => {
                    let _ = manager.merkle_tx.send((block, false));
                }
                PeerEvent::AddrGossip(addrs) => {
                    for addr in addrs {
                        manager.add_candidate(addr).await;
                    }
                }
                PeerEvent::Disconnected(peer) => {
                    manager.alive.write().await.remove(&peer);
                }
            }
        }
    }

    /// Are all connected peers within NCONFIRMED of our best tip?
    async fn caught_up(&self) -> bool {
        let best = match self.chain.best_tip() {
            Ok(tip) => tip.height,
            Err(_) => return false,
        };
        let alive = self.alive.read().await;
        !alive.is_empty()
            && alive
                .values()
                .all(|h| (h.start_height as u64) <= best + NCONFIRMED)
    }

    /// Ask for headers past every current tail
    async fn request_headers(&self) -> bool {
        let tails = match self.chain.tails() {
            Ok(tails) => tails,
            Err(e) => {
                log::error!("cannot read tails: {}", e);
                return false;
            }
        };
        let mut sent = false;
        for tail in tails {
            match self.chain.locator(&tail.hash) {
                Ok(locator) => {
                    let msg = Message::GetHeaders(GetHeadersMsg {
                        version: PROTOCOL_VERSION,
                        locator,
                        hash_stop: Hash256::zero(),
                    });
                    sent |= self.send_any(msg).await;
                }
                Err(e) => log::error!("locator for {} failed: {}", tail.hash, e),
            }
        }
        sent
    }

    async fn header_sync_loop(manager: Arc<Self>) {
        let mut shutdown = manager.shutdown.subscribe();
        let mut feedback = manager.headers_rx.lock().await;
        let mut idle_rounds = 0u32;
        loop {
            if manager.stopping() {
                return;
            }
            if !manager.request_headers().await {
                // no peer reachable yet
                tokio::select! {
                    _ = sleep(Duration::from_secs(5)) => continue,
                    _ = shutdown.changed() => return,
                }
            }
            tokio::select! {
                result = timeout(HEADER_ROUND_TIMEOUT, feedback.recv()) => {
                    match result {
                        Ok(Some(Some(_last))) => idle_rounds = 0,
                        Ok(Some(None)) => idle_rounds += 1,
                        Ok(None) => return,
                        Err(_) => {}
                    }
                }
                _ = shutdown.changed() => return,
            }
            if idle_rounds > 2 && manager.caught_up().await {
                log::info!("header sync caught up at {:?}", manager.chain.best_tip().map(|t| t.height));
                tokio::select! {
                    _ = sleep(CAUGHT_UP_INTERVAL) => {}
                    _ = shutdown.changed() => return,
                }
                idle_rounds = 0;
            }
        }
    }

    /// Persistent merkle watermark
    pub fn last_merkle_height(&self) -> u64 {
        self.status
            .get(STATUS_LASTMERKLE)
            .ok()
            .flatten()
            .and_then(|v| v.as_ref().try_into().ok().map(u64::from_le_bytes))
            .unwrap_or(0)
    }

    fn set_last_merkle_height(&self, height: u64) {
        if let Err(e) = self.status.insert(STATUS_LASTMERKLE, &height.to_le_bytes()[..]) {
            log::error!("cannot persist merkle watermark: {}", e);
        }
    }

    /// Next batch of confirmed heights to scan, as (height, hash) pairs
    fn plan_merkle_batch(&self) -> Vec<(u64, Hash256)> {
        self.chain
            .confirmed_hashes(self.last_merkle_height(), MERKLE_BATCH)
            .unwrap_or_default()
    }

    async fn merkle_sync_loop(manager: Arc<Self>) {
        let mut shutdown = manager.shutdown.subscribe();
        let mut feedback = manager.merkle_rx.lock().await;
        loop {
            if manager.stopping() {
                return;
            }
            let batch = manager.plan_merkle_batch();
            if batch.is_empty() {
                tokio::select! {
                    _ = sleep(Duration::from_secs(30)) => continue,
                    _ = shutdown.changed() => return,
                }
            }

            let mut pending: HashSet<Hash256> = batch.iter().map(|(_, h)| *h).collect();
            let inv: Vec<InvVec> = batch
                .iter()
                .map(|(_, h)| InvVec::new(InvKind::FilteredBlock, *h))
                .collect();
            if !manager.send_any(Message::GetData(inv)).await {
                tokio::select! {
                    _ = sleep(Duration::from_secs(5)) => continue,
                    _ = shutdown.changed() => return,
                }
            }

            // drain feedback until the batch completes or the round
            // deadline passes; leftovers are re-requested next round
            let deadline = tokio::time::Instant::now() + MERKLE_ROUND_TIMEOUT;
            while !pending.is_empty() {
                let event = tokio::select! {
                    event = tokio::time::timeout_at(deadline, feedback.recv()) => event,
                    _ = shutdown.changed() => return,
                };
                match event {
                    Ok(Some((block, true))) => {
                        pending.remove(&block);
                    }
                    Ok(Some((_, false))) => {}
                    Ok(None) => return,
                    Err(_) => break,
                }
            }

            // advance the watermark over the contiguous finished prefix
            let mut watermark = manager.last_merkle_height();
            for (height, hash) in &batch {
                if pending.contains(hash) {
                    break;
                }
                watermark = height + 1;
            }
            if watermark > manager.last_merkle_height() {
                manager.set_last_merkle_height(watermark);
                log::info!("merkle sync watermark at {}", watermark);
            }
        }
    }
}

/// Handshake then run; split out so the spawned task stays readable
async fn run_session(mut session: PeerSession) -> Result<(), SessionError> {
    session.handshake().await?;
    session.run().await
}
