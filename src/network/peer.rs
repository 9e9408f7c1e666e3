// Peer session
//
// One task per connection. A reader half decodes frames into a channel;
// the session loop selects over inbound packets, outbound commands from
// the manager, and an idle timer. A merkleblock and its matched tx
// packets are consumed as one unit, so no other handler interleaves.

use crate::chain::{Chain, ChainError};
use crate::core::Hash256;
use crate::network::manager::PeerEvent;
use crate::network::message::{self, FrameHeader, Message, ProtocolError, VersionMsg,
                              FRAME_HEADER_LEN};
use crate::network::message::{InvKind, InvVec, NetAddr};
use crate::params::PROTOCOL_VERSION;
use crate::wallet::{KeyStore, Ledger};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{sleep, timeout};

/// Socket read/write deadline and idle-ping interval
pub const IO_TIMEOUT: Duration = Duration::from_secs(3 * 60);
/// Idle expirations tolerated before the session closes
const MAX_IDLE_STRIKES: u32 = 2;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("peer timed out")]
    Timeout,
    #[error("peer closed the connection: {0}")]
    PeerClosed(String),
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
    #[error("peer speaks obsolete protocol {0}")]
    OldProtocol(u32),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("chain rejected peer data: {0}")]
    Chain(#[from] ChainError),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared handles every session works against
#[derive(Clone)]
pub struct SessionContext {
    pub chain: Arc<Chain>,
    pub ledger: Arc<Ledger>,
    pub keystore: Arc<KeyStore>,
    /// Our externally visible address, as reported by peers
    pub self_addr: Arc<RwLock<SocketAddr>>,
    /// Feedback to the manager and its sync drivers
    pub events: mpsc::UnboundedSender<PeerEvent>,
    /// Process-lifetime bloom tweak
    pub bloom_tweak: u32,
}

type Packet = Result<(String, Vec<u8>), SessionError>;

/// Read frames off the socket into the packet channel until it fails
async fn read_loop(mut read: OwnedReadHalf, magic: [u8; 4], packets: mpsc::Sender<Packet>) {
    loop {
        let result = read_frame(&mut read, &magic).await;
        let failed = result.is_err();
        if packets.send(result).await.is_err() || failed {
            return;
        }
    }
}

async fn read_frame(
    read: &mut OwnedReadHalf,
    magic: &[u8; 4],
) -> Result<(String, Vec<u8>), SessionError> {
    // idle sockets are allowed; the session's timer handles silence
    let mut head = [0u8; FRAME_HEADER_LEN];
    read.read_exact(&mut head).await?;
    let header: FrameHeader = message::parse_frame_header(magic, &head)?;

    // once a frame started, the rest must arrive promptly
    let mut payload = vec![0u8; header.length as usize];
    timeout(IO_TIMEOUT, read.read_exact(&mut payload))
        .await
        .map_err(|_| SessionError::Timeout)??;
    message::check_payload(&header, &payload)?;
    Ok((header.command, payload))
}

/// One connected peer
pub struct PeerSession {
    addr: SocketAddr,
    write: OwnedWriteHalf,
    packets: mpsc::Receiver<Packet>,
    outbound: mpsc::Receiver<Message>,
    ctx: SessionContext,
    magic: [u8; 4],
    last_ping: u64,
    idle_strikes: u32,
    pub start_height: u32,
}

impl PeerSession {
    /// Wrap an established TCP connection. Returns the session and the
    /// sender the manager uses to issue commands to this peer.
    pub fn new(stream: TcpStream, addr: SocketAddr, ctx: SessionContext) -> (Self, mpsc::Sender<Message>) {
        let magic = ctx.chain.params().magic;
        let (read, write) = stream.into_split();
        let (packet_tx, packet_rx) = mpsc::channel(64);
        tokio::spawn(read_loop(read, magic, packet_tx));
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let session = Self {
            addr,
            write,
            packets: packet_rx,
            outbound: outbound_rx,
            ctx,
            magic,
            last_ping: 0,
            idle_strikes: 0,
            start_height: 0,
        };
        (session, outbound_tx)
    }

    async fn send(&mut self, msg: &Message) -> Result<(), SessionError> {
        let frame = message::build_frame(&self.magic, msg);
        timeout(IO_TIMEOUT, self.write.write_all(&frame))
            .await
            .map_err(|_| SessionError::Timeout)??;
        log::debug!("{}: sent {}", self.addr, msg.command());
        Ok(())
    }

    async fn recv(&mut self) -> Result<(String, Vec<u8>), SessionError> {
        match timeout(IO_TIMEOUT, self.packets.recv()).await {
            Err(_) => Err(SessionError::Timeout),
            Ok(None) => Err(SessionError::PeerClosed("read loop ended".into())),
            Ok(Some(packet)) => packet,
        }
    }

    async fn send_ping(&mut self) -> Result<(), SessionError> {
        self.last_ping = rand::random();
        self.send(&Message::Ping(self.last_ping)).await
    }

    /// version/verack exchange followed by ping, filterload and mempool
    pub async fn handshake(&mut self) -> Result<(), SessionError> {
        let version = self.version_msg().await;
        self.send(&Message::Version(version)).await?;

        let (command, payload) = self.recv().await?;
        if command != "version" {
            return Err(SessionError::HandshakeFailed(format!(
                "expected version, got {}",
                command
            )));
        }
        let Message::Version(theirs) = Message::decode_payload(&command, &payload)? else {
            return Err(SessionError::HandshakeFailed("undecodable version".into()));
        };
        if theirs.version < PROTOCOL_VERSION {
            return Err(SessionError::OldProtocol(theirs.version));
        }
        self.start_height = theirs.start_height;
        {
            // the peer tells us which address it sees us under
            let seen = theirs.addr_recv.socket_addr();
            let mut myself = self.ctx.self_addr.write().await;
            let port = myself.port();
            *myself = SocketAddr::new(seen.ip(), port);
        }
        log::info!(
            "{}: version {} agent {} height {}",
            self.addr,
            theirs.version,
            theirs.user_agent,
            theirs.start_height
        );

        let (command, _) = self.recv().await?;
        if command != "verack" {
            return Err(SessionError::HandshakeFailed(format!(
                "expected verack, got {}",
                command
            )));
        }
        self.send(&Message::Verack).await?;
        self.send_ping().await?;

        let filter = self
            .ctx
            .keystore
            .bloom_filter(self.ctx.bloom_tweak)
            .map_err(|e| SessionError::HandshakeFailed(e.to_string()))?;
        self.send(&Message::FilterLoad(message::FilterLoadMsg {
            filter: filter.as_bytes().to_vec(),
            hash_funcs: crate::core::bloom::HASH_FUNCS,
            tweak: filter.tweak(),
            flags: 1,
        }))
        .await?;
        self.send(&Message::Mempool).await?;
        let _ = self.ctx.events.send(PeerEvent::Handshaked {
            peer: self.addr,
            start_height: self.start_height,
        });
        Ok(())
    }

    async fn version_msg(&self) -> VersionMsg {
        let myself = *self.ctx.self_addr.read().await;
        VersionMsg {
            version: PROTOCOL_VERSION,
            services: 0,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("system clock before epoch")
                .as_secs(),
            addr_recv: NetAddr::from_socket_addr(&self.addr, 0),
            addr_from: NetAddr::from_socket_addr(&myself, 0),
            nonce: rand::random(),
            user_agent: self.ctx.chain.params().user_agent.clone(),
            start_height: self.ctx.chain.best_tip().map(|t| t.height as u32).unwrap_or(0),
            relay: 0,
        }
    }

    /// Run the session until it errors or the manager drops the handle
    pub async fn run(mut self) -> Result<(), SessionError> {
        loop {
            tokio::select! {
                packet = self.packets.recv() => {
                    let (command, payload) = match packet {
                        None => return Err(SessionError::PeerClosed("read loop ended".into())),
                        Some(result) => result?,
                    };
                    self.idle_strikes = 0;
                    self.dispatch(&command, &payload).await?;
                }
                command = self.outbound.recv() => {
                    match command {
                        Some(msg) => self.send(&msg).await?,
                        // manager dropped us; orderly shutdown
                        None => return Ok(()),
                    }
                }
                _ = sleep(IO_TIMEOUT) => {
                    self.idle_strikes += 1;
                    if self.idle_strikes > MAX_IDLE_STRIKES {
                        return Err(SessionError::Timeout);
                    }
                    self.send_ping().await?;
                }
            }
        }
    }

    async fn dispatch(&mut self, command: &str, payload: &[u8]) -> Result<(), SessionError> {
        log::debug!("{}: received {}", self.addr, command);
        match Message::decode_payload(command, payload)? {
            Message::Ping(nonce) => self.send(&Message::Pong(nonce)).await?,
            Message::Pong(nonce) => {
                if nonce != self.last_ping {
                    return Err(SessionError::PeerClosed("pong nonce mismatch".into()));
                }
            }
            Message::Inv(inventory) => self.handle_inv(inventory).await?,
            Message::Headers(headers) => self.handle_headers(headers)?,
            Message::MerkleBlock(mb) => self.handle_merkleblock(mb).await?,
            Message::Addr(addrs) => {
                let peers = addrs.iter().map(|a| a.addr.socket_addr()).collect();
                let _ = self.ctx.events.send(PeerEvent::AddrGossip(peers));
            }
            Message::Tx(tx) => {
                // unsolicited transactions cannot be verified by an SPV node
                log::debug!("{}: ignoring loose tx {}", self.addr, tx.txid());
            }
            other => {
                log::info!("{}: {} unhandled, skipping", self.addr, other.command());
            }
        }
        Ok(())
    }

    /// Announced blocks are fetched as filtered blocks; announced
    /// transactions are ignored since we cannot validate them.
    async fn handle_inv(&mut self, inventory: Vec<InvVec>) -> Result<(), SessionError> {
        let mut wanted = Vec::new();
        for entry in inventory {
            match InvKind::from_u32(entry.kind) {
                Some(InvKind::Block) => {
                    wanted.push(InvVec::new(InvKind::FilteredBlock, entry.hash));
                }
                Some(InvKind::Tx) | Some(InvKind::FilteredBlock) => {}
                kind => {
                    log::info!("{}: inv type {:?} ignored", self.addr, kind);
                }
            }
        }
        if !wanted.is_empty() {
            self.send(&Message::GetData(wanted)).await?;
        }
        Ok(())
    }

    fn handle_headers(&mut self, headers: Vec<crate::core::BlockHeader>) -> Result<(), SessionError> {
        let count = headers.len();
        match self.ctx.chain.append(&headers) {
            Ok(added) => {
                if !added.is_empty() {
                    log::info!("{}: {} headers added", self.addr, added.len());
                }
                let _ = self.ctx.events.send(PeerEvent::HeadersApplied {
                    peer: self.addr,
                    // an empty response means the peer has nothing past
                    // our locator
                    last: if count == 0 { None } else { headers.last().map(|h| h.hash()) },
                });
            }
            Err(ChainError::OrphanBlock(prev)) => {
                // expected while branches sync in parallel; the driver
                // answers with fresh locators
                log::debug!("{}: orphan headers (missing {})", self.addr, prev);
                let _ = self.ctx.events.send(PeerEvent::HeadersApplied {
                    peer: self.addr,
                    last: None,
                });
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Verify a merkle block and ingest exactly the matched transactions,
    /// which the peer must send immediately after it.
    async fn handle_merkleblock(&mut self, mb: message::MerkleBlockMsg) -> Result<(), SessionError> {
        let block_hash: Hash256 = mb.header.hash();

        if !self.ctx.chain.contains(&block_hash)? {
            match self.ctx.chain.append(&[mb.header]) {
                Ok(_) => {}
                Err(ChainError::OrphanBlock(_)) => {
                    log::debug!("{}: merkle block {} is orphaned", self.addr, block_hash);
                    let _ = self.ctx.events.send(PeerEvent::MerkleFailed {
                        peer: self.addr,
                        block: block_hash,
                    });
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }

        let (root, matched) = match mb.partial_tree().extract() {
            Ok(result) => result,
            Err(e) => {
                let _ = self.ctx.events.send(PeerEvent::MerkleFailed {
                    peer: self.addr,
                    block: block_hash,
                });
                return Err(SessionError::PeerClosed(format!(
                    "bad merkle proof for {}: {}",
                    block_hash, e
                )));
            }
        };
        if root != mb.header.merkle_root {
            let _ = self.ctx.events.send(PeerEvent::MerkleFailed {
                peer: self.addr,
                block: block_hash,
            });
            return Err(SessionError::PeerClosed(format!(
                "merkle root mismatch in {}",
                block_hash
            )));
        }

        // the matched transactions follow as individual tx packets, with
        // nothing in between; each must belong to the proven set
        let mut pending = matched;
        while !pending.is_empty() {
            let (command, payload) = self.recv().await?;
            if command != "tx" {
                return Err(SessionError::PeerClosed(format!(
                    "expected tx after merkleblock, got {}",
                    command
                )));
            }
            let Message::Tx(tx) = Message::decode_payload(&command, &payload)? else {
                unreachable!("tx payload decodes to Tx");
            };
            let txid = tx.txid();
            match pending.iter().position(|h| *h == txid) {
                Some(at) => {
                    pending.remove(at);
                }
                None => {
                    return Err(SessionError::PeerClosed(format!(
                        "tx {} does not match the merkle proof",
                        txid
                    )));
                }
            }
            if let Err(e) = self.ctx.ledger.ingest(&tx, block_hash) {
                log::error!("{}: ledger rejected {}: {}", self.addr, txid, e);
            }
        }

        let _ = self.ctx.events.send(PeerEvent::MerkleDone {
            peer: self.addr,
            block: block_hash,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainEntry;
    use crate::core::script;
    use crate::core::{BlockHeader, Transaction, TxInput, TxOutput};
    use crate::network::message::{FilterLoadMsg, GetHeadersMsg};
    use crate::params::Params;
    use crate::storage::Store;
    use tokio::net::TcpListener;

    /// The remote end of a session under test: reads and writes whole
    /// frames with the shared codec.
    struct MockPeer {
        stream: TcpStream,
        magic: [u8; 4],
    }

    impl MockPeer {
        async fn recv(&mut self) -> Message {
            let mut head = [0u8; FRAME_HEADER_LEN];
            self.stream.read_exact(&mut head).await.unwrap();
            let header = message::parse_frame_header(&self.magic, &head).unwrap();
            let mut payload = vec![0u8; header.length as usize];
            self.stream.read_exact(&mut payload).await.unwrap();
            message::check_payload(&header, &payload).unwrap();
            Message::decode_payload(&header.command, &payload).unwrap()
        }

        async fn send(&mut self, msg: &Message) {
            let frame = message::build_frame(&self.magic, msg);
            self.stream.write_all(&frame).await.unwrap();
        }

        fn version(&self, protocol: u32, start_height: u32) -> Message {
            Message::Version(VersionMsg {
                version: protocol,
                services: 0,
                timestamp: 1_700_000_000,
                addr_recv: NetAddr::from_socket_addr(&"127.0.0.1:9401".parse().unwrap(), 0),
                addr_from: NetAddr::from_socket_addr(&"127.0.0.1:9401".parse().unwrap(), 0),
                nonce: 1,
                user_agent: "/mock:0.1/".to_string(),
                start_height,
                relay: 0,
            })
        }

        /// Serve the remote half of a successful handshake
        async fn serve_handshake(&mut self, start_height: u32) {
            let version = self.recv().await;
            assert_eq!(version.command(), "version");
            self.send(&self.version(PROTOCOL_VERSION, start_height)).await;
            self.send(&Message::Verack).await;
            assert_eq!(self.recv().await.command(), "verack");
            assert_eq!(self.recv().await.command(), "ping");
            let filterload = self.recv().await;
            let Message::FilterLoad(FilterLoadMsg { filter, hash_funcs, .. }) = filterload else {
                panic!("expected filterload, got {}", filterload.command());
            };
            assert_eq!(filter.len(), crate::core::bloom::BYTE_LEN);
            assert_eq!(hash_funcs, crate::core::bloom::HASH_FUNCS);
            assert_eq!(self.recv().await.command(), "mempool");
        }
    }

    struct Harness {
        chain: Arc<Chain>,
        ledger: Arc<Ledger>,
        keystore: Arc<KeyStore>,
        events: mpsc::UnboundedReceiver<PeerEvent>,
        outbound: mpsc::Sender<Message>,
        session: tokio::task::JoinHandle<Result<(), SessionError>>,
        mock: MockPeer,
    }

    async fn harness() -> Harness {
        let params = Params::mainnet();
        let magic = params.magic;
        let store = Store::memory().unwrap();
        let chain = Arc::new(Chain::open(&store, params.clone()).unwrap());
        let keystore = Arc::new(KeyStore::open(&store, params).unwrap());
        let ledger = Arc::new(Ledger::open(&store, keystore.clone()).unwrap());
        let (events_tx, events) = mpsc::unbounded_channel();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ctx = SessionContext {
            chain: chain.clone(),
            ledger: ledger.clone(),
            keystore: keystore.clone(),
            self_addr: Arc::new(RwLock::new("127.0.0.1:9401".parse().unwrap())),
            events: events_tx,
            bloom_tweak: 7,
        };
        let dial = TcpStream::connect(addr);
        let (client, accepted) = tokio::join!(dial, listener.accept());
        let (mut session, outbound) = PeerSession::new(client.unwrap(), addr, ctx);
        let session = tokio::spawn(async move {
            session.handshake().await?;
            session.run().await
        });
        Harness {
            chain,
            ledger,
            keystore,
            events,
            outbound,
            session,
            mock: MockPeer {
                stream: accepted.unwrap().0,
                magic,
            },
        }
    }

    fn mainnet_headers() -> Vec<BlockHeader> {
        [
            "02000000b68b8c410d2ea4afd74fb56e370bfc1bedf929e1453896c9e79dd116011c9fffb9c39c20b4baf3b84cd72349300833086d686db142c51b26a196cdabbe7a0610d45ac352f0ff0f1e0010bb75",
            "020000008bd2106797e90cb3ed7e99c5226cc0c6ef2bc73771356071870ae001a6b778a3fc4430aa92e002ed08fd8d2d91c7fe536454c14aaf9b36b8ad06f8aa999d50f9de5ac352f0ff0f1e00062d67",
            "020000008246054e53a0f5338b7b3d82fd2c067af5bffcf7b16cd29e3d02c03f23b5288c7dde82951b1040a2368cbb2c36f811d44c78bd660171b97af35cfda298004cf0fc5ac352f0ff0f1e0007397d",
        ]
        .iter()
        .map(|h| BlockHeader::deserialize(&hex::decode(h).unwrap()).unwrap())
        .collect()
    }

    #[tokio::test]
    async fn test_handshake_and_ping() {
        let mut h = harness().await;
        h.mock.serve_handshake(42).await;

        match h.events.recv().await.unwrap() {
            PeerEvent::Handshaked { start_height, .. } => assert_eq!(start_height, 42),
            other => panic!("unexpected event {:?}", other),
        }

        // the session answers pings with matching pongs
        h.mock.send(&Message::Ping(777)).await;
        match h.mock.recv().await {
            Message::Pong(nonce) => assert_eq!(nonce, 777),
            other => panic!("expected pong, got {}", other.command()),
        }

        // unknown commands are skipped without closing the session
        h.mock
            .send(&Message::Unknown {
                command: "sendcmpct".to_string(),
            })
            .await;
        h.mock.send(&Message::Ping(778)).await;
        match h.mock.recv().await {
            Message::Pong(nonce) => assert_eq!(nonce, 778),
            other => panic!("expected pong, got {}", other.command()),
        }

        // dropping the command channel ends the session cleanly
        drop(h.outbound);
        assert!(h.session.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_old_protocol_rejected() {
        let mut h = harness().await;
        let version = h.mock.recv().await;
        assert_eq!(version.command(), "version");
        h.mock.send(&h.mock.version(60002, 0)).await;
        h.mock.send(&Message::Verack).await;
        match h.session.await.unwrap() {
            Err(SessionError::OldProtocol(60002)) => {}
            other => panic!("expected OldProtocol, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_headers_feed_the_chain() {
        let mut h = harness().await;
        h.mock.serve_handshake(3).await;
        let _ = h.events.recv().await; // Handshaked

        let headers = mainnet_headers();
        let last = headers[2].hash();
        h.mock.send(&Message::Headers(headers)).await;

        match h.events.recv().await.unwrap() {
            PeerEvent::HeadersApplied { last: Some(hash), .. } => assert_eq!(hash, last),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(h.chain.best_tip().unwrap().height, 3);

        // outbound commands from the manager reach the wire
        h.outbound
            .send(Message::GetHeaders(GetHeadersMsg {
                version: PROTOCOL_VERSION,
                locator: vec![last],
                hash_stop: Hash256::zero(),
            }))
            .await
            .unwrap();
        assert_eq!(h.mock.recv().await.command(), "getheaders");
    }

    #[tokio::test]
    async fn test_merkleblock_with_matched_tx() {
        let mut h = harness().await;
        h.mock.serve_handshake(1).await;
        let _ = h.events.recv().await;

        // a transaction paying one of our keys
        let pair = h.keystore.generate().unwrap();
        let tx = Transaction::new(
            vec![TxInput::new(Hash256::new([9; 32]), 0, vec![])],
            vec![TxOutput::new(12_345, script::p2pkh_output(&pair.pubkey_hash()))],
        );
        let txid = tx.txid();

        // a block witnessing exactly that transaction; the header is
        // registered in the chain so no difficulty check applies
        let header = BlockHeader {
            version: 2,
            prev_hash: h.chain.params().genesis_hash,
            merkle_root: txid,
            timestamp: 1_400_000_000,
            bits: 0x1e0f_fff0,
            nonce: [0; 4],
        };
        let block_hash = header.hash();
        h.chain
            .insert_unchecked(ChainEntry {
                hash: block_hash,
                height: 1,
                prev: header.prev_hash,
            })
            .unwrap();

        h.mock
            .send(&Message::MerkleBlock(message::MerkleBlockMsg {
                header,
                total: 1,
                hashes: vec![txid],
                flags: vec![0x01],
            }))
            .await;
        h.mock.send(&Message::Tx(tx)).await;

        match h.events.recv().await.unwrap() {
            PeerEvent::MerkleDone { block, .. } => assert_eq!(block, block_hash),
            other => panic!("unexpected event {:?}", other),
        }
        let coins = h.ledger.coins_for(Some(&pair.pubkey_sec())).unwrap();
        assert_eq!(coins.len(), 1);
        assert_eq!(coins[0].value, 12_345);
        assert_eq!(coins[0].block_hash, block_hash);
    }

    #[tokio::test]
    async fn test_bad_merkle_proof_closes_session() {
        let mut h = harness().await;
        h.mock.serve_handshake(1).await;
        let _ = h.events.recv().await;

        let header = BlockHeader {
            version: 2,
            prev_hash: h.chain.params().genesis_hash,
            merkle_root: Hash256::new([1; 32]),
            timestamp: 1_400_000_000,
            bits: 0x1e0f_fff0,
            nonce: [0; 4],
        };
        let block_hash = header.hash();
        h.chain
            .insert_unchecked(ChainEntry {
                hash: block_hash,
                height: 1,
                prev: header.prev_hash,
            })
            .unwrap();

        // root will not match the header's merkle root
        h.mock
            .send(&Message::MerkleBlock(message::MerkleBlockMsg {
                header,
                total: 1,
                hashes: vec![Hash256::new([2; 32])],
                flags: vec![0x00],
            }))
            .await;

        match h.events.recv().await.unwrap() {
            PeerEvent::MerkleFailed { block, .. } => assert_eq!(block, block_hash),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(
            h.session.await.unwrap(),
            Err(SessionError::PeerClosed(_))
        ));
    }
}
