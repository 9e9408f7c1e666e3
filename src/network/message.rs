// Protocol messages and the frame codec
//
// A frame is magic(4) | command(12, NUL-padded) | length(u32) |
// checksum(4) | payload, where the checksum is the leading 4 bytes of
// double-SHA-256 of the payload. Payloads pack little-endian integers,
// fixed arrays and VarInt-prefixed data in schema order.

use crate::core::{read_array, read_u32_le, read_u64_le, read_u8, read_hash,
                             read_var_bytes, read_var_string, read_varint, write_var_bytes,
                             write_var_string, write_varint};
use crate::core::{checksum4, BlockHeader, Hash256, PartialMerkleTree, Serializable, Transaction};
use std::io::{Cursor, Read, Write};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use thiserror::Error;

/// Frame header size on the wire
pub const FRAME_HEADER_LEN: usize = 24;

/// Sanity cap on a single payload
pub const MAX_PAYLOAD: u32 = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("bad magic {0:02x?}")]
    BadMagic([u8; 4]),
    #[error("payload checksum mismatch for {0}")]
    BadChecksum(String),
    #[error("frame or payload is truncated")]
    Truncated,
    #[error("payload violates the {command} schema: {reason}")]
    SchemaViolation { command: String, reason: String },
    #[error("payload length {0} exceeds the limit")]
    Oversized(u32),
}

fn schema(command: &str) -> impl Fn(std::io::Error) -> ProtocolError + '_ {
    move |e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::Truncated
        } else {
            ProtocolError::SchemaViolation {
                command: command.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

/// Inventory object types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum InvKind {
    Error = 0,
    Tx = 1,
    Block = 2,
    FilteredBlock = 3,
    CompactBlock = 4,
}

impl InvKind {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(InvKind::Error),
            1 => Some(InvKind::Tx),
            2 => Some(InvKind::Block),
            3 => Some(InvKind::FilteredBlock),
            4 => Some(InvKind::CompactBlock),
            _ => None,
        }
    }
}

/// One inventory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvVec {
    pub kind: u32,
    pub hash: Hash256,
}

impl InvVec {
    pub fn new(kind: InvKind, hash: Hash256) -> Self {
        Self {
            kind: kind as u32,
            hash,
        }
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.kind.to_le_bytes());
        buf.extend_from_slice(self.hash.as_bytes());
    }

    fn read_from(r: &mut dyn Read) -> std::io::Result<Self> {
        Ok(Self {
            kind: read_u32_le(r)?,
            hash: read_hash(r)?,
        })
    }
}

/// Network address: services, IPv6(-mapped) address, big-endian port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetAddr {
    pub services: u64,
    pub ip: [u8; 16],
    pub port: u16,
}

impl NetAddr {
    pub fn from_socket_addr(addr: &SocketAddr, services: u64) -> Self {
        let ip = match addr.ip() {
            IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
            IpAddr::V6(v6) => v6.octets(),
        };
        Self {
            services,
            ip,
            port: addr.port(),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        let v6 = Ipv6Addr::from(self.ip);
        match v6.to_ipv4_mapped() {
            Some(v4) => SocketAddr::new(IpAddr::V4(v4), self.port),
            None => SocketAddr::new(IpAddr::V6(v6), self.port),
        }
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.services.to_le_bytes());
        buf.extend_from_slice(&self.ip);
        buf.extend_from_slice(&self.port.to_be_bytes());
    }

    fn read_from(r: &mut dyn Read) -> std::io::Result<Self> {
        let services = read_u64_le(r)?;
        let ip = read_array::<_, 16>(r)?;
        let port = u16::from_be_bytes(read_array::<_, 2>(r)?);
        Ok(Self { services, ip, port })
    }
}

/// NetAddr plus last-seen timestamp, as carried in addr messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetAddrTime {
    pub time: u32,
    pub addr: NetAddr,
}

/// version payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMsg {
    pub version: u32,
    pub services: u64,
    pub timestamp: u64,
    pub addr_recv: NetAddr,
    pub addr_from: NetAddr,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: u32,
    pub relay: u8,
}

/// getheaders / getblocks payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetHeadersMsg {
    pub version: u32,
    pub locator: Vec<Hash256>,
    pub hash_stop: Hash256,
}

/// merkleblock payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleBlockMsg {
    pub header: BlockHeader,
    pub total: u32,
    pub hashes: Vec<Hash256>,
    pub flags: Vec<u8>,
}

impl MerkleBlockMsg {
    pub fn partial_tree(&self) -> PartialMerkleTree {
        PartialMerkleTree::new(self.total, self.hashes.clone(), self.flags.clone())
    }
}

/// filterload payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterLoadMsg {
    pub filter: Vec<u8>,
    pub hash_funcs: u32,
    pub tweak: u32,
    pub flags: u8,
}

/// Every message the node sends or understands. Unknown commands decode
/// to `Unknown` and are logged and skipped by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Version(VersionMsg),
    Verack,
    Ping(u64),
    Pong(u64),
    Inv(Vec<InvVec>),
    GetData(Vec<InvVec>),
    NotFound(Vec<InvVec>),
    GetBlocks(GetHeadersMsg),
    GetHeaders(GetHeadersMsg),
    Headers(Vec<BlockHeader>),
    MerkleBlock(MerkleBlockMsg),
    Tx(Transaction),
    FilterLoad(FilterLoadMsg),
    FilterAdd(Vec<u8>),
    Mempool,
    GetAddr,
    Addr(Vec<NetAddrTime>),
    Unknown { command: String },
}

impl Message {
    pub fn command(&self) -> &str {
        match self {
            Message::Version(_) => "version",
            Message::Verack => "verack",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::Inv(_) => "inv",
            Message::GetData(_) => "getdata",
            Message::NotFound(_) => "notfound",
            Message::GetBlocks(_) => "getblocks",
            Message::GetHeaders(_) => "getheaders",
            Message::Headers(_) => "headers",
            Message::MerkleBlock(_) => "merkleblock",
            Message::Tx(_) => "tx",
            Message::FilterLoad(_) => "filterload",
            Message::FilterAdd(_) => "filteradd",
            Message::Mempool => "mempool",
            Message::GetAddr => "getaddr",
            Message::Addr(_) => "addr",
            Message::Unknown { command } => command,
        }
    }

    /// Serialize the payload (without the frame)
    pub fn serialize_payload(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Message::Version(v) => {
                buf.extend_from_slice(&v.version.to_le_bytes());
                buf.extend_from_slice(&v.services.to_le_bytes());
                buf.extend_from_slice(&v.timestamp.to_le_bytes());
                v.addr_recv.write_to(&mut buf);
                v.addr_from.write_to(&mut buf);
                buf.extend_from_slice(&v.nonce.to_le_bytes());
                write_var_string(&mut buf, &v.user_agent).unwrap();
                buf.extend_from_slice(&v.start_height.to_le_bytes());
                buf.push(v.relay);
            }
            Message::Verack | Message::Mempool | Message::GetAddr | Message::Unknown { .. } => {}
            Message::Ping(nonce) | Message::Pong(nonce) => {
                buf.extend_from_slice(&nonce.to_le_bytes());
            }
            Message::Inv(inv) | Message::GetData(inv) | Message::NotFound(inv) => {
                write_varint(&mut buf, inv.len() as u64).unwrap();
                for entry in inv {
                    entry.write_to(&mut buf);
                }
            }
            Message::GetBlocks(g) | Message::GetHeaders(g) => {
                buf.extend_from_slice(&g.version.to_le_bytes());
                write_varint(&mut buf, g.locator.len() as u64).unwrap();
                for hash in &g.locator {
                    buf.extend_from_slice(hash.as_bytes());
                }
                buf.extend_from_slice(g.hash_stop.as_bytes());
            }
            Message::Headers(headers) => {
                write_varint(&mut buf, headers.len() as u64).unwrap();
                for header in headers {
                    buf.extend_from_slice(&header.serialize());
                    write_varint(&mut buf, 0).unwrap(); // txn_count
                }
            }
            Message::MerkleBlock(m) => {
                buf.extend_from_slice(&m.header.serialize());
                buf.extend_from_slice(&m.total.to_le_bytes());
                write_varint(&mut buf, m.hashes.len() as u64).unwrap();
                for hash in &m.hashes {
                    buf.extend_from_slice(hash.as_bytes());
                }
                write_var_bytes(&mut buf, &m.flags).unwrap();
            }
            Message::Tx(tx) => {
                buf.extend_from_slice(&tx.serialize());
            }
            Message::FilterLoad(f) => {
                write_var_bytes(&mut buf, &f.filter).unwrap();
                buf.extend_from_slice(&f.hash_funcs.to_le_bytes());
                buf.extend_from_slice(&f.tweak.to_le_bytes());
                buf.push(f.flags);
            }
            Message::FilterAdd(data) => {
                write_var_bytes(&mut buf, data).unwrap();
            }
            Message::Addr(addrs) => {
                write_varint(&mut buf, addrs.len() as u64).unwrap();
                for entry in addrs {
                    buf.extend_from_slice(&entry.time.to_le_bytes());
                    entry.addr.write_to(&mut buf);
                }
            }
        }
        buf
    }

    /// Decode a payload for `command`
    pub fn decode_payload(command: &str, payload: &[u8]) -> Result<Message, ProtocolError> {
        let e = schema(command);
        let r = &mut Cursor::new(payload);
        let msg = match command {
            "version" => Message::Version(VersionMsg {
                version: read_u32_le(r).map_err(&e)?,
                services: read_u64_le(r).map_err(&e)?,
                timestamp: read_u64_le(r).map_err(&e)?,
                addr_recv: NetAddr::read_from(r).map_err(&e)?,
                addr_from: NetAddr::read_from(r).map_err(&e)?,
                nonce: read_u64_le(r).map_err(&e)?,
                user_agent: read_var_string(r).map_err(&e)?,
                start_height: read_u32_le(r).map_err(&e)?,
                // absent in ancient version payloads
                relay: read_u8(r).unwrap_or(0),
            }),
            "verack" => Message::Verack,
            "mempool" => Message::Mempool,
            "getaddr" => Message::GetAddr,
            "ping" => Message::Ping(read_u64_le(r).map_err(&e)?),
            "pong" => Message::Pong(read_u64_le(r).map_err(&e)?),
            "inv" | "getdata" | "notfound" => {
                let count = read_varint(r).map_err(&e)?;
                check_count(command, count, 50_000)?;
                let mut inv = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    inv.push(InvVec::read_from(r).map_err(&e)?);
                }
                match command {
                    "inv" => Message::Inv(inv),
                    "getdata" => Message::GetData(inv),
                    _ => Message::NotFound(inv),
                }
            }
            "getblocks" | "getheaders" => {
                let version = read_u32_le(r).map_err(&e)?;
                let count = read_varint(r).map_err(&e)?;
                check_count(command, count, 2_000)?;
                let mut locator = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    locator.push(read_hash(r).map_err(&e)?);
                }
                let hash_stop = read_hash(r).map_err(&e)?;
                let msg = GetHeadersMsg {
                    version,
                    locator,
                    hash_stop,
                };
                if command == "getblocks" {
                    Message::GetBlocks(msg)
                } else {
                    Message::GetHeaders(msg)
                }
            }
            "headers" => {
                let count = read_varint(r).map_err(&e)?;
                check_count(command, count, 2_000)?;
                let mut headers = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let header = BlockHeader::read_from(r).map_err(|reason| {
                        ProtocolError::SchemaViolation {
                            command: command.to_string(),
                            reason,
                        }
                    })?;
                    let _txn_count = read_varint(r).map_err(&e)?;
                    headers.push(header);
                }
                Message::Headers(headers)
            }
            "merkleblock" => {
                let header =
                    BlockHeader::read_from(r).map_err(|reason| ProtocolError::SchemaViolation {
                        command: command.to_string(),
                        reason,
                    })?;
                let total = read_u32_le(r).map_err(&e)?;
                let count = read_varint(r).map_err(&e)?;
                check_count(command, count, 50_000)?;
                let mut hashes = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    hashes.push(read_hash(r).map_err(&e)?);
                }
                let flags = read_var_bytes(r).map_err(&e)?;
                Message::MerkleBlock(MerkleBlockMsg {
                    header,
                    total,
                    hashes,
                    flags,
                })
            }
            "tx" => {
                let tx = Transaction::read_from(r).map_err(|reason| {
                    ProtocolError::SchemaViolation {
                        command: command.to_string(),
                        reason,
                    }
                })?;
                Message::Tx(tx)
            }
            "filterload" => Message::FilterLoad(FilterLoadMsg {
                filter: read_var_bytes(r).map_err(&e)?,
                hash_funcs: read_u32_le(r).map_err(&e)?,
                tweak: read_u32_le(r).map_err(&e)?,
                flags: read_u8(r).map_err(&e)?,
            }),
            "filteradd" => Message::FilterAdd(read_var_bytes(r).map_err(&e)?),
            "addr" => {
                let count = read_varint(r).map_err(&e)?;
                check_count(command, count, 1_000)?;
                let mut addrs = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let time = read_u32_le(r).map_err(&e)?;
                    let addr = NetAddr::read_from(r).map_err(&e)?;
                    addrs.push(NetAddrTime { time, addr });
                }
                Message::Addr(addrs)
            }
            other => Message::Unknown {
                command: other.to_string(),
            },
        };
        Ok(msg)
    }
}

fn check_count(command: &str, count: u64, limit: u64) -> Result<(), ProtocolError> {
    if count > limit {
        return Err(ProtocolError::SchemaViolation {
            command: command.to_string(),
            reason: format!("count {} exceeds limit {}", count, limit),
        });
    }
    Ok(())
}

/// Parsed frame header (the 24 bytes preceding the payload)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub command: String,
    pub length: u32,
    pub checksum: [u8; 4],
}

/// Parse and sanity-check a frame header against our network magic
pub fn parse_frame_header(
    magic: &[u8; 4],
    raw: &[u8; FRAME_HEADER_LEN],
) -> Result<FrameHeader, ProtocolError> {
    let mut found = [0u8; 4];
    found.copy_from_slice(&raw[..4]);
    if &found != magic {
        return Err(ProtocolError::BadMagic(found));
    }
    let command_bytes = &raw[4..16];
    let end = command_bytes
        .iter()
        .position(|b| *b == 0)
        .unwrap_or(command_bytes.len());
    let command = std::str::from_utf8(&command_bytes[..end])
        .map_err(|_| ProtocolError::SchemaViolation {
            command: String::from("<frame>"),
            reason: String::from("command is not ASCII"),
        })?
        .to_string();
    let length = u32::from_le_bytes(raw[16..20].try_into().unwrap());
    if length > MAX_PAYLOAD {
        return Err(ProtocolError::Oversized(length));
    }
    let mut checksum = [0u8; 4];
    checksum.copy_from_slice(&raw[20..24]);
    Ok(FrameHeader {
        command,
        length,
        checksum,
    })
}

/// Validate a payload against its frame header checksum
pub fn check_payload(header: &FrameHeader, payload: &[u8]) -> Result<(), ProtocolError> {
    if payload.len() != header.length as usize {
        return Err(ProtocolError::Truncated);
    }
    if checksum4(payload) != header.checksum {
        return Err(ProtocolError::BadChecksum(header.command.clone()));
    }
    Ok(())
}

/// Serialize a whole frame for `msg`
pub fn build_frame(magic: &[u8; 4], msg: &Message) -> Vec<u8> {
    let payload = msg.serialize_payload();
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(magic);
    let mut command = [0u8; 12];
    let name = msg.command().as_bytes();
    command[..name.len()].copy_from_slice(name);
    frame.extend_from_slice(&command);
    frame
        .write_all(&(payload.len() as u32).to_le_bytes())
        .unwrap();
    frame.extend_from_slice(&checksum4(&payload));
    frame.extend_from_slice(&payload);
    frame
}

/// Decode one whole frame from a byte slice (tests and tools; the peer
/// session streams the parts instead).
pub fn decode_frame(magic: &[u8; 4], raw: &[u8]) -> Result<Message, ProtocolError> {
    if raw.len() < FRAME_HEADER_LEN {
        return Err(ProtocolError::Truncated);
    }
    let header = parse_frame_header(magic, raw[..FRAME_HEADER_LEN].try_into().unwrap())?;
    let payload = &raw[FRAME_HEADER_LEN..];
    check_payload(&header, payload)?;
    Message::decode_payload(&header.command, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Params;

    fn roundtrip(msg: Message) -> Message {
        let params = Params::mainnet();
        let frame = build_frame(&params.magic, &msg);
        decode_frame(&params.magic, &frame).unwrap()
    }

    fn sample_addr() -> NetAddr {
        NetAddr::from_socket_addr(&"203.0.113.9:9401".parse().unwrap(), 1)
    }

    #[test]
    fn test_version_roundtrip() {
        let msg = Message::Version(VersionMsg {
            version: 70003,
            services: 0,
            timestamp: 1_700_000_000,
            addr_recv: sample_addr(),
            addr_from: sample_addr(),
            nonce: 0xdead_beef,
            user_agent: "/monalite:0.1.0/".to_string(),
            start_height: 123_456,
            relay: 0,
        });
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn test_simple_message_roundtrips() {
        for msg in [
            Message::Verack,
            Message::Mempool,
            Message::GetAddr,
            Message::Ping(7),
            Message::Pong(7),
            Message::FilterAdd(vec![1, 2, 3]),
        ] {
            assert_eq!(roundtrip(msg.clone()), msg);
        }
    }

    #[test]
    fn test_inv_roundtrip() {
        let msg = Message::Inv(vec![
            InvVec::new(InvKind::Block, Hash256::new([1; 32])),
            InvVec::new(InvKind::Tx, Hash256::new([2; 32])),
        ]);
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn test_getheaders_roundtrip() {
        let msg = Message::GetHeaders(GetHeadersMsg {
            version: 70003,
            locator: vec![Hash256::new([3; 32]), Hash256::new([4; 32])],
            hash_stop: Hash256::zero(),
        });
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn test_headers_roundtrip_with_txn_count() {
        let header = BlockHeader {
            version: 2,
            prev_hash: Hash256::new([5; 32]),
            merkle_root: Hash256::new([6; 32]),
            timestamp: 1_400_000_000,
            bits: 0x1e0f_fff0,
            nonce: [7, 8, 9, 10],
        };
        let msg = Message::Headers(vec![header, header]);
        let payload = msg.serialize_payload();
        // varint count + 2 * (80-byte header + 1-byte txn_count)
        assert_eq!(payload.len(), 1 + 2 * 81);
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn test_merkleblock_payload_vector() {
        // canonical merkleblock with 7 leaves and one matched txid
        let raw = hex::decode(
            "0100000082bb869cf3a793432a66e826e05a6fc37469f8efb7421dc880670100000000007f16c5962e8bd963659c793ce370d95f093bc7e367117b3c30c1f8fdd0d9728776381b4d4c86041b554b852907000000043612262624047ee87660be1a707519a443b1c1ce3d248cbfc6c15870f6c5daa2019f5b01d4195ecbc9398fbf3c3b1fa9bb3183301d7a1fb3bd174fcfa40a2b6541ed70551dd7e841883ab8f0b16bf04176b7d1480e4f0af9f3d4c3595768d06820d2a7bc994987302e5b1ac80fc425fe25f8b63169ea78e68fbaaefa59379bbf011d",
        )
        .unwrap();
        let msg = Message::decode_payload("merkleblock", &raw).unwrap();
        let Message::MerkleBlock(mb) = msg else {
            panic!("wrong variant");
        };
        assert_eq!(mb.total, 7);
        assert_eq!(mb.hashes.len(), 4);
        assert_eq!(mb.flags, vec![0x1d]);

        let (root, matched) = mb.partial_tree().extract().unwrap();
        assert_eq!(root, mb.header.merkle_root);
        assert_eq!(matched.len(), 1);

        // and it re-encodes byte for byte
        assert_eq!(Message::MerkleBlock(mb).serialize_payload(), raw);
    }

    #[test]
    fn test_addr_roundtrip() {
        let msg = Message::Addr(vec![NetAddrTime {
            time: 1_600_000_000,
            addr: sample_addr(),
        }]);
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn test_netaddr_socket_roundtrip() {
        let addr: SocketAddr = "198.51.100.7:9401".parse().unwrap();
        let na = NetAddr::from_socket_addr(&addr, 0);
        assert_eq!(na.socket_addr(), addr);

        let v6: SocketAddr = "[2001:db8::1]:9401".parse().unwrap();
        let na6 = NetAddr::from_socket_addr(&v6, 0);
        assert_eq!(na6.socket_addr(), v6);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let params = Params::mainnet();
        let mut frame = build_frame(&params.magic, &Message::Verack);
        frame[0] ^= 0xff;
        assert!(matches!(
            decode_frame(&params.magic, &frame),
            Err(ProtocolError::BadMagic(_))
        ));
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let params = Params::mainnet();
        let mut frame = build_frame(&params.magic, &Message::Ping(1));
        let last = frame.len() - 1;
        frame[last] ^= 0xff;
        assert!(matches!(
            decode_frame(&params.magic, &frame),
            Err(ProtocolError::BadChecksum(_))
        ));
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let params = Params::mainnet();
        let mut frame = build_frame(&params.magic, &Message::Ping(1));
        frame.truncate(frame.len() - 2);
        assert!(matches!(
            decode_frame(&params.magic, &frame),
            Err(ProtocolError::Truncated)
        ));
    }

    #[test]
    fn test_unknown_command_is_surfaced() {
        let params = Params::mainnet();
        let msg = Message::Unknown {
            command: "sendcmpct".to_string(),
        };
        let frame = build_frame(&params.magic, &msg);
        match decode_frame(&params.magic, &frame).unwrap() {
            Message::Unknown { command } => assert_eq!(command, "sendcmpct"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_truncated_schema_rejected() {
        let err = Message::decode_payload("ping", &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated));
    }

    #[test]
    fn test_excessive_count_rejected() {
        let mut payload = Vec::new();
        write_varint(&mut payload, 1_000_000).unwrap();
        assert!(matches!(
            Message::decode_payload("inv", &payload),
            Err(ProtocolError::SchemaViolation { .. })
        ));
    }
}
