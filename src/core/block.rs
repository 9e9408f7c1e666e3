// Block header structures
//
// An SPV node never holds full blocks; headers plus merkle proofs are the
// whole chain state.

use crate::core::serialize::{read_array, read_u32_le, read_hash};
use crate::core::{hash256, Hash256};
use std::io::{Cursor, Read, Write};

/// Serialized header size
pub const HEADER_LEN: usize = 80;

/// Block header - 80 bytes on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Block version
    pub version: u32,
    /// Hash of the previous block
    pub prev_hash: Hash256,
    /// Merkle root of the block's transactions
    pub merkle_root: Hash256,
    /// Unix timestamp
    pub timestamp: u32,
    /// Difficulty target in compact form
    pub bits: u32,
    /// Proof-of-work nonce
    pub nonce: [u8; 4],
}

impl BlockHeader {
    /// The block's identity: double SHA-256 of the serialized header
    pub fn hash(&self) -> Hash256 {
        hash256(&self.serialize())
    }

    /// Serialize the header (always 80 bytes)
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        buf.write_all(&self.version.to_le_bytes()).unwrap();
        buf.write_all(self.prev_hash.as_bytes()).unwrap();
        buf.write_all(self.merkle_root.as_bytes()).unwrap();
        buf.write_all(&self.timestamp.to_le_bytes()).unwrap();
        buf.write_all(&self.bits.to_le_bytes()).unwrap();
        buf.write_all(&self.nonce).unwrap();
        buf
    }

    pub fn read_from(reader: &mut dyn Read) -> Result<Self, String> {
        let version = read_u32_le(reader).map_err(|e| e.to_string())?;
        let prev_hash = read_hash(reader).map_err(|e| e.to_string())?;
        let merkle_root = read_hash(reader).map_err(|e| e.to_string())?;
        let timestamp = read_u32_le(reader).map_err(|e| e.to_string())?;
        let bits = read_u32_le(reader).map_err(|e| e.to_string())?;
        let nonce = read_array::<_, 4>(reader).map_err(|e| e.to_string())?;
        Ok(Self {
            version,
            prev_hash,
            merkle_root,
            timestamp,
            bits,
            nonce,
        })
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, String> {
        if data.len() < HEADER_LEN {
            return Err(format!("Block header too short: {} bytes", data.len()));
        }
        Self::read_from(&mut Cursor::new(data))
    }
}
