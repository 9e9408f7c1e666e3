// Transaction structures

use crate::core::{hash256, Hash256, Serializable};
use crate::core::serialize::{read_u32_le, read_u64_le, read_hash, read_var_bytes, read_varint,
                             write_var_bytes, write_varint};
use std::io::{Cursor, Read, Write};

/// Sequence value that disables locktime for an input
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Transaction input - references a previous transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// Hash of the funding transaction
    pub prev_hash: Hash256,
    /// Output index in the funding transaction
    pub prev_index: u32,
    /// Signature script proving ownership
    pub script_sig: Vec<u8>,
    /// Sequence number
    pub sequence: u32,
}

impl TxInput {
    pub fn new(prev_hash: Hash256, prev_index: u32, script_sig: Vec<u8>) -> Self {
        Self {
            prev_hash,
            prev_index,
            script_sig,
            sequence: SEQUENCE_FINAL,
        }
    }

    /// The coinbase sentinel: zero hash, index 0xffffffff
    pub fn is_coinbase(&self) -> bool {
        self.prev_hash.is_zero() && self.prev_index == 0xffff_ffff
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_all(self.prev_hash.as_bytes()).unwrap();
        buf.write_all(&self.prev_index.to_le_bytes()).unwrap();
        write_var_bytes(&mut buf, &self.script_sig).unwrap();
        buf.write_all(&self.sequence.to_le_bytes()).unwrap();
        buf
    }

    pub fn read_from(reader: &mut dyn Read) -> Result<Self, String> {
        let prev_hash = read_hash(reader).map_err(|e| e.to_string())?;
        let prev_index = read_u32_le(reader).map_err(|e| e.to_string())?;
        let script_sig = read_var_bytes(reader).map_err(|e| e.to_string())?;
        let sequence = read_u32_le(reader).map_err(|e| e.to_string())?;
        Ok(Self {
            prev_hash,
            prev_index,
            script_sig,
            sequence,
        })
    }
}

/// Transaction output - value plus the conditions to spend it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    /// Amount in base units
    pub value: u64,
    /// Public key script
    pub script_pubkey: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: u64, script_pubkey: Vec<u8>) -> Self {
        Self {
            value,
            script_pubkey,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_all(&self.value.to_le_bytes()).unwrap();
        write_var_bytes(&mut buf, &self.script_pubkey).unwrap();
        buf
    }

    pub fn read_from(reader: &mut dyn Read) -> Result<Self, String> {
        let value = read_u64_le(reader).map_err(|e| e.to_string())?;
        let script_pubkey = read_var_bytes(reader).map_err(|e| e.to_string())?;
        Ok(Self {
            value,
            script_pubkey,
        })
    }
}

/// Transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    /// Block height or timestamp before which the tx is not final
    pub lock_time: u32,
}

impl Transaction {
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            version: 1,
            inputs,
            outputs,
            lock_time: 0,
        }
    }

    /// A coinbase transaction funds itself from the sentinel input
    pub fn is_coinbase(&self) -> bool {
        self.inputs.iter().any(|i| i.is_coinbase())
    }

    /// Transaction id: double SHA-256 of the serialized tx
    pub fn txid(&self) -> Hash256 {
        hash256(&self.serialize())
    }

    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().map(|out| out.value).sum()
    }

    /// Deserialize from a reader, consuming exactly one transaction
    pub fn read_from(reader: &mut dyn Read) -> Result<Self, String> {
        let version = read_u32_le(reader).map_err(|e| e.to_string())?;

        let input_count = read_varint(reader).map_err(|e| e.to_string())? as usize;
        let mut inputs = Vec::with_capacity(input_count.min(1024));
        for _ in 0..input_count {
            inputs.push(TxInput::read_from(reader)?);
        }

        let output_count = read_varint(reader).map_err(|e| e.to_string())? as usize;
        let mut outputs = Vec::with_capacity(output_count.min(1024));
        for _ in 0..output_count {
            outputs.push(TxOutput::read_from(reader)?);
        }

        let lock_time = read_u32_le(reader).map_err(|e| e.to_string())?;
        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }
}

impl Serializable for Transaction {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_all(&self.version.to_le_bytes()).unwrap();
        write_varint(&mut buf, self.inputs.len() as u64).unwrap();
        for input in &self.inputs {
            buf.write_all(&input.serialize()).unwrap();
        }
        write_varint(&mut buf, self.outputs.len() as u64).unwrap();
        for output in &self.outputs {
            buf.write_all(&output.serialize()).unwrap();
        }
        buf.write_all(&self.lock_time.to_le_bytes()).unwrap();
        buf
    }

    fn deserialize(data: &[u8]) -> Result<Self, String> {
        let mut cursor = Cursor::new(data);
        let tx = Self::read_from(&mut cursor)?;
        if cursor.position() != data.len() as u64 {
            return Err("trailing bytes after transaction".to_string());
        }
        Ok(tx)
    }
}
