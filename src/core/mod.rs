// Core data structures and codecs

pub mod base58;
mod block;
pub mod bloom;
mod hash;
mod merkle;
pub mod script;
mod serialize;
mod transaction;
mod types;

pub use block::{BlockHeader, HEADER_LEN};
pub use bloom::BloomFilter;
pub use hash::{checksum4, hash160, hash256, sha256};
pub use merkle::{MerkleError, PartialMerkleTree};
pub use script::{CoinKind, ScriptError, ScriptForm};
pub use serialize::*;
pub use transaction::{Transaction, TxInput, TxOutput, SEQUENCE_FINAL};
pub use types::Hash256;
