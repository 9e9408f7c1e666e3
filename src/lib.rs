// monalite - a headers-only (SPV) wallet node

pub mod chain;
pub mod cli;
pub mod consensus;
pub mod core;
pub mod network;
pub mod params;
pub mod storage;
pub mod wallet;

// Re-exports for convenience
pub use crate::chain::{Chain, ChainEntry, ChainError, ChainView};
pub use crate::cli::{Cli, CliHandler};
pub use crate::core::{BlockHeader, BloomFilter, Hash256, PartialMerkleTree, Transaction};
pub use crate::network::{Message, PeerManager, PeerSession};
pub use crate::params::Params;
pub use crate::storage::Store;
pub use crate::wallet::{Coin, KeyStore, Ledger, TxBuilder};
