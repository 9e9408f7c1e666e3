// Embedded storage layer
//
// One sled database, one named tree per bucket. Buckets:
//   block       hash -> height(u64 LE) || prev(32)
//   tail        hash -> height(u64 LE)
//   blockheight height(u64 BE) -> hash        (confirmed heights only)
//   coin        tx_hash || tx_index(LE) -> serialized Coin
//   spend       tx_hash || tx_index(LE) -> spending tx hash
//   key         pubkey SEC -> secret scalar (empty for watch-only)
//   scripthash  hash -> hash
//   status      name -> value ("lastmerkle" -> u64 LE)

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sled::Error),
    #[error("corrupt record in bucket {bucket}: {reason}")]
    Corrupt {
        bucket: &'static str,
        reason: String,
    },
}

/// Process-wide persistent store
pub struct Store {
    db: sled::Db,
}

pub const BUCKET_BLOCK: &str = "block";
pub const BUCKET_TAIL: &str = "tail";
pub const BUCKET_BLOCKHEIGHT: &str = "blockheight";
pub const BUCKET_COIN: &str = "coin";
pub const BUCKET_SPEND: &str = "spend";
pub const BUCKET_KEY: &str = "key";
pub const BUCKET_SCRIPTHASH: &str = "scripthash";
pub const BUCKET_STATUS: &str = "status";

impl Store {
    /// Open (or create) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// In-memory store for tests
    pub fn memory() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Named bucket handle
    pub fn bucket(&self, name: &str) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(name)?)
    }

    /// Flush dirty pages to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

/// Key for outpoint-keyed buckets: tx hash followed by the LE index
pub fn outpoint_key(tx_hash: &crate::core::Hash256, index: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(36);
    key.extend_from_slice(tx_hash.as_bytes());
    key.extend_from_slice(&index.to_le_bytes());
    key
}
