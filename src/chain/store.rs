// Persistent header chain
//
// The chain is a DAG of (hash, height, prev) entries rooted at genesis.
// Leaves live in the tail bucket; the best tip is the highest tail. A
// confirmed-height index (blockheight bucket) exists for heights at least
// NCONFIRMED below the tip of the branch that wrote them.

use crate::consensus::{pow_digest, Target};
use crate::core::{BlockHeader, Hash256};
use crate::params::{Params, CLOCK_SKEW_SECS, NCONFIRMED};
use crate::storage::{Store, StoreError, BUCKET_BLOCK, BUCKET_BLOCKHEIGHT, BUCKET_TAIL};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("orphan block: previous hash {0} is unknown")]
    OrphanBlock(Hash256),
    #[error("difficulty {bits:#x} is above the proof-of-work limit {limit:#x}")]
    PowTooEasy { bits: u32, limit: u32 },
    #[error("header {0} does not satisfy its difficulty target")]
    BadPow(Hash256),
    #[error("header timestamp {0} is in the future")]
    FutureTimestamp(u32),
    #[error("hash at height {height} does not match the checkpoint")]
    CheckpointMismatch { height: u64, hash: Hash256 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sled::Error> for ChainError {
    fn from(e: sled::Error) -> Self {
        ChainError::Store(StoreError::Db(e))
    }
}

/// One stored header record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainEntry {
    pub hash: Hash256,
    pub height: u64,
    pub prev: Hash256,
}

impl ChainEntry {
    fn pack(&self) -> [u8; 40] {
        let mut out = [0u8; 40];
        out[..8].copy_from_slice(&self.height.to_le_bytes());
        out[8..].copy_from_slice(self.prev.as_bytes());
        out
    }

    fn unpack(hash: Hash256, value: &[u8]) -> Result<Self, ChainError> {
        if value.len() != 40 {
            return Err(ChainError::Store(StoreError::Corrupt {
                bucket: BUCKET_BLOCK,
                reason: format!("entry length {}", value.len()),
            }));
        }
        let height = u64::from_le_bytes(value[..8].try_into().unwrap());
        let prev = Hash256::from_slice(&value[8..]).expect("32 bytes");
        Ok(Self { hash, height, prev })
    }
}

/// The subset of chain state the wallet layers depend on. Lets the
/// transaction builder run against a stub in tests.
pub trait ChainView: Send + Sync {
    fn best_height(&self) -> u64;
    fn height_of(&self, hash: &Hash256) -> Option<u64>;
}

/// Persistent header chain store
pub struct Chain {
    params: Params,
    blocks: sled::Tree,
    tails: sled::Tree,
    heights: sled::Tree,
    // serializes append batches and pruning
    write_lock: Mutex<()>,
}

impl Chain {
    /// Open the chain over `store`, inserting the genesis entry on first
    /// use. A store whose genesis disagrees with the compiled-in hash is
    /// unusable; that is a programmer/operator error and aborts.
    pub fn open(store: &Store, params: Params) -> Result<Self, ChainError> {
        let chain = Self {
            blocks: store.bucket(BUCKET_BLOCK)?,
            tails: store.bucket(BUCKET_TAIL)?,
            heights: store.bucket(BUCKET_BLOCKHEIGHT)?,
            params,
            write_lock: Mutex::new(()),
        };

        let genesis = chain.params.genesis_hash;
        match chain.lookup(&genesis)? {
            Some(entry) if entry.height == 0 => {}
            Some(_) => panic!("stored genesis entry is corrupt"),
            None if chain.blocks.is_empty() => {
                let entry = ChainEntry {
                    hash: genesis,
                    height: 0,
                    prev: Hash256::zero(),
                };
                chain.blocks.insert(genesis.as_bytes(), &entry.pack()[..])?;
                chain.tails.insert(genesis.as_bytes(), &0u64.to_le_bytes()[..])?;
                chain.heights.insert(0u64.to_be_bytes(), genesis.as_ref())?;
            }
            None => panic!("database does not belong to this network (genesis mismatch)"),
        }
        Ok(chain)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Load one entry
    pub fn lookup(&self, hash: &Hash256) -> Result<Option<ChainEntry>, ChainError> {
        match self.blocks.get(hash.as_bytes())? {
            Some(value) => Ok(Some(ChainEntry::unpack(*hash, &value)?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, hash: &Hash256) -> Result<bool, ChainError> {
        Ok(self.blocks.contains_key(hash.as_bytes())?)
    }

    /// Hash of the confirmed block at `height`, if indexed
    pub fn hash_at(&self, height: u64) -> Result<Option<Hash256>, ChainError> {
        match self.heights.get(height.to_be_bytes())? {
            Some(value) => Ok(Some(Hash256::from_slice(&value).map_err(|e| {
                StoreError::Corrupt {
                    bucket: BUCKET_BLOCKHEIGHT,
                    reason: e,
                }
            })?)),
            None => Ok(None),
        }
    }

    /// All current leaves of the DAG
    pub fn tails(&self) -> Result<Vec<ChainEntry>, ChainError> {
        let mut tails = Vec::new();
        for item in self.tails.iter() {
            let (key, _) = item?;
            let hash = Hash256::from_slice(&key).map_err(|e| StoreError::Corrupt {
                bucket: BUCKET_TAIL,
                reason: e,
            })?;
            if let Some(entry) = self.lookup(&hash)? {
                tails.push(entry);
            }
        }
        Ok(tails)
    }

    /// The highest tail (ties broken by first seen, i.e. iteration order)
    pub fn best_tip(&self) -> Result<ChainEntry, ChainError> {
        let mut best: Option<ChainEntry> = None;
        for tail in self.tails()? {
            let better = match &best {
                Some(b) => tail.height > b.height,
                None => true,
            };
            if better {
                best = Some(tail);
            }
        }
        // genesis is always present, so the tail set is never empty
        Ok(best.expect("tail set contains at least genesis"))
    }

    /// Number of header entries downloaded so far
    pub fn downloaded_count(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// Confirmed (height, hash) pairs for heights start..start+n. The
    /// confirmed index is contiguous, so this stops at the first gap.
    pub fn confirmed_hashes(
        &self,
        start: u64,
        n: u64,
    ) -> Result<Vec<(u64, Hash256)>, ChainError> {
        let mut out = Vec::new();
        for height in start..start.saturating_add(n) {
            match self.hash_at(height)? {
                Some(hash) => out.push((height, hash)),
                None => break,
            }
        }
        Ok(out)
    }

    /// Append a batch of headers in order. Known hashes are skipped;
    /// returns the hashes actually added. The batch is validated before
    /// anything is written, so a failing header leaves the chain
    /// untouched.
    pub fn append(&self, headers: &[BlockHeader]) -> Result<Vec<Hash256>, ChainError> {
        let _guard = self.write_lock.lock().expect("chain lock");
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_secs();

        // validation pass: later headers may link onto staged ones
        let mut staged: Vec<ChainEntry> = Vec::new();
        for header in headers {
            let hash = header.hash();
            if self.blocks.contains_key(hash.as_bytes())?
                || staged.iter().any(|e| e.hash == hash)
            {
                continue;
            }
            let prev_height = match staged.iter().find(|e| e.hash == header.prev_hash) {
                Some(e) => e.height,
                None => self
                    .lookup(&header.prev_hash)?
                    .ok_or(ChainError::OrphanBlock(header.prev_hash))?
                    .height,
            };
            let height = prev_height + 1;

            match self.params.checkpoint(height) {
                Some(anchor) if anchor != hash => {
                    return Err(ChainError::CheckpointMismatch { height, hash });
                }
                Some(_) => {
                    // trusted anchor, difficulty checks are moot
                }
                None => self.validate_work(header, height, &hash, now)?,
            }
            staged.push(ChainEntry {
                hash,
                height,
                prev: header.prev_hash,
            });
        }

        // apply pass
        for entry in &staged {
            self.blocks.insert(entry.hash.as_bytes(), &entry.pack()[..])?;
            self.tails.remove(entry.prev.as_bytes())?;
            self.tails
                .insert(entry.hash.as_bytes(), &entry.height.to_le_bytes()[..])?;
            self.extend_height_index(entry)?;
        }

        if !staged.is_empty() {
            self.prune_stale_tails()?;
        }
        Ok(staged.into_iter().map(|e| e.hash).collect())
    }

    fn validate_work(
        &self,
        header: &BlockHeader,
        height: u64,
        hash: &Hash256,
        now: u64,
    ) -> Result<(), ChainError> {
        if header.bits > self.params.pow_limit {
            return Err(ChainError::PowTooEasy {
                bits: header.bits,
                limit: self.params.pow_limit,
            });
        }
        if header.timestamp as u64 > now + CLOCK_SKEW_SECS {
            return Err(ChainError::FutureTimestamp(header.timestamp));
        }
        let digest = pow_digest(height, &header.serialize());
        if !Target::from_bits(header.bits).admits(&digest) {
            return Err(ChainError::BadPow(*hash));
        }
        Ok(())
    }

    /// After adding `entry`, the ancestor NCONFIRMED links back is
    /// confirmed along this branch; index it by height.
    fn extend_height_index(&self, entry: &ChainEntry) -> Result<(), ChainError> {
        let mut cursor = *entry;
        for _ in 0..NCONFIRMED {
            match self.lookup(&cursor.prev)? {
                Some(prev) => cursor = prev,
                None => return Ok(()),
            }
            if cursor.height == 0 {
                break;
            }
        }
        if entry.height >= cursor.height + NCONFIRMED {
            self.heights
                .insert(cursor.height.to_be_bytes(), cursor.hash.as_ref())?;
        }
        Ok(())
    }

    /// Delete tails that fell more than NCONFIRMED behind the best tip,
    /// walking each dead fork back to its junction with the best chain.
    fn prune_stale_tails(&self) -> Result<(), ChainError> {
        let best = self.best_tip()?;
        let doomed: Vec<ChainEntry> = self
            .tails()?
            .into_iter()
            .filter(|t| t.hash != best.hash && t.height + NCONFIRMED < best.height)
            .collect();
        if doomed.is_empty() {
            return Ok(());
        }

        // Recent best-chain window; anything older is protected by the
        // confirmed-height index instead.
        let floor = best.height.saturating_sub(4 * NCONFIRMED);
        let mut on_best: HashSet<Hash256> = HashSet::new();
        let mut cursor = best;
        loop {
            on_best.insert(cursor.hash);
            if cursor.height == 0 || cursor.height <= floor {
                break;
            }
            match self.lookup(&cursor.prev)? {
                Some(prev) => cursor = prev,
                None => break,
            }
        }

        for tail in doomed {
            log::info!("pruning stale fork {} at height {}", tail.hash, tail.height);
            self.tails.remove(tail.hash.as_bytes())?;
            let mut cursor = tail;
            loop {
                let shared = on_best.contains(&cursor.hash)
                    || self.hash_at(cursor.height)? == Some(cursor.hash);
                if shared {
                    break;
                }
                self.blocks.remove(cursor.hash.as_bytes())?;
                match self.lookup(&cursor.prev)? {
                    Some(prev) => cursor = prev,
                    None => break,
                }
            }
        }
        Ok(())
    }

    /// Register an entry without difficulty checks. Test seam for
    /// exercising layers above the chain with unminable fixtures.
    #[cfg(test)]
    pub(crate) fn insert_unchecked(&self, entry: ChainEntry) -> Result<(), ChainError> {
        let _guard = self.write_lock.lock().expect("chain lock");
        self.blocks.insert(entry.hash.as_bytes(), &entry.pack()[..])?;
        self.tails.remove(entry.prev.as_bytes())?;
        self.tails
            .insert(entry.hash.as_bytes(), &entry.height.to_le_bytes()[..])?;
        Ok(())
    }

    /// Mark a height as confirmed. Test seam paired with
    /// `insert_unchecked`.
    #[cfg(test)]
    pub(crate) fn index_height(&self, height: u64, hash: &Hash256) -> Result<(), ChainError> {
        self.heights.insert(height.to_be_bytes(), hash.as_ref())?;
        Ok(())
    }

    /// Classic block locator: the starting hash, its ten immediate
    /// predecessors, then exponentially spaced confirmed hashes, always
    /// ending with genesis.
    pub fn locator(&self, from: &Hash256) -> Result<Vec<Hash256>, ChainError> {
        let genesis = self.params.genesis_hash;
        let mut out = Vec::new();

        let mut entry = match self.lookup(from)? {
            Some(e) => e,
            None => return Ok(vec![genesis]),
        };
        out.push(entry.hash);
        for _ in 0..10 {
            if entry.height == 0 || entry.prev.is_zero() {
                break;
            }
            match self.lookup(&entry.prev)? {
                Some(prev) => {
                    out.push(prev.hash);
                    entry = prev;
                }
                None => break,
            }
        }

        if entry.height >= 2 {
            let mut step = 2u64;
            let mut height = entry.height - step;
            loop {
                if let Some(hash) = self.hash_at(height)? {
                    out.push(hash);
                }
                step <<= 1;
                if height < step {
                    break;
                }
                height -= step;
            }
        }

        if out.last() != Some(&genesis) {
            out.push(genesis);
        }
        Ok(out)
    }
}

impl ChainView for Chain {
    fn best_height(&self) -> u64 {
        self.best_tip().map(|t| t.height).unwrap_or(0)
    }

    fn height_of(&self, hash: &Hash256) -> Option<u64> {
        self.lookup(hash).ok().flatten().map(|e| e.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three consecutive mainnet headers on top of genesis, wire-encoded
    /// as they appear in a headers message (txn_count byte included).
    const HEADERS: [&str; 3] = [
        "02000000b68b8c410d2ea4afd74fb56e370bfc1bedf929e1453896c9e79dd116011c9fffb9c39c20b4baf3b84cd72349300833086d686db142c51b26a196cdabbe7a0610d45ac352f0ff0f1e0010bb7500",
        "020000008bd2106797e90cb3ed7e99c5226cc0c6ef2bc73771356071870ae001a6b778a3fc4430aa92e002ed08fd8d2d91c7fe536454c14aaf9b36b8ad06f8aa999d50f9de5ac352f0ff0f1e00062d6700",
        "020000008246054e53a0f5338b7b3d82fd2c067af5bffcf7b16cd29e3d02c03f23b5288c7dde82951b1040a2368cbb2c36f811d44c78bd660171b97af35cfda298004cf0fc5ac352f0ff0f1e0007397d00",
    ];
    const HASHES: [&str; 3] = [
        "a378b7a601e00a877160357137c72befc6c06c22c5997eedb30ce9976710d28b",
        "8c28b5233fc0023d9ed26cb1f7fcbff57a062cfd823d7b8b33f5a0534e054682",
        "36a3b7235aa7a05d654a2afe7b3b3faade820e99a70db0262b5afd2d624412e9",
    ];

    fn parse_headers() -> Vec<BlockHeader> {
        HEADERS
            .iter()
            .map(|h| BlockHeader::deserialize(&hex::decode(h).unwrap()[..80]).unwrap())
            .collect()
    }

    fn open_chain() -> Chain {
        let store = Store::memory().unwrap();
        Chain::open(&store, Params::mainnet()).unwrap()
    }

    #[test]
    fn test_bootstrap_inserts_genesis() {
        let chain = open_chain();
        let genesis = chain.params().genesis_hash;
        let entry = chain.lookup(&genesis).unwrap().unwrap();
        assert_eq!(entry.height, 0);
        assert!(entry.prev.is_zero());
        assert_eq!(chain.best_tip().unwrap().hash, genesis);
        assert_eq!(chain.hash_at(0).unwrap(), Some(genesis));
    }

    #[test]
    fn test_linear_append() {
        // S1: three headers atop genesis; tip lands at height 3
        let chain = open_chain();
        let added = chain.append(&parse_headers()).unwrap();
        assert_eq!(added.len(), 3);
        for (hash, expected) in added.iter().zip(HASHES) {
            assert_eq!(hash.to_hex(), expected);
        }

        let tip = chain.best_tip().unwrap();
        assert_eq!(tip.height, 3);
        assert_eq!(tip.hash.to_hex(), HASHES[2]);

        // prev links and heights are consistent
        for hash in &added {
            let entry = chain.lookup(hash).unwrap().unwrap();
            let prev = chain.lookup(&entry.prev).unwrap().unwrap();
            assert_eq!(prev.height + 1, entry.height);
        }
        // only the starting tail was replaced
        assert_eq!(chain.tails().unwrap().len(), 1);
    }

    #[test]
    fn test_append_is_idempotent() {
        let chain = open_chain();
        let headers = parse_headers();
        chain.append(&headers).unwrap();
        let re_added = chain.append(&headers).unwrap();
        assert!(re_added.is_empty());
        assert_eq!(chain.best_tip().unwrap().height, 3);
    }

    #[test]
    fn test_orphan_rejected() {
        // S2: skipping the middle header leaves the chain unchanged
        let chain = open_chain();
        let headers = parse_headers();
        let result = chain.append(&[headers[0], headers[2]]);
        match result {
            Err(ChainError::OrphanBlock(prev)) => {
                assert_eq!(prev, headers[2].prev_hash);
            }
            other => panic!("expected OrphanBlock, got {:?}", other),
        }
        // the whole batch is rejected; nothing was written
        assert_eq!(chain.best_tip().unwrap().height, 0);
        assert!(!chain.contains(&headers[0].hash()).unwrap());
        assert!(!chain.contains(&headers[2].hash()).unwrap());
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let chain = open_chain();
        let mut header = parse_headers()[0];
        header.timestamp = u32::MAX;
        match chain.append(&[header]) {
            Err(ChainError::FutureTimestamp(_)) => {}
            other => panic!("expected FutureTimestamp, got {:?}", other),
        }
    }

    #[test]
    fn test_easy_bits_rejected() {
        let chain = open_chain();
        let mut header = parse_headers()[0];
        header.bits = 0x1f00_ffff;
        match chain.append(&[header]) {
            Err(ChainError::PowTooEasy { .. }) => {}
            other => panic!("expected PowTooEasy, got {:?}", other),
        }
    }

    #[test]
    fn test_tampered_header_fails_pow() {
        let chain = open_chain();
        let mut header = parse_headers()[0];
        header.nonce = [0xde, 0xad, 0xbe, 0xef];
        match chain.append(&[header]) {
            Err(ChainError::BadPow(_)) => {}
            other => panic!("expected BadPow, got {:?}", other),
        }
    }

    #[test]
    fn test_locator_shape() {
        // S3: [H3, H2, H1, genesis]
        let chain = open_chain();
        chain.append(&parse_headers()).unwrap();
        let tip = chain.best_tip().unwrap();
        let locator = chain.locator(&tip.hash).unwrap();
        assert_eq!(locator.len(), 4);
        for (hash, expected) in locator.iter().take(3).zip(HASHES.iter().rev()) {
            assert_eq!(hash.to_hex(), *expected);
        }
        assert_eq!(locator[3], chain.params().genesis_hash);
    }

    #[test]
    fn test_locator_of_unknown_hash_is_genesis() {
        let chain = open_chain();
        let locator = chain.locator(&Hash256::new([0xab; 32])).unwrap();
        assert_eq!(locator, vec![chain.params().genesis_hash]);
    }

    #[test]
    fn test_height_index_stays_behind_tip() {
        let chain = open_chain();
        chain.append(&parse_headers()).unwrap();
        // tip is at 3; nothing above genesis is NCONFIRMED deep yet
        assert_eq!(chain.hash_at(1).unwrap(), None);
        assert_eq!(chain.hash_at(2).unwrap(), None);
        assert_eq!(chain.hash_at(3).unwrap(), None);
    }

    #[test]
    fn test_checkpoint_gate() {
        let chain = open_chain();
        // pretend we synced to just below an anchored height
        let mut prev = chain.params().genesis_hash;
        for height in 1..=1499u64 {
            if height >= 1495 {
                // only the tail of the fake chain needs real entries
                let mut bytes = [0u8; 32];
                bytes[..8].copy_from_slice(&height.to_le_bytes());
                let hash = Hash256::new(bytes);
                chain
                    .insert_unchecked(ChainEntry {
                        hash,
                        height,
                        prev,
                    })
                    .unwrap();
                prev = hash;
            } else {
                let mut bytes = [0u8; 32];
                bytes[..8].copy_from_slice(&height.to_le_bytes());
                prev = Hash256::new(bytes);
            }
        }

        // any header landing on height 1500 with the wrong hash is refused
        let header = BlockHeader {
            version: 2,
            prev_hash: prev,
            merkle_root: Hash256::zero(),
            timestamp: 1_400_000_000,
            bits: 0x1e0f_fff0,
            nonce: [0; 4],
        };
        match chain.append(&[header]) {
            Err(ChainError::CheckpointMismatch { height, .. }) => assert_eq!(height, 1500),
            other => panic!("expected CheckpointMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_locator_doubling() {
        // fabricate a 39-deep linked chain with a confirmed index so the
        // exponential part of the locator has heights to read
        let chain = open_chain();
        let genesis = chain.params().genesis_hash;
        let hash_for = |height: u64| {
            let mut bytes = [0u8; 32];
            bytes[..8].copy_from_slice(&height.to_le_bytes());
            Hash256::new(bytes)
        };
        let mut prev = genesis;
        for height in 1..=39u64 {
            let hash = hash_for(height);
            chain
                .insert_unchecked(ChainEntry { hash, height, prev })
                .unwrap();
            if height <= 34 {
                chain.index_height(height, &hash).unwrap();
            }
            prev = hash;
        }

        let locator = chain.locator(&hash_for(39)).unwrap();
        // the tip, ten single steps, then strides of 2, 4 and 8
        let mut expected: Vec<Hash256> = (29..=39).rev().map(hash_for).collect();
        expected.extend([hash_for(27), hash_for(23), hash_for(15), genesis]);
        assert_eq!(locator, expected);
    }

    #[test]
    fn test_reopen_preserves_state() {
        let store = Store::memory().unwrap();
        {
            let chain = Chain::open(&store, Params::mainnet()).unwrap();
            chain.append(&parse_headers()).unwrap();
        }
        let chain = Chain::open(&store, Params::mainnet()).unwrap();
        assert_eq!(chain.best_tip().unwrap().height, 3);
    }
}
