// Partial merkle tree verification
//
// A merkleblock carries (total, hashes, flags); walking the implicit tree
// from the root reconstructs the merkle root and yields the txids that
// matched the peer's view of our bloom filter.

use crate::core::{hash256, Hash256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("computed root does not match the header merkle root")]
    MerkleMismatch,
    #[error("not all hashes were consumed ({used} of {total})")]
    UnusedHashes { used: usize, total: usize },
    #[error("flag bits remain set after the walk")]
    UnusedFlags,
    #[error("ran out of {0} during the walk")]
    Truncated(&'static str),
}

/// Partial merkle tree as carried in a merkleblock payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialMerkleTree {
    pub total: u32,
    pub hashes: Vec<Hash256>,
    pub flags: Vec<u8>,
}

struct Walk<'a> {
    tree: &'a PartialMerkleTree,
    next_bit: usize,
    next_hash: usize,
    matched: Vec<Hash256>,
}

impl<'a> Walk<'a> {
    fn take_bit(&mut self) -> Result<bool, MerkleError> {
        let byte = self.next_bit >> 3;
        if byte >= self.tree.flags.len() {
            return Err(MerkleError::Truncated("flag bits"));
        }
        // LSB-first within each byte
        let bit = self.tree.flags[byte] >> (self.next_bit & 7) & 1 == 1;
        self.next_bit += 1;
        Ok(bit)
    }

    fn take_hash(&mut self) -> Result<Hash256, MerkleError> {
        let hash = self
            .tree
            .hashes
            .get(self.next_hash)
            .copied()
            .ok_or(MerkleError::Truncated("hashes"))?;
        self.next_hash += 1;
        Ok(hash)
    }

    /// Width of the tree at `height` (0 = leaves)
    fn width(&self, height: u32) -> u32 {
        (self.tree.total + (1 << height) - 1) >> height
    }

    fn descend(&mut self, height: u32, pos: u32) -> Result<Hash256, MerkleError> {
        if !self.take_bit()? {
            // Pruned subtree: its root is supplied verbatim
            return self.take_hash();
        }
        if height == 0 {
            // Matched leaf
            let hash = self.take_hash()?;
            self.matched.push(hash);
            return Ok(hash);
        }
        let left = self.descend(height - 1, pos * 2)?;
        let right = if pos * 2 + 1 < self.width(height - 1) {
            self.descend(height - 1, pos * 2 + 1)?
        } else {
            // A missing right child duplicates the left
            left
        };
        let mut concat = [0u8; 64];
        concat[..32].copy_from_slice(left.as_bytes());
        concat[32..].copy_from_slice(right.as_bytes());
        Ok(hash256(&concat))
    }
}

impl PartialMerkleTree {
    pub fn new(total: u32, hashes: Vec<Hash256>, flags: Vec<u8>) -> Self {
        Self {
            total,
            hashes,
            flags,
        }
    }

    /// Reconstruct the root and the matched txids.
    /// Every hash must be consumed and every flag bit beyond the walk must
    /// be zero padding.
    pub fn extract(&self) -> Result<(Hash256, Vec<Hash256>), MerkleError> {
        if self.total == 0 {
            return Err(MerkleError::Truncated("leaves"));
        }
        let mut height = 0u32;
        while (1u32 << height) < self.total {
            height += 1;
        }

        let mut walk = Walk {
            tree: self,
            next_bit: 0,
            next_hash: 0,
            matched: Vec::new(),
        };
        let root = walk.descend(height, 0)?;

        if walk.next_hash != self.hashes.len() {
            return Err(MerkleError::UnusedHashes {
                used: walk.next_hash,
                total: self.hashes.len(),
            });
        }
        // The flag stream is byte-padded on the wire; leftover bits must be 0
        for bit in walk.next_bit..self.flags.len() * 8 {
            if self.flags[bit >> 3] >> (bit & 7) & 1 == 1 {
                return Err(MerkleError::UnusedFlags);
            }
        }
        Ok((root, walk.matched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The canonical 7-leaf example: 4 supplied hashes, flags 0x1d,
    /// exactly one matched transaction.
    fn canonical_tree() -> (PartialMerkleTree, Hash256) {
        let hashes = [
            "3612262624047ee87660be1a707519a443b1c1ce3d248cbfc6c15870f6c5daa2",
            "019f5b01d4195ecbc9398fbf3c3b1fa9bb3183301d7a1fb3bd174fcfa40a2b65",
            "41ed70551dd7e841883ab8f0b16bf04176b7d1480e4f0af9f3d4c3595768d068",
            "20d2a7bc994987302e5b1ac80fc425fe25f8b63169ea78e68fbaaefa59379bbf",
        ]
        .iter()
        .map(|h| {
            // the payload carries hashes in wire order, not display order
            Hash256::from_slice(&hex::decode(h).unwrap()).unwrap()
        })
        .collect();
        let merkle_root = Hash256::from_slice(
            &hex::decode("7f16c5962e8bd963659c793ce370d95f093bc7e367117b3c30c1f8fdd0d97287")
                .unwrap(),
        )
        .unwrap();
        (PartialMerkleTree::new(7, hashes, vec![0x1d]), merkle_root)
    }

    #[test]
    fn test_canonical_extraction() {
        let (tree, root) = canonical_tree();
        let (computed, matched) = tree.extract().unwrap();
        assert_eq!(computed, root);
        assert_eq!(matched.len(), 1);
        assert_eq!(
            hex::encode(matched[0].as_bytes()),
            "019f5b01d4195ecbc9398fbf3c3b1fa9bb3183301d7a1fb3bd174fcfa40a2b65"
        );
    }

    #[test]
    fn test_unused_hash_detected() {
        let (mut tree, _) = canonical_tree();
        tree.hashes.push(Hash256::new([9; 32]));
        assert!(matches!(
            tree.extract(),
            Err(MerkleError::UnusedHashes { used: 4, total: 5 })
        ));
    }

    #[test]
    fn test_leftover_flag_bit_detected() {
        let (mut tree, _) = canonical_tree();
        tree.flags = vec![0x1d | 0x80];
        assert_eq!(tree.extract(), Err(MerkleError::UnusedFlags));
    }

    #[test]
    fn test_missing_hashes_detected() {
        let (mut tree, _) = canonical_tree();
        tree.hashes.truncate(2);
        assert_eq!(tree.extract(), Err(MerkleError::Truncated("hashes")));
    }

    #[test]
    fn test_single_leaf_tree() {
        // total = 1: the lone leaf is the root
        let txid = Hash256::new([3; 32]);
        let tree = PartialMerkleTree::new(1, vec![txid], vec![0x01]);
        let (root, matched) = tree.extract().unwrap();
        assert_eq!(root, txid);
        assert_eq!(matched, vec![txid]);

        // flag 0: same root, nothing matched
        let tree = PartialMerkleTree::new(1, vec![txid], vec![0x00]);
        let (root, matched) = tree.extract().unwrap();
        assert_eq!(root, txid);
        assert!(matched.is_empty());
    }
}
