// Hashing utilities

use crate::core::Hash256;
use sha2::{Digest, Sha256};

/// Double SHA-256 (block hashes, txids, frame checksums)
pub fn hash256(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    Hash256::from_slice(&second).expect("SHA256 always returns 32 bytes")
}

/// Single SHA-256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let hash = Sha256::digest(data);
    let mut result = [0u8; 32];
    result.copy_from_slice(&hash);
    result
}

/// RIPEMD160(SHA256(data)) - address hashing
pub fn hash160(data: &[u8]) -> [u8; 20] {
    use ripemd::{Digest as RipemdDigest, Ripemd160};
    let sha = Sha256::digest(data);
    let ripemd = Ripemd160::digest(sha);
    let mut result = [0u8; 20];
    result.copy_from_slice(&ripemd);
    result
}

/// Leading 4 bytes of double SHA-256, used as the frame checksum
pub fn checksum4(data: &[u8]) -> [u8; 4] {
    let h = hash256(data);
    let mut out = [0u8; 4];
    out.copy_from_slice(&h.as_bytes()[..4]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash256() {
        let data = b"hello world";
        let hash = hash256(data);
        assert_eq!(hash.as_bytes().len(), 32);
        assert_eq!(hash, hash256(data));
    }

    #[test]
    fn test_hash160() {
        let data = b"test data";
        let hash = hash160(data);
        assert_eq!(hash.len(), 20);
    }

    #[test]
    fn test_checksum4_matches_hash256_prefix() {
        let data = b"payload";
        let c = checksum4(data);
        assert_eq!(&c[..], &hash256(data).as_bytes()[..4]);
    }

    #[test]
    fn test_checksum4_empty_payload() {
        // double sha256 of "" starts with 5df6e0e2 (well-known vector)
        assert_eq!(checksum4(b""), [0x5d, 0xf6, 0xe0, 0xe2]);
    }
}
