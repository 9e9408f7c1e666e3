// Lyra2REv2 proof-of-work chain
//
// blake256 -> keccak256 -> cubehash256 -> lyra2 -> skein256 -> cubehash256
// -> bmw256, each stage consuming the previous 32-byte digest. No registry
// crate implements this chain, so the primitives live here; Keccak comes
// from the sha3 crate.

mod blake256;
mod bmw;
mod cubehash;
mod lyra2;
mod skein;

use sha3::{Digest, Keccak256};

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// Lyra2REv2 digest of a serialized block header
pub fn sum(header_bytes: &[u8]) -> [u8; 32] {
    let d = blake256::blake256(header_bytes);
    let d = keccak256(&d);
    let d = cubehash::cubehash256(&d);
    let d = lyra2::lyra2(&d, &d);
    let d = skein::skein256(&d);
    let d = cubehash::cubehash256(&d);
    bmw::bmw256(&d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_is_deterministic() {
        let header = [0x5a; 80];
        assert_eq!(sum(&header), sum(&header));
    }

    #[test]
    fn test_sum_differs_per_input() {
        assert_ne!(sum(&[0u8; 80]), sum(&[1u8; 80]));
    }
}
