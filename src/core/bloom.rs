// Bloom filter for filtered-block requests (BIP 37 shape)

use std::io::Cursor;

/// Number of hash functions applied per inserted datum
pub const HASH_FUNCS: u32 = 10;
/// Filter size in bytes (4096 bits)
pub const BYTE_LEN: usize = 512;

const SEED_STEP: u32 = 0xfba4_c795;

/// Fixed-size bloom filter. The tweak is drawn once per process from a
/// secure source; tests inject a deterministic one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u8>,
    tweak: u32,
}

impl BloomFilter {
    /// Empty filter with a random tweak
    pub fn new() -> Self {
        Self::with_tweak(rand::random())
    }

    /// Empty filter with an explicit tweak
    pub fn with_tweak(tweak: u32) -> Self {
        Self {
            bits: vec![0u8; BYTE_LEN],
            tweak,
        }
    }

    pub fn tweak(&self) -> u32 {
        self.tweak
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|b| *b == 0)
    }

    fn bit_index(&self, func: u32, data: &[u8]) -> u32 {
        let seed = func.wrapping_mul(SEED_STEP).wrapping_add(self.tweak);
        let h = murmur3::murmur3_32(&mut Cursor::new(data), seed).expect("in-memory read");
        h % (BYTE_LEN as u32 * 8)
    }

    fn set_bit(&mut self, idx: u32) {
        self.bits[(idx >> 3) as usize] |= 1 << (idx & 7);
    }

    fn get_bit(&self, idx: u32) -> bool {
        self.bits[(idx >> 3) as usize] & (1 << (idx & 7)) != 0
    }

    /// Insert a datum
    pub fn insert(&mut self, data: &[u8]) {
        for i in 0..HASH_FUNCS {
            let idx = self.bit_index(i, data);
            self.set_bit(idx);
        }
    }

    /// Probabilistic membership test (no false negatives)
    pub fn contains(&self, data: &[u8]) -> bool {
        (0..HASH_FUNCS).all(|i| self.get_bit(self.bit_index(i, data)))
    }
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_murmur3_reference_vectors() {
        // Canonical murmur3_x86_32 vectors
        assert_eq!(murmur3::murmur3_32(&mut Cursor::new(b""), 0).unwrap(), 0);
        assert_eq!(
            murmur3::murmur3_32(&mut Cursor::new(b""), 1).unwrap(),
            0x514e_28b7
        );
    }

    #[test]
    fn test_insert_and_contains() {
        let mut bf = BloomFilter::with_tweak(0x0000_1234);
        assert!(bf.is_empty());

        let key = hex::decode(
            "0341573692e18d367df964ba1effc151c5952a6128a0f973cb5006b0151d32e517",
        )
        .unwrap();
        bf.insert(&key);
        assert!(!bf.is_empty());
        assert!(bf.contains(&key));
    }

    #[test]
    fn test_insert_sets_at_most_hash_funcs_bits() {
        let mut bf = BloomFilter::with_tweak(7);
        bf.insert(b"datum");
        let set: u32 = bf.as_bytes().iter().map(|b| b.count_ones()).sum();
        assert!(set >= 1 && set <= HASH_FUNCS);
    }

    #[test]
    fn test_tweak_changes_layout() {
        let mut a = BloomFilter::with_tweak(1);
        let mut b = BloomFilter::with_tweak(2);
        a.insert(b"same datum");
        b.insert(b"same datum");
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
