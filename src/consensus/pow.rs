// Proof-of-work validation
//
// The network mined with scrypt until the Lyra2REv2 switch height and with
// Lyra2REv2 after it. Header hashes for identity are always double
// SHA-256; only the difficulty check uses these functions.

use crate::core::Hash256;
use crate::params::LYRA2REV2_SWITCH_HEIGHT;

use super::lyra2rev2;

/// Compact difficulty target expanded into 32 little-endian bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target(Hash256);

impl Target {
    /// Expand the compact `bits` field. The exponent byte addresses where
    /// the three mantissa bytes land in the little-endian array.
    pub fn from_bits(bits: u32) -> Self {
        let b = bits.to_le_bytes();
        let mut target = [0u8; 32];
        let exp = b[3] as usize;
        if (3..=32).contains(&exp) {
            target[exp - 1] = b[2];
            target[exp - 2] = b[1];
            target[exp - 3] = b[0];
        }
        Self(Hash256::new(target))
    }

    pub fn as_hash(&self) -> &Hash256 {
        &self.0
    }

    /// Does `digest` (little-endian) satisfy this target?
    pub fn admits(&self, digest: &Hash256) -> bool {
        self.0.cmp_le(digest) != std::cmp::Ordering::Less
    }
}

/// Difficulty digest of a serialized header at `height`
pub fn pow_digest(height: u64, header_bytes: &[u8]) -> Hash256 {
    if height < LYRA2REV2_SWITCH_HEIGHT {
        scrypt_digest(header_bytes)
    } else {
        Hash256::new(lyra2rev2::sum(header_bytes))
    }
}

/// scrypt(N=1024, r=1, p=1, dkLen=32) with the header as both password and
/// salt
fn scrypt_digest(header_bytes: &[u8]) -> Hash256 {
    let params = scrypt::Params::new(10, 1, 1, 32).expect("fixed scrypt parameters");
    let mut out = [0u8; 32];
    scrypt::scrypt(header_bytes, header_bytes, &params, &mut out)
        .expect("output length is fixed at 32");
    Hash256::new(out)
}
