// CubeHash-256 (16 rounds per 32-byte block)

const ROUNDS_PER_BLOCK: usize = 16;
const INIT_AND_FINAL_ROUNDS: usize = 10 * ROUNDS_PER_BLOCK;
const BLOCK_BYTES: usize = 32;
const OUT_BYTES: usize = 32;

fn round(x: &mut [u32; 32]) {
    for i in 0..16 {
        x[i + 16] = x[i + 16].wrapping_add(x[i]);
    }
    for i in 0..16 {
        x[i] = x[i].rotate_left(7);
    }
    for i in 0..8 {
        x.swap(i, i + 8);
    }
    for i in 0..16 {
        x[i] ^= x[i + 16];
    }
    for i in (16..32).filter(|i| i & 2 == 0) {
        x.swap(i, i | 2);
    }
    for i in 0..16 {
        x[i + 16] = x[i + 16].wrapping_add(x[i]);
    }
    for i in 0..16 {
        x[i] = x[i].rotate_left(11);
    }
    for i in (0..16).filter(|i| i & 4 == 0) {
        x.swap(i, i | 4);
    }
    for i in 0..16 {
        x[i] ^= x[i + 16];
    }
    for i in (16..32).filter(|i| i & 1 == 0) {
        x.swap(i, i | 1);
    }
}

fn initial_state() -> [u32; 32] {
    // The IV is defined, not memorized: parameters in the first three
    // words, then ten blocks worth of blank rounds.
    let mut x = [0u32; 32];
    x[0] = OUT_BYTES as u32;
    x[1] = BLOCK_BYTES as u32;
    x[2] = ROUNDS_PER_BLOCK as u32;
    for _ in 0..INIT_AND_FINAL_ROUNDS {
        round(&mut x);
    }
    x
}

fn absorb(x: &mut [u32; 32], block: &[u8; BLOCK_BYTES]) {
    for i in 0..8 {
        x[i] ^= u32::from_le_bytes(block[i * 4..i * 4 + 4].try_into().unwrap());
    }
    for _ in 0..ROUNDS_PER_BLOCK {
        round(x);
    }
}

pub fn cubehash256(data: &[u8]) -> [u8; 32] {
    let mut x = initial_state();

    let mut chunks = data.chunks_exact(BLOCK_BYTES);
    for chunk in &mut chunks {
        absorb(&mut x, chunk.try_into().unwrap());
    }
    let mut last = [0u8; BLOCK_BYTES];
    let rem = chunks.remainder();
    last[..rem.len()].copy_from_slice(rem);
    last[rem.len()] = 0x80;
    absorb(&mut x, &last);

    x[31] ^= 1;
    for _ in 0..INIT_AND_FINAL_ROUNDS {
        round(&mut x);
    }

    let mut out = [0u8; 32];
    for i in 0..8 {
        out[i * 4..i * 4 + 4].copy_from_slice(&x[i].to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = cubehash256(&[0x13; 32]);
        assert_eq!(a, cubehash256(&[0x13; 32]));
        assert_ne!(a, cubehash256(&[0x14; 32]));
    }

    #[test]
    fn test_padding_distinguishes_lengths() {
        assert_ne!(cubehash256(&[0u8; 31]), cubehash256(&[0u8; 32]));
    }
}
