// BLAKE-256 (the original SHA-3 finalist, not BLAKE2)

const IV: [u32; 8] = [
    0x6a09_e667, 0xbb67_ae85, 0x3c6e_f372, 0xa54f_f53a, 0x510e_527f, 0x9b05_688c, 0x1f83_d9ab,
    0x5be0_cd19,
];

const C: [u32; 16] = [
    0x243f_6a88, 0x85a3_08d3, 0x1319_8a2e, 0x0370_7344, 0xa409_3822, 0x299f_31d0, 0x082e_fa98,
    0xec4e_6c89, 0x4528_21e6, 0x38d0_1377, 0xbe54_66cf, 0x34e9_0c6c, 0xc0ac_29b7, 0xc97c_50dd,
    0x3f84_d5b5, 0xb547_0917,
];

const SIGMA: [[usize; 16]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [14, 10, 4, 8, 9, 15, 13, 6, 1, 12, 0, 2, 11, 7, 5, 3],
    [11, 8, 12, 0, 5, 2, 15, 13, 10, 14, 3, 6, 7, 1, 9, 4],
    [7, 9, 3, 1, 13, 12, 11, 14, 2, 6, 5, 10, 4, 0, 15, 8],
    [9, 0, 5, 7, 2, 4, 10, 15, 14, 1, 11, 12, 6, 8, 3, 13],
    [2, 12, 6, 10, 0, 11, 8, 3, 4, 13, 7, 5, 15, 14, 1, 9],
    [12, 5, 1, 15, 14, 13, 4, 10, 0, 7, 6, 3, 9, 2, 8, 11],
    [13, 11, 7, 14, 12, 1, 3, 9, 5, 0, 15, 4, 8, 6, 2, 10],
    [6, 15, 14, 9, 11, 3, 0, 8, 12, 2, 13, 7, 1, 4, 10, 5],
    [10, 2, 8, 4, 7, 6, 1, 5, 15, 11, 9, 14, 3, 12, 13, 0],
];

#[inline]
#[allow(clippy::too_many_arguments)]
fn g(v: &mut [u32; 16], m: &[u32; 16], r: usize, i: usize, a: usize, b: usize, c: usize, d: usize) {
    let s = &SIGMA[r % 10];
    v[a] = v[a]
        .wrapping_add(v[b])
        .wrapping_add(m[s[2 * i]] ^ C[s[2 * i + 1]]);
    v[d] = (v[d] ^ v[a]).rotate_right(16);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(12);
    v[a] = v[a]
        .wrapping_add(v[b])
        .wrapping_add(m[s[2 * i + 1]] ^ C[s[2 * i]]);
    v[d] = (v[d] ^ v[a]).rotate_right(8);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(7);
}

fn compress(h: &mut [u32; 8], block: &[u8], t_bits: u64) {
    let mut m = [0u32; 16];
    for (i, word) in m.iter_mut().enumerate() {
        *word = u32::from_be_bytes(block[i * 4..i * 4 + 4].try_into().unwrap());
    }

    let t0 = t_bits as u32;
    let t1 = (t_bits >> 32) as u32;
    let mut v = [0u32; 16];
    v[..8].copy_from_slice(h);
    v[8..12].copy_from_slice(&C[..4]);
    v[12] = C[4] ^ t0;
    v[13] = C[5] ^ t0;
    v[14] = C[6] ^ t1;
    v[15] = C[7] ^ t1;

    for r in 0..14 {
        g(&mut v, &m, r, 0, 0, 4, 8, 12);
        g(&mut v, &m, r, 1, 1, 5, 9, 13);
        g(&mut v, &m, r, 2, 2, 6, 10, 14);
        g(&mut v, &m, r, 3, 3, 7, 11, 15);
        g(&mut v, &m, r, 4, 0, 5, 10, 15);
        g(&mut v, &m, r, 5, 1, 6, 11, 12);
        g(&mut v, &m, r, 6, 2, 7, 8, 13);
        g(&mut v, &m, r, 7, 3, 4, 9, 14);
    }

    for i in 0..8 {
        h[i] ^= v[i] ^ v[i + 8];
    }
}

pub fn blake256(data: &[u8]) -> [u8; 32] {
    let mut h = IV;
    let bitlen = (data.len() as u64) * 8;

    let full_blocks = data.len() / 64;
    let rem = data.len() % 64;
    for i in 0..full_blocks {
        compress(&mut h, &data[i * 64..(i + 1) * 64], 512 * (i as u64 + 1));
    }
    let tail = &data[full_blocks * 64..];

    // final counter only covers real message bits in the block it closes
    let t_tail = if rem == 0 { 0 } else { bitlen };
    if rem < 55 {
        let mut block = [0u8; 64];
        block[..rem].copy_from_slice(tail);
        block[rem] = 0x80;
        block[55] |= 0x01;
        block[56..].copy_from_slice(&bitlen.to_be_bytes());
        compress(&mut h, &block, t_tail);
    } else if rem == 55 {
        let mut block = [0u8; 64];
        block[..55].copy_from_slice(tail);
        block[55] = 0x81;
        block[56..].copy_from_slice(&bitlen.to_be_bytes());
        compress(&mut h, &block, t_tail);
    } else {
        let mut block = [0u8; 64];
        block[..rem].copy_from_slice(tail);
        block[rem] = 0x80;
        compress(&mut h, &block, t_tail);
        let mut block = [0u8; 64];
        block[55] = 0x01;
        block[56..].copy_from_slice(&bitlen.to_be_bytes());
        compress(&mut h, &block, 0);
    }

    let mut out = [0u8; 32];
    for i in 0..8 {
        out[i * 4..i * 4 + 4].copy_from_slice(&h[i].to_be_bytes());
    }
    out
}
