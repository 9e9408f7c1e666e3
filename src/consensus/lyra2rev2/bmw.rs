// Blue Midnight Wish 256 over a single 32-byte message

#[inline]
fn s0(x: u32) -> u32 {
    (x >> 1) ^ (x << 3) ^ x.rotate_left(4) ^ x.rotate_left(19)
}
#[inline]
fn s1(x: u32) -> u32 {
    (x >> 1) ^ (x << 2) ^ x.rotate_left(8) ^ x.rotate_left(23)
}
#[inline]
fn s2(x: u32) -> u32 {
    (x >> 2) ^ (x << 1) ^ x.rotate_left(12) ^ x.rotate_left(25)
}
#[inline]
fn s3(x: u32) -> u32 {
    (x >> 2) ^ (x << 2) ^ x.rotate_left(15) ^ x.rotate_left(29)
}
#[inline]
fn s4(x: u32) -> u32 {
    (x >> 1) ^ x
}
#[inline]
fn s5(x: u32) -> u32 {
    (x >> 2) ^ x
}

const S: [fn(u32) -> u32; 5] = [s0, s1, s2, s3, s4];
const R: [u32; 7] = [3, 7, 13, 16, 19, 23, 27];

/// (sign, index) pairs building W[0..16] from A[j] = M[j] ^ H[j]
const W_TABLE: [[(i32, usize); 5]; 16] = [
    [(1, 5), (-1, 7), (1, 10), (1, 13), (1, 14)],
    [(1, 6), (-1, 8), (1, 11), (1, 14), (-1, 15)],
    [(1, 0), (1, 7), (1, 9), (-1, 12), (1, 15)],
    [(1, 0), (-1, 1), (1, 8), (-1, 10), (1, 13)],
    [(1, 1), (1, 2), (1, 9), (-1, 11), (-1, 14)],
    [(1, 3), (-1, 2), (1, 10), (-1, 12), (1, 15)],
    [(1, 4), (-1, 0), (-1, 3), (-1, 11), (1, 13)],
    [(1, 1), (-1, 4), (-1, 5), (-1, 12), (-1, 14)],
    [(1, 2), (-1, 5), (-1, 6), (1, 13), (-1, 15)],
    [(1, 0), (-1, 3), (1, 6), (-1, 7), (1, 14)],
    [(1, 8), (-1, 1), (-1, 4), (-1, 7), (1, 15)],
    [(1, 8), (-1, 0), (-1, 2), (-1, 5), (1, 9)],
    [(1, 1), (1, 3), (-1, 6), (-1, 9), (1, 10)],
    [(1, 2), (1, 4), (1, 7), (1, 10), (1, 11)],
    [(1, 3), (-1, 5), (1, 8), (-1, 11), (-1, 12)],
    [(1, 12), (-1, 4), (-1, 6), (1, 9), (1, 13)],
];

fn add_element(m: &[u32; 16], h: &[u32; 16], j: usize) -> u32 {
    let k = ((16 + j) as u32).wrapping_mul(0x0555_5555);
    k.wrapping_add(m[j % 16].rotate_left((j % 16) as u32 + 1))
        .wrapping_add(m[(j + 3) % 16].rotate_left(((j + 3) % 16) as u32 + 1))
        .wrapping_sub(m[(j + 10) % 16].rotate_left(((j + 10) % 16) as u32 + 1))
        ^ h[(j + 7) % 16]
}

fn compress(m: &[u32; 16], h: &[u32; 16]) -> [u32; 16] {
    let mut q = [0u32; 32];

    // f0: fold message and chaining value
    for i in 0..16 {
        let mut w = 0u32;
        for (sign, j) in W_TABLE[i] {
            let a = m[j] ^ h[j];
            w = if sign > 0 {
                w.wrapping_add(a)
            } else {
                w.wrapping_sub(a)
            };
        }
        q[i] = S[i % 5](w).wrapping_add(h[(i + 1) % 16]);
    }

    // f1: two expand1 rounds, fourteen expand2 rounds
    for j in 0..2 {
        let mut acc = add_element(m, h, j);
        for l in 0..16 {
            acc = acc.wrapping_add(S[[1, 2, 3, 0][l % 4]](q[j + l]));
        }
        q[16 + j] = acc;
    }
    for j in 2..16 {
        let mut acc = add_element(m, h, j);
        for l in (0..14).step_by(2) {
            acc = acc.wrapping_add(q[j + l]);
        }
        for (slot, rot) in R.iter().enumerate() {
            acc = acc.wrapping_add(q[j + 2 * slot + 1].rotate_left(*rot));
        }
        acc = acc.wrapping_add(s4(q[j + 14])).wrapping_add(s5(q[j + 15]));
        q[16 + j] = acc;
    }

    // f2: fold into the next chaining value
    let xl = q[16..24].iter().fold(0u32, |a, v| a ^ v);
    let xh = q[24..32].iter().fold(xl, |a, v| a ^ v);

    let mut out = [0u32; 16];
    out[0] = ((xh << 5) ^ (q[16] >> 5) ^ m[0]).wrapping_add(xl ^ q[24] ^ q[0]);
    out[1] = ((xh >> 7) ^ (q[17] << 8) ^ m[1]).wrapping_add(xl ^ q[25] ^ q[1]);
    out[2] = ((xh >> 5) ^ (q[18] << 5) ^ m[2]).wrapping_add(xl ^ q[26] ^ q[2]);
    out[3] = ((xh >> 1) ^ (q[19] << 5) ^ m[3]).wrapping_add(xl ^ q[27] ^ q[3]);
    out[4] = ((xh >> 3) ^ q[20] ^ m[4]).wrapping_add(xl ^ q[28] ^ q[4]);
    out[5] = ((xh << 6) ^ (q[21] >> 6) ^ m[5]).wrapping_add(xl ^ q[29] ^ q[5]);
    out[6] = ((xh >> 4) ^ (q[22] << 6) ^ m[6]).wrapping_add(xl ^ q[30] ^ q[6]);
    out[7] = ((xh >> 11) ^ (q[23] << 2) ^ m[7]).wrapping_add(xl ^ q[31] ^ q[7]);

    out[8] = out[4]
        .rotate_left(9)
        .wrapping_add(xh ^ q[24] ^ m[8])
        .wrapping_add((xl << 8) ^ q[23] ^ q[8]);
    out[9] = out[5]
        .rotate_left(10)
        .wrapping_add(xh ^ q[25] ^ m[9])
        .wrapping_add((xl >> 6) ^ q[16] ^ q[9]);
    out[10] = out[6]
        .rotate_left(11)
        .wrapping_add(xh ^ q[26] ^ m[10])
        .wrapping_add((xl << 6) ^ q[17] ^ q[10]);
    out[11] = out[7]
        .rotate_left(12)
        .wrapping_add(xh ^ q[27] ^ m[11])
        .wrapping_add((xl << 4) ^ q[18] ^ q[11]);
    out[12] = out[0]
        .rotate_left(13)
        .wrapping_add(xh ^ q[28] ^ m[12])
        .wrapping_add((xl >> 3) ^ q[19] ^ q[12]);
    out[13] = out[1]
        .rotate_left(14)
        .wrapping_add(xh ^ q[29] ^ m[13])
        .wrapping_add((xl >> 4) ^ q[20] ^ q[13]);
    out[14] = out[2]
        .rotate_left(15)
        .wrapping_add(xh ^ q[30] ^ m[14])
        .wrapping_add((xl >> 7) ^ q[21] ^ q[14]);
    out[15] = out[3]
        .rotate_left(16)
        .wrapping_add(xh ^ q[31] ^ m[15])
        .wrapping_add((xl >> 2) ^ q[22] ^ q[15]);
    out
}

pub fn bmw256(data: &[u8; 32]) -> [u8; 32] {
    let mut m = [0u32; 16];
    for (i, word) in m.iter_mut().take(8).enumerate() {
        *word = u32::from_le_bytes(data[i * 4..i * 4 + 4].try_into().unwrap());
    }
    m[8] = 0x80;
    m[14] = 256; // bit length, low word
    let mut h = [0u32; 16];
    for (i, word) in h.iter_mut().enumerate() {
        *word = 0x4041_4243u32.wrapping_add((i as u32).wrapping_mul(0x0404_0404));
    }

    let h1 = compress(&m, &h);

    // finalization pass under the constant chaining value
    let mut hconst = [0u32; 16];
    for (i, word) in hconst.iter_mut().enumerate() {
        *word = 0xaaaa_aaa0u32.wrapping_add(i as u32);
    }
    let h2 = compress(&h1, &hconst);

    let mut out = [0u8; 32];
    for i in 0..8 {
        out[i * 4..i * 4 + 4].copy_from_slice(&h2[i + 8].to_le_bytes());
    }
    out
}
