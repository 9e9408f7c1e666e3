// Lyra2 memory-hard core (duplex sponge over the Blake2b permutation)
//
// Fixed to the parameters the chain uses: timeCost = 1, 4 rows x 4 columns,
// 32-byte password == salt, 32-byte output.

const BLOCK_WORDS: usize = 12; // words duplexed per column
const SAFE_WORDS: usize = 8; // words absorbed per bootstrap block
const N_ROWS: usize = 4;
const N_COLS: usize = 4;
const TIME_COST: usize = 1;
const ROW_WORDS: usize = BLOCK_WORDS * N_COLS;

const BLAKE2B_IV: [u64; 8] = [
    0x6a09_e667_f3bc_c908,
    0xbb67_ae85_84ca_a73b,
    0x3c6e_f372_fe94_f82b,
    0xa54f_f53a_5f1d_36f1,
    0x510e_527f_ade6_82d1,
    0x9b05_688c_2b3e_6c1f,
    0x1f83_d9ab_fb41_bd6b,
    0x5be0_cd19_137e_2179,
];

#[inline]
fn g(v: &mut [u64; 16], a: usize, b: usize, c: usize, d: usize) {
    v[a] = v[a].wrapping_add(v[b]);
    v[d] = (v[d] ^ v[a]).rotate_right(32);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(24);
    v[a] = v[a].wrapping_add(v[b]);
    v[d] = (v[d] ^ v[a]).rotate_right(16);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(63);
}

fn round_lyra(v: &mut [u64; 16]) {
    g(v, 0, 4, 8, 12);
    g(v, 1, 5, 9, 13);
    g(v, 2, 6, 10, 14);
    g(v, 3, 7, 11, 15);
    g(v, 0, 5, 10, 15);
    g(v, 1, 6, 11, 12);
    g(v, 2, 7, 8, 13);
    g(v, 3, 4, 9, 14);
}

fn full_rounds(state: &mut [u64; 16]) {
    for _ in 0..12 {
        round_lyra(state);
    }
}

/// Lyra2 as applied between the sponge stages of the PoW chain
pub fn lyra2(password: &[u8; 32], salt: &[u8; 32]) -> [u8; 32] {
    let mut state = [0u64; 16];
    state[8..].copy_from_slice(&BLAKE2B_IV);

    // Bootstrap input: password, salt and the parameter block, padded with
    // 0x80 .. 0x01 to whole 64-byte blocks.
    let mut input = [0u8; 2 * 64];
    input[..32].copy_from_slice(password);
    input[32..64].copy_from_slice(salt);
    for (i, param) in [32u64, 32, 32, TIME_COST as u64, N_ROWS as u64, N_COLS as u64]
        .into_iter()
        .enumerate()
    {
        input[64 + i * 8..64 + i * 8 + 8].copy_from_slice(&param.to_le_bytes());
    }
    input[112] = 0x80;
    input[127] ^= 0x01;

    for block in input.chunks_exact(64) {
        for i in 0..SAFE_WORDS {
            state[i] ^= u64::from_le_bytes(block[i * 8..i * 8 + 8].try_into().unwrap());
        }
        full_rounds(&mut state);
    }

    let mut matrix = [[0u64; ROW_WORDS]; N_ROWS];

    // Setup: row 0 is squeezed in reverse column order
    for col in 0..N_COLS {
        let dst = (N_COLS - 1 - col) * BLOCK_WORDS;
        matrix[0][dst..dst + BLOCK_WORDS].copy_from_slice(&state[..BLOCK_WORDS]);
        round_lyra(&mut state);
    }

    // Row 1 duplexes row 0
    for col in 0..N_COLS {
        let src = col * BLOCK_WORDS;
        for i in 0..BLOCK_WORDS {
            state[i] ^= matrix[0][src + i];
        }
        round_lyra(&mut state);
        let dst = (N_COLS - 1 - col) * BLOCK_WORDS;
        for i in 0..BLOCK_WORDS {
            matrix[1][dst + i] = matrix[0][src + i] ^ state[i];
        }
    }

    // Remaining rows: duplex with revisitation feedback
    let mut gap: i64 = 1;
    let mut step: usize = 1;
    let mut window: usize = 2;
    let mut prev: usize = 1;
    let mut rowa: usize = 0;
    for row in 2..N_ROWS {
        for col in 0..N_COLS {
            let src = col * BLOCK_WORDS;
            for i in 0..BLOCK_WORDS {
                state[i] ^= matrix[prev][src + i].wrapping_add(matrix[rowa][src + i]);
            }
            round_lyra(&mut state);
            let dst = (N_COLS - 1 - col) * BLOCK_WORDS;
            for i in 0..BLOCK_WORDS {
                matrix[row][dst + i] = matrix[prev][src + i] ^ state[i];
            }
            for i in 0..BLOCK_WORDS {
                matrix[rowa][src + i] ^= state[(i + BLOCK_WORDS - 1) % BLOCK_WORDS];
            }
        }
        rowa = (rowa + step) & (window - 1);
        prev = row;
        if rowa == 0 {
            step = (window as i64 + gap) as usize;
            window *= 2;
            gap = -gap;
        }
    }

    // Wandering: pseudorandom row visits driven by the sponge state
    let mut row: usize = 0;
    for tau in 1..=TIME_COST {
        let step = if tau % 2 == 0 { N_ROWS - 1 } else { N_ROWS / 2 - 1 };
        loop {
            rowa = (state[0] % N_ROWS as u64) as usize;
            for col in 0..N_COLS {
                let src = col * BLOCK_WORDS;
                for i in 0..BLOCK_WORDS {
                    state[i] ^= matrix[prev][src + i].wrapping_add(matrix[rowa][src + i]);
                }
                round_lyra(&mut state);
                for i in 0..BLOCK_WORDS {
                    matrix[row][src + i] ^= state[i];
                }
                for i in 0..BLOCK_WORDS {
                    matrix[rowa][src + i] ^= state[(i + BLOCK_WORDS - 1) % BLOCK_WORDS];
                }
            }
            prev = row;
            row = (row + step) % N_ROWS;
            if row == 0 {
                break;
            }
        }
    }

    // Absorb the last visited row and squeeze the key
    for i in 0..BLOCK_WORDS {
        state[i] ^= matrix[rowa][i];
    }
    full_rounds(&mut state);

    let mut out = [0u8; 32];
    for i in 0..4 {
        out[i * 8..i * 8 + 8].copy_from_slice(&state[i].to_le_bytes());
    }
    out
}
