//! Portable scalar block generator
//!
//! One 64-byte block at a time; this is the correctness oracle for the
//! SIMD backends and the fallback when neither is available.

use byteorder::{ByteOrder, LittleEndian};

use super::{advance_counter, Rounds, CHACHA_BLOCK_SIZE};
use crate::security::EphemeralSecret;

/// The ChaCha quarter round
#[inline]
fn quarter_round(x: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
    x[a] = x[a].wrapping_add(x[b]);
    x[d] ^= x[a];
    x[d] = x[d].rotate_left(16);

    x[c] = x[c].wrapping_add(x[d]);
    x[b] ^= x[c];
    x[b] = x[b].rotate_left(12);

    x[a] = x[a].wrapping_add(x[b]);
    x[d] ^= x[a];
    x[d] = x[d].rotate_left(8);

    x[c] = x[c].wrapping_add(x[d]);
    x[b] ^= x[c];
    x[b] = x[b].rotate_left(7);
}

/// Generate whole 64-byte blocks into `out`, returning bytes written
///
/// The trailing `out.len() % 64` bytes are left untouched; sub-block
/// delivery is the streaming layer's job.
pub(crate) fn generate(state: &mut [u32; 16], rounds: Rounds, out: &mut [u8]) -> usize {
    let mut written = 0;
    for block in out.chunks_exact_mut(CHACHA_BLOCK_SIZE) {
        // Private working copy; the pre-mixing state stays read-only and
        // the intermediates are zeroized when the copy drops.
        let mut working = EphemeralSecret::new(*state);
        for _ in 0..rounds.double_rounds() {
            // Mix columns
            quarter_round(&mut working, 0, 4, 8, 12);
            quarter_round(&mut working, 1, 5, 9, 13);
            quarter_round(&mut working, 2, 6, 10, 14);
            quarter_round(&mut working, 3, 7, 11, 15);
            // Mix diagonals
            quarter_round(&mut working, 0, 5, 10, 15);
            quarter_round(&mut working, 1, 6, 11, 12);
            quarter_round(&mut working, 2, 7, 8, 13);
            quarter_round(&mut working, 3, 4, 9, 14);
        }

        // The feed-forward addition of the input state is what makes this
        // a one-way function rather than a permutation.
        for i in 0..16 {
            LittleEndian::write_u32(&mut block[i * 4..], working[i].wrapping_add(state[i]));
        }

        advance_counter(state, 1);
        written += CHACHA_BLOCK_SIZE;
    }
    written
}
