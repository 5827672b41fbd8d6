//! Four-block SSSE3 generator
//!
//! Each 128-bit register holds one state word position across four
//! counter-consecutive blocks (lane i = block i). After mixing, a 4x4
//! 32-bit transpose converts the lane-major results back to block-major
//! byte order; skipping it would yield plausible-looking garbage, so it is
//! the correctness-critical step. The multiple-of-8 rotates are byte
//! shuffles, which is cheaper than shift/shift/or on these widths.

#[cfg(target_arch = "x86")]
use core::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use core::arch::x86_64::*;

use super::{advance_counter, block_counter, Rounds};

/// Bytes produced per batch: four 64-byte blocks
pub(crate) const BATCH_SIZE: usize = 256;

/// Generate whole four-block batches into `out`, returning bytes written
///
/// A span shorter than one batch produces nothing; the counter advances by
/// four per batch, with u64 arithmetic carrying the low word into the high
/// word at the 2^32 boundary.
///
/// # Safety
///
/// The CPU must support SSSE3 (guaranteed by the dispatcher's probe).
#[target_feature(enable = "ssse3")]
pub(crate) unsafe fn generate(state: &mut [u32; 16], rounds: Rounds, out: &mut [u8]) -> usize {
    // Byte shuffles replacing the 16- and 8-bit rotates
    let rot16 = _mm_set_epi8(13, 12, 15, 14, 9, 8, 11, 10, 5, 4, 7, 6, 1, 0, 3, 2);
    let rot8 = _mm_set_epi8(14, 13, 12, 15, 10, 9, 8, 11, 6, 5, 4, 7, 2, 1, 0, 3);

    // Broadcast each state word across all four lanes
    let mut orig = [_mm_setzero_si128(); 16];
    for (i, v) in orig.iter_mut().enumerate() {
        *v = _mm_set1_epi32(state[i] as i32);
    }

    let mut written = 0;
    for batch in out.chunks_exact_mut(BATCH_SIZE) {
        // Distinct per-lane counters, computed in 64 bits so the carry into
        // the high word is exact even when a batch straddles 2^32
        let base = block_counter(state);
        let lane = [
            base,
            base.wrapping_add(1),
            base.wrapping_add(2),
            base.wrapping_add(3),
        ];
        orig[12] = _mm_set_epi32(
            lane[3] as u32 as i32,
            lane[2] as u32 as i32,
            lane[1] as u32 as i32,
            lane[0] as u32 as i32,
        );
        orig[13] = _mm_set_epi32(
            (lane[3] >> 32) as u32 as i32,
            (lane[2] >> 32) as u32 as i32,
            (lane[1] >> 32) as u32 as i32,
            (lane[0] >> 32) as u32 as i32,
        );

        let mut x = orig;
        for _ in 0..rounds.double_rounds() {
            // Mix columns
            quarter_round(&mut x, 0, 4, 8, 12, rot16, rot8);
            quarter_round(&mut x, 1, 5, 9, 13, rot16, rot8);
            quarter_round(&mut x, 2, 6, 10, 14, rot16, rot8);
            quarter_round(&mut x, 3, 7, 11, 15, rot16, rot8);
            // Mix diagonals
            quarter_round(&mut x, 0, 5, 10, 15, rot16, rot8);
            quarter_round(&mut x, 1, 6, 11, 12, rot16, rot8);
            quarter_round(&mut x, 2, 7, 8, 13, rot16, rot8);
            quarter_round(&mut x, 3, 4, 9, 14, rot16, rot8);
        }

        let p = batch.as_mut_ptr();
        store_quad(&mut x, &orig, 0, 1, 2, 3, p);
        store_quad(&mut x, &orig, 4, 5, 6, 7, p.add(16));
        store_quad(&mut x, &orig, 8, 9, 10, 11, p.add(32));
        store_quad(&mut x, &orig, 12, 13, 14, 15, p.add(48));

        advance_counter(state, 4);
        written += BATCH_SIZE;
    }
    written
}

#[inline]
#[target_feature(enable = "ssse3")]
unsafe fn quarter_round(
    x: &mut [__m128i; 16],
    a: usize,
    b: usize,
    c: usize,
    d: usize,
    rot16: __m128i,
    rot8: __m128i,
) {
    x[a] = _mm_add_epi32(x[a], x[b]);
    x[d] = _mm_shuffle_epi8(_mm_xor_si128(x[d], x[a]), rot16);

    x[c] = _mm_add_epi32(x[c], x[d]);
    x[b] = rotate_left::<12, 20>(_mm_xor_si128(x[b], x[c]));

    x[a] = _mm_add_epi32(x[a], x[b]);
    x[d] = _mm_shuffle_epi8(_mm_xor_si128(x[d], x[a]), rot8);

    x[c] = _mm_add_epi32(x[c], x[d]);
    x[b] = rotate_left::<7, 25>(_mm_xor_si128(x[b], x[c]));
}

#[inline]
#[target_feature(enable = "ssse3")]
unsafe fn rotate_left<const N: i32, const INV: i32>(v: __m128i) -> __m128i {
    _mm_or_si128(_mm_slli_epi32(v, N), _mm_srli_epi32(v, INV))
}

/// Feed-forward, transpose and store one quadruple of word positions
///
/// On entry `x[a]` holds word `a` of blocks 0..4 across lanes; each output
/// block wants its words contiguous, so the quadruple is transposed and
/// the rows land 64 bytes apart (one row per block).
#[inline]
#[target_feature(enable = "ssse3")]
unsafe fn store_quad(
    x: &mut [__m128i; 16],
    orig: &[__m128i; 16],
    a: usize,
    b: usize,
    c: usize,
    d: usize,
    out: *mut u8,
) {
    x[a] = _mm_add_epi32(x[a], orig[a]);
    x[b] = _mm_add_epi32(x[b], orig[b]);
    x[c] = _mm_add_epi32(x[c], orig[c]);
    x[d] = _mm_add_epi32(x[d], orig[d]);

    let t0 = _mm_unpacklo_epi32(x[a], x[b]);
    let t1 = _mm_unpacklo_epi32(x[c], x[d]);
    let t2 = _mm_unpackhi_epi32(x[a], x[b]);
    let t3 = _mm_unpackhi_epi32(x[c], x[d]);

    _mm_storeu_si128(out as *mut __m128i, _mm_unpacklo_epi64(t0, t1));
    _mm_storeu_si128(out.add(64) as *mut __m128i, _mm_unpackhi_epi64(t0, t1));
    _mm_storeu_si128(out.add(128) as *mut __m128i, _mm_unpacklo_epi64(t2, t3));
    _mm_storeu_si128(out.add(192) as *mut __m128i, _mm_unpackhi_epi64(t2, t3));
}
