//! Eight-block AVX2 generator
//!
//! Each 256-bit register holds one state word position across eight
//! counter-consecutive blocks. The output transpose happens in two steps:
//! a 4x4 32-bit unpack transpose within each 128-bit half, then a
//! `permute2x128` interleave to split the halves into blocks 0..4 and
//! 4..8 (the unpack instructions are intra-lane, so the cross-lane fixup
//! cannot be skipped).

#[cfg(target_arch = "x86")]
use core::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use core::arch::x86_64::*;

use super::{advance_counter, block_counter, Rounds};

/// Bytes produced per batch: eight 64-byte blocks
pub(crate) const BATCH_SIZE: usize = 512;

/// Generate whole eight-block batches into `out`, returning bytes written
///
/// A span shorter than one batch produces nothing; the counter advances by
/// eight per batch, with u64 arithmetic carrying the low word into the
/// high word at the 2^32 boundary.
///
/// # Safety
///
/// The CPU must support AVX2 (guaranteed by the dispatcher's probe).
#[target_feature(enable = "avx2")]
pub(crate) unsafe fn generate(state: &mut [u32; 16], rounds: Rounds, out: &mut [u8]) -> usize {
    // Byte shuffles replacing the 16- and 8-bit rotates
    let rot16 = _mm256_set_epi8(
        13, 12, 15, 14, 9, 8, 11, 10, 5, 4, 7, 6, 1, 0, 3, 2, 13, 12, 15, 14, 9, 8, 11, 10, 5, 4,
        7, 6, 1, 0, 3, 2,
    );
    let rot8 = _mm256_set_epi8(
        14, 13, 12, 15, 10, 9, 8, 11, 6, 5, 4, 7, 2, 1, 0, 3, 14, 13, 12, 15, 10, 9, 8, 11, 6, 5,
        4, 7, 2, 1, 0, 3,
    );

    // Broadcast each state word across all eight lanes
    let mut orig = [_mm256_setzero_si256(); 16];
    for (i, v) in orig.iter_mut().enumerate() {
        *v = _mm256_set1_epi32(state[i] as i32);
    }

    let mut written = 0;
    for batch in out.chunks_exact_mut(BATCH_SIZE) {
        // Distinct per-lane counters, computed in 64 bits so the carry into
        // the high word is exact even when a batch straddles 2^32
        let base = block_counter(state);
        let mut lo = [0i32; 8];
        let mut hi = [0i32; 8];
        for i in 0..8 {
            let n = base.wrapping_add(i as u64);
            lo[i] = n as u32 as i32;
            hi[i] = (n >> 32) as u32 as i32;
        }
        orig[12] = _mm256_setr_epi32(lo[0], lo[1], lo[2], lo[3], lo[4], lo[5], lo[6], lo[7]);
        orig[13] = _mm256_setr_epi32(hi[0], hi[1], hi[2], hi[3], hi[4], hi[5], hi[6], hi[7]);

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
        store_octo(&mut x, &orig, [0, 1, 2, 3, 4, 5, 6, 7], p);
        store_octo(&mut x, &orig, [8, 9, 10, 11, 12, 13, 14, 15], p.add(32));

        advance_counter(state, 8);
        written += BATCH_SIZE;
    }
    written
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn quarter_round(
    x: &mut [__m256i; 16],
    a: usize,
    b: usize,
    c: usize,
    d: usize,
    rot16: __m256i,
    rot8: __m256i,
) {
    x[a] = _mm256_add_epi32(x[a], x[b]);
    x[d] = _mm256_shuffle_epi8(_mm256_xor_si256(x[d], x[a]), rot16);

    x[c] = _mm256_add_epi32(x[c], x[d]);
    x[b] = rotate_left::<12, 20>(_mm256_xor_si256(x[b], x[c]));

    x[a] = _mm256_add_epi32(x[a], x[b]);
    x[d] = _mm256_shuffle_epi8(_mm256_xor_si256(x[d], x[a]), rot8);

    x[c] = _mm256_add_epi32(x[c], x[d]);
    x[b] = rotate_left::<7, 25>(_mm256_xor_si256(x[b], x[c]));
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn rotate_left<const N: i32, const INV: i32>(v: __m256i) -> __m256i {
    _mm256_or_si256(_mm256_slli_epi32(v, N), _mm256_srli_epi32(v, INV))
}

/// Feed-forward and 4x4-transpose one quadruple of word positions within
/// each 128-bit half; lanes stay half-local (blocks 0..4 low, 4..8 high)
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn transpose_quad(x: &mut [__m256i; 16], orig: &[__m256i; 16], a: usize, b: usize, c: usize, d: usize) {
    x[a] = _mm256_add_epi32(x[a], orig[a]);
    x[b] = _mm256_add_epi32(x[b], orig[b]);
    x[c] = _mm256_add_epi32(x[c], orig[c]);
    x[d] = _mm256_add_epi32(x[d], orig[d]);

    let t0 = _mm256_unpacklo_epi32(x[a], x[b]);
    let t1 = _mm256_unpacklo_epi32(x[c], x[d]);
    let t2 = _mm256_unpackhi_epi32(x[a], x[b]);
    let t3 = _mm256_unpackhi_epi32(x[c], x[d]);

    x[a] = _mm256_unpacklo_epi64(t0, t1);
    x[b] = _mm256_unpackhi_epi64(t0, t1);
    x[c] = _mm256_unpacklo_epi64(t2, t3);
    x[d] = _mm256_unpackhi_epi64(t2, t3);
}

/// Transpose and store eight word positions: low 128-bit halves are blocks
/// 0..4, high halves blocks 4..8, so each `permute2x128` pair lands one
/// 32-byte run of a block, 64 bytes apart per block
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn store_octo(x: &mut [__m256i; 16], orig: &[__m256i; 16], w: [usize; 8], out: *mut u8) {
    let [a, b, c, d, a2, b2, c2, d2] = w;
    transpose_quad(x, orig, a, b, c, d);
    transpose_quad(x, orig, a2, b2, c2, d2);

    _mm256_storeu_si256(
        out as *mut __m256i,
        _mm256_permute2x128_si256(x[a], x[a2], 0x20),
    );
    _mm256_storeu_si256(
        out.add(64) as *mut __m256i,
        _mm256_permute2x128_si256(x[b], x[b2], 0x20),
    );
    _mm256_storeu_si256(
        out.add(128) as *mut __m256i,
        _mm256_permute2x128_si256(x[c], x[c2], 0x20),
    );
    _mm256_storeu_si256(
        out.add(192) as *mut __m256i,
        _mm256_permute2x128_si256(x[d], x[d2], 0x20),
    );
    _mm256_storeu_si256(
        out.add(256) as *mut __m256i,
        _mm256_permute2x128_si256(x[a], x[a2], 0x31),
    );
    _mm256_storeu_si256(
        out.add(320) as *mut __m256i,
        _mm256_permute2x128_si256(x[b], x[b2], 0x31),
    );
    _mm256_storeu_si256(
        out.add(384) as *mut __m256i,
        _mm256_permute2x128_si256(x[c], x[c2], 0x31),
    );
    _mm256_storeu_si256(
        out.add(448) as *mut __m256i,
        _mm256_permute2x128_si256(x[d], x[d2], 0x31),
    );
}
