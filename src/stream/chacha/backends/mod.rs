//! Block generator backends and capability dispatch
//!
//! Every backend is a pure mapping from (cipher state, destination span) to
//! (keystream bytes, advanced counter) and all of them are bit-for-bit
//! interchangeable: for the same starting state and the same number of
//! whole blocks they produce identical bytes and leave the counter at the
//! identical value. The scalar `soft` generator is the ground truth; the
//! wide generators compute 4 or 8 counter-consecutive blocks per batch.

use super::{Rounds, CHACHA_BLOCK_SIZE};

pub(crate) mod soft;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub(crate) mod avx2;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub(crate) mod ssse3;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
cpufeatures::new!(avx2_cpuid, "avx2");
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
cpufeatures::new!(ssse3_cpuid, "ssse3");

/// Block generator variants; one is bound per stream at construction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Backend {
    /// Portable one-block-at-a-time generator, always available
    Soft,
    /// SSSE3 generator, four blocks per batch
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    Ssse3,
    /// AVX2 generator, eight blocks per batch
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    Avx2,
}

impl Backend {
    /// Probe CPU capabilities widest-first and pick a generator
    ///
    /// The returned binding is fixed for the lifetime of the stream that
    /// stores it; there is no re-probing mid-stream.
    pub(crate) fn detect() -> Self {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            if avx2_cpuid::get() {
                return Backend::Avx2;
            }
            if ssse3_cpuid::get() {
                return Backend::Ssse3;
            }
        }
        Backend::Soft
    }

    /// Bytes produced per batch: 64, 256 or 512
    pub(crate) fn batch_size(self) -> usize {
        match self {
            Backend::Soft => CHACHA_BLOCK_SIZE,
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            Backend::Ssse3 => ssse3::BATCH_SIZE,
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            Backend::Avx2 => avx2::BATCH_SIZE,
        }
    }

    /// Writes as many whole batches as fit in `out` and returns the byte
    /// count written (always a multiple of the batch size; zero when `out`
    /// is shorter than one batch). The counter in `state` advances by the
    /// number of blocks written.
    pub(crate) fn generate(self, state: &mut [u32; 16], rounds: Rounds, out: &mut [u8]) -> usize {
        match self {
            Backend::Soft => soft::generate(state, rounds, out),
            // SAFETY: these variants are only constructed after the
            // corresponding cpufeatures probe succeeded.
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            Backend::Ssse3 => unsafe { ssse3::generate(state, rounds, out) },
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            Backend::Avx2 => unsafe { avx2::generate(state, rounds, out) },
        }
    }
}

/// 64-bit block counter held in state words 12-13
pub(crate) fn block_counter(state: &[u32; 16]) -> u64 {
    (state[12] as u64) | ((state[13] as u64) << 32)
}

/// Advance the counter by whole blocks, carrying into the high word
pub(crate) fn advance_counter(state: &mut [u32; 16], blocks: u64) {
    let counter = block_counter(state).wrapping_add(blocks);
    state[12] = counter as u32;
    state[13] = (counter >> 32) as u32;
}

/// Whether the four-block SSSE3 generator can run on this host
#[cfg(all(test, any(target_arch = "x86", target_arch = "x86_64")))]
pub(crate) fn ssse3_available() -> bool {
    ssse3_cpuid::get()
}

/// Whether the eight-block AVX2 generator can run on this host
#[cfg(all(test, any(target_arch = "x86", target_arch = "x86_64")))]
pub(crate) fn avx2_available() -> bool {
    avx2_cpuid::get()
}
