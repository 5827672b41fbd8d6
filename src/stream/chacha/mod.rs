//! Seekable ChaCha keystream engine
//!
//! The cipher state is the classic 16-word ChaCha layout: words 0-3 hold
//! the "expand 32-byte k" constants, words 4-11 the 256-bit key, words
//! 12-13 a 64-bit little-endian block counter and words 14-15 the nonce.
//! The counter and nonce together form the 16-byte iv, so seeking is a
//! plain counter rewrite and independent workers can claim disjoint block
//! ranges from one shared key.
//!
//! Output is served through a small lookahead buffer so callers may request
//! any byte count: buffered leftovers go out first (strict FIFO), whole
//! batches are generated straight into the caller's buffer, and a sub-batch
//! tail triggers exactly one batch into the lookahead buffer. A sequence of
//! calls therefore yields byte-identical output to a single call of the
//! combined length.

use byteorder::{ByteOrder, LittleEndian};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{validate, Error, Result};
use crate::security::SecretBuffer;

pub(crate) mod backends;
use backends::{block_counter, Backend};

/// Size of a ChaCha key in bytes
pub const CHACHA_KEY_SIZE: usize = 32;
/// Size of the iv in bytes: a 64-bit little-endian block counter (usually
/// starting at zero) followed by a 64-bit nonce
pub const CHACHA_IV_SIZE: usize = 16;
/// Size of one keystream block in bytes
pub const CHACHA_BLOCK_SIZE: usize = 64;

/// Largest batch any backend produces per call (AVX2, eight blocks)
pub(crate) const MAX_BATCH_SIZE: usize = 512;

/// "expand 32-byte k" in little-endian
const STATE_CONSTANTS: [u32; 4] = [0x6170_7865, 0x3320_646e, 0x7962_2d32, 0x6b20_6574];

/// ChaCha round count
///
/// The variants are the only counts the ChaCha family defines; anything
/// else is rejected by [`Rounds::from_count`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rounds {
    /// ChaCha8
    R8 = 8,
    /// ChaCha12
    R12 = 12,
    /// ChaCha20
    R20 = 20,
}

impl Rounds {
    /// Validate a round count, accepting only 8, 12 or 20
    pub fn from_count(rounds: u32) -> Result<Self> {
        validate::parameter(
            matches!(rounds, 8 | 12 | 20),
            "rounds",
            "must be 8, 12 or 20",
        )?;
        Ok(match rounds {
            8 => Rounds::R8,
            12 => Rounds::R12,
            _ => Rounds::R20,
        })
    }

    /// Total number of rounds
    pub fn count(self) -> u32 {
        self as u32
    }

    /// Column/diagonal double-round iterations per block
    pub(crate) fn double_rounds(self) -> usize {
        self as usize / 2
    }
}

/// Seekable ChaCha keystream generator
///
/// Each stream owns its cipher state and a lookahead buffer sized to the
/// batch of the block generator bound at construction (64, 256 or 512
/// bytes). A stream is a single logical cursor into the keystream; it is
/// `Send` but not internally synchronized, so concurrent use requires one
/// stream per thread (seeked to disjoint counter ranges by the caller).
///
/// All state is zeroized on drop; [`ChaChaStream::wipe`] zeroizes eagerly.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ChaChaStream {
    /// Cipher state: constants, key, counter, nonce
    state: [u32; 16],
    /// Lookahead buffer; only the bound backend's batch size is used
    buffer: [u8; MAX_BATCH_SIZE],
    /// Start of the unconsumed region of `buffer`
    offset: usize,
    /// End of the unconsumed region of `buffer`
    end: usize,
    /// Configured round count
    #[zeroize(skip)]
    rounds: Rounds,
    /// Block generator bound at construction
    #[zeroize(skip)]
    backend: Backend,
}

impl ChaChaStream {
    /// Creates a new keystream generator with the specified key, iv and rounds
    ///
    /// The first 8 bytes of `iv` seed the block counter (little-endian) and
    /// are normally zero; the rest is the nonce.
    pub fn new(key: &[u8; CHACHA_KEY_SIZE], iv: &[u8; CHACHA_IV_SIZE], rounds: Rounds) -> Self {
        // Wrap key in SecretBuffer for secure handling
        let key_buf = SecretBuffer::new(*key);
        Self::new_secure(&key_buf, iv, rounds)
    }

    /// Creates a keystream generator from unsized slices, validating lengths
    /// and the round count
    pub fn from_slices(key: &[u8], iv: &[u8], rounds: u32) -> Result<Self> {
        validate::length("ChaCha key", key.len(), CHACHA_KEY_SIZE)?;
        validate::length("ChaCha iv", iv.len(), CHACHA_IV_SIZE)?;
        let rounds = Rounds::from_count(rounds)?;

        let mut key_arr = [0u8; CHACHA_KEY_SIZE];
        key_arr.copy_from_slice(key);
        let key_buf = SecretBuffer::new(key_arr);
        key_arr.zeroize();

        let mut iv_arr = [0u8; CHACHA_IV_SIZE];
        iv_arr.copy_from_slice(iv);
        Ok(Self::new_secure(&key_buf, &iv_arr, rounds))
    }

    /// Internal constructor that works with SecretBuffer for key handling
    fn new_secure(
        key: &SecretBuffer<CHACHA_KEY_SIZE>,
        iv: &[u8; CHACHA_IV_SIZE],
        rounds: Rounds,
    ) -> Self {
        let mut state = [0u32; 16];
        state[..4].copy_from_slice(&STATE_CONSTANTS);

        // Key (8 words)
        let key_bytes = key.as_ref();
        for i in 0..8 {
            state[4 + i] = LittleEndian::read_u32(&key_bytes[i * 4..]);
        }

        // Counter (2 words) and nonce (2 words)
        for i in 0..4 {
            state[12 + i] = LittleEndian::read_u32(&iv[i * 4..]);
        }

        Self {
            state,
            buffer: [0; MAX_BATCH_SIZE],
            offset: 0,
            end: 0,
            rounds,
            backend: Backend::detect(),
        }
    }

    /// Fills `out` with the next keystream bytes
    ///
    /// The request is served from buffered lookahead first, then whole
    /// generator batches directly into `out`, then one final batch into the
    /// lookahead buffer for a sub-batch tail. Either the whole buffer is
    /// filled or an error is returned and nothing is consumed; the only
    /// failure is use after [`ChaChaStream::wipe`].
    pub fn generate(&mut self, out: &mut [u8]) -> Result<()> {
        if self.state[..4] != STATE_CONSTANTS[..] {
            return Err(Error::Processing {
                operation: "generate",
                details: "context has been wiped",
            });
        }

        let batch = self.backend.batch_size();
        let mut pos = 0;

        // Deliver stored bytes first, strict FIFO
        if self.offset < self.end {
            let n = (self.end - self.offset).min(out.len());
            out[..n].copy_from_slice(&self.buffer[self.offset..self.offset + n]);
            self.offset += n;
            if self.offset == self.end {
                self.offset = 0;
                self.end = 0;
            }
            pos = n;
        }
        if pos == out.len() {
            return Ok(());
        }

        // Whole batches bypass the lookahead buffer entirely
        let remaining = out.len() - pos;
        let direct = remaining - remaining % batch;
        if direct > 0 {
            let written = self
                .backend
                .generate(&mut self.state, self.rounds, &mut out[pos..pos + direct]);
            debug_assert_eq!(written, direct);
            pos += direct;
        }

        // Sub-batch tail: refill the lookahead and hand out a prefix
        if pos < out.len() {
            let written = self
                .backend
                .generate(&mut self.state, self.rounds, &mut self.buffer[..batch]);
            debug_assert_eq!(written, batch);
            let n = out.len() - pos;
            out[pos..].copy_from_slice(&self.buffer[..n]);
            self.offset = n;
            self.end = batch;
        }
        Ok(())
    }

    /// Moves the stream by a signed number of 64-byte blocks
    ///
    /// The delta applies to the block counter directly and any buffered
    /// lookahead bytes are discarded, so this is intended for use at batch
    /// boundaries (as the worker-partition pattern does). The counter wraps
    /// at 2^64 blocks; avoiding keystream reuse across a wrap is the
    /// caller's responsibility.
    pub fn seek_blocks(&mut self, delta: i64) {
        let counter = block_counter(&self.state).wrapping_add(delta as u64);
        self.set_counter(counter);
    }

    /// Repositions the stream to an absolute 64-byte block index
    ///
    /// Discards buffered lookahead like [`ChaChaStream::seek_blocks`]. Does
    /// not re-key: worker `k` of `W` can seek to `k * chunk_blocks`, read a
    /// chunk, then seek forward by `W * chunk_blocks`, all on one key.
    pub fn seek_to_block(&mut self, block: u64) {
        self.set_counter(block);
    }

    /// Block counter value: the index of the next block the bound generator
    /// will produce. Buffered lookahead bytes were drawn from blocks before
    /// this index.
    pub fn block_position(&self) -> u64 {
        block_counter(&self.state)
    }

    fn set_counter(&mut self, counter: u64) {
        self.state[12] = counter as u32;
        self.state[13] = (counter >> 32) as u32;
        // Stale keystream must not survive a reposition
        self.buffer.zeroize();
        self.offset = 0;
        self.end = 0;
    }

    /// Zeroizes all key material, cipher state and buffered keystream
    ///
    /// The context is unusable afterward; further `generate` calls return
    /// an error. Dropping the stream wipes it as well, so this is only
    /// needed to shorten the lifetime of the secrets.
    pub fn wipe(&mut self) {
        self.zeroize();
    }

    /// Rebind the block generator, for cross-backend comparison in tests.
    #[cfg(test)]
    pub(crate) fn rebind(&mut self, backend: Backend) {
        self.backend = backend;
        self.offset = 0;
        self.end = 0;
    }
}

/// One-shot keystream generation: initialize, fill `out`, wipe
///
/// Equivalent to creating a [`ChaChaStream`], calling
/// [`generate`](ChaChaStream::generate) once and wiping the context.
pub fn generate_once(
    out: &mut [u8],
    key: &[u8; CHACHA_KEY_SIZE],
    iv: &[u8; CHACHA_IV_SIZE],
    rounds: Rounds,
) -> Result<()> {
    let mut ctx = ChaChaStream::new(key, iv, rounds);
    let result = ctx.generate(out);
    ctx.wipe();
    result
}

#[cfg(test)]
mod tests;
