//! Seekable ChaCha keystream generator
//!
//! This crate produces the raw ChaCha keystream: given a 256-bit key and a
//! 128-bit iv (a 64-bit little-endian block counter followed by a 64-bit
//! nonce) it generates an arbitrarily long, byte-exact pseudorandom stream
//! suitable for encryption or as a fast random source. The library is
//! designed to be usable in both `std` and `no_std` environments.
//!
//! # Security Features
//!
//! Sensitive material is protected throughout:
//!
//! - Secure memory handling with automatic zeroization
//! - Key material confined to explicit-acquire/explicit-wipe boundaries
//! - Intermediate block state cleared after every block
//!
//! # Performance
//!
//! At construction each stream binds the fastest block generator the host
//! CPU supports (AVX2 eight-block, SSSE3 four-block, portable scalar) and
//! keeps that binding for its lifetime. All backends are bit-for-bit
//! interchangeable.
//!
//! # Example
//!
//! ```
//! use chastream::{ChaChaStream, Rounds};
//!
//! let key = [0x42u8; 32];
//! let iv = [0u8; 16];
//! let mut stream = ChaChaStream::new(&key, &iv, Rounds::R20);
//!
//! let mut out = [0u8; 1024];
//! stream.generate(&mut out).unwrap();
//!
//! // Random access: jump to block 1000 without generating the bytes between
//! stream.seek_to_block(1000);
//! stream.generate(&mut out).unwrap();
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]

// Error module and re-exports
pub mod error;
pub use error::{validate, Error, Result};

// Secure memory handling
pub mod security;
pub use security::{EphemeralSecret, SecretBuffer};

// Stream cipher keystream generators
pub mod stream;
pub use stream::chacha::{
    generate_once, ChaChaStream, Rounds, CHACHA_BLOCK_SIZE, CHACHA_IV_SIZE, CHACHA_KEY_SIZE,
};
