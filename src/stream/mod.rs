//! Stream cipher keystream generators

// Make the chacha module public
pub mod chacha;

// Re-export for convenience
pub use chacha::ChaChaStream;
