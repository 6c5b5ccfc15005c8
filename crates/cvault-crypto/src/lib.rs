//! cvault-crypto: per-file encryption for stored clinical documents
//!
//! Every file gets its own random AES-256 key and CBC IV:
//! ```text
//! plaintext ──AES-256-CBC(key, iv) + PKCS#7──▶ ciphertext ──▶ object store
//!                 │
//!                 └── key, iv ──▶ metadata record
//! ```
//!
//! The codec gives confidentiality only. There is no MAC over the ciphertext,
//! so modification is detected only when it happens to break the padding.

pub mod codec;
pub mod keys;

pub use codec::{decrypt, encrypt};
pub use keys::{generate, generate_from, KeyMaterial};

pub use cvault_core::types::{IV_SIZE, KEY_SIZE};

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;
