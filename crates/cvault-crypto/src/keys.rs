//! Per-file key material generation

use cvault_core::{VaultError, VaultResult};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{IV_SIZE, KEY_SIZE};

/// A fresh AES-256 key and CBC IV for one file. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    key: [u8; KEY_SIZE],
    iv: [u8; IV_SIZE],
}

impl KeyMaterial {
    pub fn from_parts(key: [u8; KEY_SIZE], iv: [u8; IV_SIZE]) -> Self {
        Self { key, iv }
    }

    pub fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key", &"[REDACTED]")
            .field("iv", &"[REDACTED]")
            .finish()
    }
}

/// Draw a key and IV from the operating system CSPRNG.
pub fn generate() -> VaultResult<KeyMaterial> {
    generate_from(&mut OsRng)
}

/// Draw a key and IV from `rng`.
///
/// Returns `RandomnessUnavailable` if the source reports an error; no
/// partially-filled material is ever returned.
pub fn generate_from<R: RngCore + ?Sized>(rng: &mut R) -> VaultResult<KeyMaterial> {
    let mut material = KeyMaterial {
        key: [0u8; KEY_SIZE],
        iv: [0u8; IV_SIZE],
    };
    rng.try_fill_bytes(&mut material.key)
        .map_err(|e| VaultError::RandomnessUnavailable(e.to_string()))?;
    rng.try_fill_bytes(&mut material.iv)
        .map_err(|e| VaultError::RandomnessUnavailable(e.to_string()))?;
    Ok(material)
}
