use std::time::Duration;

use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("authentication missing: no requester identity")]
    AuthenticationMissing,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The object key is already taken by a live record.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("randomness unavailable: {0}")]
    RandomnessUnavailable(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Ciphertext exists but cannot be decrypted (corrupted or wrong key).
    /// Never used for a missing object.
    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("object store error: {0}")]
    ObjectStoreTransport(String),

    #[error("deletion of {key} not confirmed after {waited:?}")]
    ConfirmationTimeout { key: String, waited: Duration },

    #[error("metadata store error: {0}")]
    Metadata(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VaultError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, VaultError::NotFound(_))
    }
}
