//! OpenDAL Operator factory for the ciphertext bucket

use anyhow::{Context, Result};
use opendal::Operator;
use secrecy::ExposeSecret;

use crate::credentials::S3Credentials;

/// Minimal config needed to build an operator
/// (full config lives in cvault-core's StorageConfig)
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub root: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Build an OpenDAL Operator for S3 or any S3-compatible endpoint.
///
/// Path-style addressing (the opendal default) keeps MinIO and similar
/// self-hosted stores working.
pub fn build_operator(cfg: &StorageConfig) -> Result<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .root(&cfg.root)
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(&cfg.secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// Build an operator from cvault-core config + loaded credentials.
///
/// If `enforce_tls` is true and the endpoint uses HTTP, this returns an error.
/// Otherwise, a warning is logged for non-HTTPS endpoints.
pub fn build_from_core_config(
    storage: &cvault_core::config::StorageConfig,
    creds: &S3Credentials,
) -> Result<Operator> {
    if storage.endpoint.starts_with("http://") {
        if storage.enforce_tls {
            anyhow::bail!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                storage.endpoint
            );
        }
        tracing::warn!(
            endpoint = %storage.endpoint,
            "S3 endpoint uses plaintext HTTP; credentials and ciphertext travel unencrypted"
        );
    }

    build_operator(&StorageConfig {
        endpoint: storage.endpoint.clone(),
        region: storage.region.clone(),
        bucket: storage.bucket.clone(),
        root: storage.root.clone(),
        access_key_id: creds.access_key_id.clone(),
        secret_access_key: creds.secret_access_key.expose_secret().to_string(),
    })
}

/// In-process operator for tests and dry runs
pub fn memory_operator() -> Result<Operator> {
    Ok(Operator::new(opendal::services::Memory::default())
        .context("creating OpenDAL memory operator")?
        .finish())
}
