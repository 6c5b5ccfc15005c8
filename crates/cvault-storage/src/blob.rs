//! Flat key/value blob access for ciphertext objects
//!
//! `ObjectStore` is the seam the lifecycle manager depends on; `BlobStore` is
//! the OpenDAL-backed implementation. Remote deletes are only eventually
//! consistent, so callers that must not observe a deleted object fence on
//! [`ObjectStore::wait_until_absent`] before dropping the metadata that
//! points at it.

use std::future::Future;
use std::time::Duration;

use cvault_core::{VaultError, VaultResult};
use opendal::{ErrorKind, Operator};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Object body plus the content type the store reported for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

pub trait ObjectStore: Send + Sync {
    /// Write `body` under `key`, replacing any existing object.
    fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> impl Future<Output = VaultResult<()>> + Send;

    /// Read the object at `key`; `NotFound` if it does not resolve.
    fn get(&self, key: &str) -> impl Future<Output = VaultResult<StoredObject>> + Send;

    /// Remove the object at `key`. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = VaultResult<()>> + Send;

    fn exists(&self, key: &str) -> impl Future<Output = VaultResult<bool>> + Send;

    /// Block until `key` no longer resolves, or fail with
    /// `ConfirmationTimeout` once `max_wait` has elapsed.
    fn wait_until_absent(
        &self,
        key: &str,
        max_wait: Duration,
    ) -> impl Future<Output = VaultResult<()>> + Send;
}

/// Probe delays for [`BlobStore::wait_until_absent`]: start at `initial`,
/// double after each probe, never exceed `max`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(200),
            max: Duration::from_secs(2),
        }
    }
}

#[derive(Clone)]
pub struct BlobStore {
    op: Operator,
    backoff: Backoff,
}

impl BlobStore {
    pub fn new(op: Operator) -> Self {
        Self {
            op,
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.backoff = Backoff {
            initial,
            max: max.max(initial),
        };
        self
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    async fn poll_until_absent(&self, key: &str) {
        let mut delay = self.backoff.initial;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.exists(key).await {
                Ok(false) => {
                    debug!(key, attempt, "absence confirmed");
                    return;
                }
                Ok(true) => debug!(key, attempt, ?delay, "object still visible"),
                Err(e) => warn!(key, attempt, "absence probe failed: {e}"),
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.backoff.max);
        }
    }
}

impl ObjectStore for BlobStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> VaultResult<()> {
        let len = body.len();
        let result = if self.op.info().full_capability().write_with_content_type {
            self.op
                .write_with(key, body)
                .content_type(content_type)
                .await
        } else {
            self.op.write(key, body).await
        };
        result.map_err(|e| map_opendal(key, e))?;
        debug!(key, bytes = len, content_type, "object written");
        Ok(())
    }

    async fn get(&self, key: &str) -> VaultResult<StoredObject> {
        let body = self.op.read(key).await.map_err(|e| map_opendal(key, e))?;
        let content_type = match self.op.stat(key).await {
            Ok(meta) => meta.content_type().map(str::to_string),
            Err(e) => {
                debug!(key, "stat after read failed: {e}");
                None
            }
        };
        Ok(StoredObject {
            body: body.to_vec(),
            content_type,
        })
    }

    async fn delete(&self, key: &str) -> VaultResult<()> {
        match self.op.delete(key).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(map_opendal(key, e)),
        }
    }

    async fn exists(&self, key: &str) -> VaultResult<bool> {
        self.op.exists(key).await.map_err(|e| map_opendal(key, e))
    }

    async fn wait_until_absent(&self, key: &str, max_wait: Duration) -> VaultResult<()> {
        let started = Instant::now();
        // Timeout polls the inner future first, so a zero budget still gets
        // one probe.
        match tokio::time::timeout(max_wait, self.poll_until_absent(key)).await {
            Ok(()) => Ok(()),
            Err(_) => {
                let waited = started.elapsed();
                warn!(key, ?waited, "object still visible after delete");
                Err(VaultError::ConfirmationTimeout {
                    key: key.to_string(),
                    waited,
                })
            }
        }
    }
}

fn map_opendal(key: &str, err: opendal::Error) -> VaultError {
    if err.kind() == ErrorKind::NotFound {
        VaultError::NotFound(format!("object {key}"))
    } else {
        VaultError::ObjectStoreTransport(format!("{key}: {err}"))
    }
}
