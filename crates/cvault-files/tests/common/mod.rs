//! Shared fixtures: an in-memory object store that can be told to misbehave
//! for specific keys.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cvault_core::config::LifecycleConfig;
use cvault_core::{VaultError, VaultResult};
use cvault_meta::MemoryMetadataStore;
use cvault_storage::{memory_operator, BlobStore, ObjectStore, StoredObject};
use cvault_files::FileManager;

#[derive(Default)]
struct Faults {
    fail_put: HashSet<String>,
    fail_delete: HashSet<String>,
    /// delete reports success but the object keeps resolving
    ignore_delete: HashSet<String>,
}

#[derive(Clone)]
pub struct FlakyStore {
    inner: BlobStore,
    faults: Arc<Mutex<Faults>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        let inner = BlobStore::new(memory_operator().expect("memory operator"))
            .with_backoff(Duration::from_millis(5), Duration::from_millis(20));
        Self {
            inner,
            faults: Arc::default(),
        }
    }

    pub fn inner(&self) -> &BlobStore {
        &self.inner
    }

    pub fn fail_put(&self, key: &str) {
        self.faults.lock().unwrap().fail_put.insert(key.to_string());
    }

    pub fn fail_delete(&self, key: &str) {
        self.faults.lock().unwrap().fail_delete.insert(key.to_string());
    }

    pub fn ignore_delete(&self, key: &str) {
        self.faults.lock().unwrap().ignore_delete.insert(key.to_string());
    }
}

impl ObjectStore for FlakyStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> VaultResult<()> {
        let fail = self.faults.lock().unwrap().fail_put.contains(key);
        if fail {
            return Err(VaultError::ObjectStoreTransport(format!("injected put failure: {key}")));
        }
        self.inner.put(key, body, content_type).await
    }

    async fn get(&self, key: &str) -> VaultResult<StoredObject> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> VaultResult<()> {
        let (fail, ignore) = {
            let faults = self.faults.lock().unwrap();
            (
                faults.fail_delete.contains(key),
                faults.ignore_delete.contains(key),
            )
        };
        if fail {
            return Err(VaultError::ObjectStoreTransport(format!(
                "injected delete failure: {key}"
            )));
        }
        if ignore {
            return Ok(());
        }
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> VaultResult<bool> {
        self.inner.exists(key).await
    }

    async fn wait_until_absent(&self, key: &str, max_wait: Duration) -> VaultResult<()> {
        self.inner.wait_until_absent(key, max_wait).await
    }
}

/// Short confirmation timeout so ghost-delete tests finish quickly.
pub fn fast_config() -> LifecycleConfig {
    LifecycleConfig {
        confirm_timeout_ms: 150,
        poll_initial_ms: 5,
        poll_max_ms: 20,
        concurrency: 1,
    }
}

pub fn flaky_manager() -> (FileManager<FlakyStore, MemoryMetadataStore>, FlakyStore) {
    let store = FlakyStore::new();
    let manager = FileManager::new(store.clone(), MemoryMetadataStore::new(), fast_config());
    (manager, store)
}
