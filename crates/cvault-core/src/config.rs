use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level service configuration (loaded from cvault.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub metadata: MetadataConfig,
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket holding all ciphertext objects
    pub bucket: String,
    /// Key prefix inside the bucket
    pub root: String,
    /// Enforce HTTPS for S3 connections (warn/error on HTTP endpoints)
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// JSON record file
    pub path: PathBuf,
    /// Owners allowed on new records (empty = not checked)
    pub known_owners: Vec<String>,
    /// Patients allowed on new records (empty = not checked)
    pub known_patients: Vec<i64>,
}

/// File lifecycle tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Upper bound on waiting for the store to confirm a delete
    pub confirm_timeout_ms: u64,
    /// First delay between absence probes
    pub poll_initial_ms: u64,
    /// Cap on the doubling probe delay
    pub poll_max_ms: u64,
    /// Files processed at once within one batch (1 = sequential)
    pub concurrency: usize,
}

impl LifecycleConfig {
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    pub fn poll_initial(&self) -> Duration {
        Duration::from_millis(self.poll_initial_ms)
    }

    pub fn poll_max(&self) -> Duration {
        Duration::from_millis(self.poll_max_ms.max(self.poll_initial_ms))
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_format: "text".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "clinvault".into(),
            root: "/".into(),
            enforce_tls: false,
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.local/share/cvault/records.json"),
            known_owners: Vec::new(),
            known_patients: Vec::new(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            confirm_timeout_ms: 10_000,
            poll_initial_ms: 200,
            poll_max_ms: 2_000,
            concurrency: 1,
        }
    }
}
