//! JSON-file metadata adapter
//!
//! The whole table lives in memory and is rewritten to disk after every
//! create/delete (write temp file, then rename). A failed write rolls the
//! in-memory change back, so a caller never sees a record that is not on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use cvault_core::types::unix_now;
use cvault_core::{FileFilter, FileRecord, NewFileRecord, VaultError, VaultResult};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::store::{ensure_key_free, next_sequence, sort_records, MetadataStore, ReferenceCheck};

pub struct JsonMetadataStore {
    path: PathBuf,
    records: RwLock<HashMap<String, FileRecord>>,
    refs: ReferenceCheck,
}

impl JsonMetadataStore {
    /// Load or create a record file at `path`.
    /// If the file doesn't exist, starts empty; it is created on first write.
    pub async fn open(path: &Path, refs: ReferenceCheck) -> VaultResult<Self> {
        let records = if tokio::fs::try_exists(path).await? {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading record file: {}", path.display()))?;
            let list: Vec<FileRecord> = serde_json::from_str(&content)
                .with_context(|| format!("parsing record file: {}", path.display()))?;
            list.into_iter().map(|r| (r.id.clone(), r)).collect()
        } else {
            HashMap::new()
        };

        debug!(path = %path.display(), records = records.len(), "record file loaded");

        Ok(Self {
            path: path.to_path_buf(),
            records: RwLock::new(records),
            refs,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &HashMap<String, FileRecord>) -> VaultResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating record dir: {}", parent.display()))?;
            }
        }

        let mut list: Vec<FileRecord> = records.values().cloned().collect();
        sort_records(&mut list);
        let json = serde_json::to_vec_pretty(&list)
            .map_err(|e| VaultError::Metadata(format!("serializing records: {e}")))?;

        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .with_context(|| format!("writing record file temp: {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("renaming record file: {}", self.path.display()))?;
        Ok(())
    }
}

impl MetadataStore for JsonMetadataStore {
    async fn create(&self, new: NewFileRecord) -> VaultResult<FileRecord> {
        self.refs.validate(&new)?;
        let mut records = self.records.write().await;
        ensure_key_free(&records, &new.storage_key)?;

        let sequence = next_sequence(&records);
        let record = new.into_record(uuid::Uuid::new_v4().to_string(), sequence, unix_now());
        records.insert(record.id.clone(), record.clone());
        if let Err(e) = self.persist(&records).await {
            records.remove(&record.id);
            warn!(id = %record.id, "record not persisted: {e}");
            return Err(e);
        }
        Ok(record)
    }

    async fn get(&self, id: &str) -> VaultResult<Option<FileRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> VaultResult<bool> {
        let mut records = self.records.write().await;
        let Some(removed) = records.remove(id) else {
            return Ok(false);
        };
        if let Err(e) = self.persist(&records).await {
            records.insert(removed.id.clone(), removed);
            warn!(id, "record deletion not persisted: {e}");
            return Err(e);
        }
        Ok(true)
    }

    async fn find(&self, filter: &FileFilter) -> VaultResult<Vec<FileRecord>> {
        let mut found: Vec<FileRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        sort_records(&mut found);
        Ok(found)
    }
}
