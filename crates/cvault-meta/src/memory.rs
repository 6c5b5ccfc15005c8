use std::collections::HashMap;

use cvault_core::types::unix_now;
use cvault_core::{FileFilter, FileRecord, NewFileRecord, VaultResult};
use tokio::sync::RwLock;

use crate::store::{ensure_key_free, next_sequence, sort_records, MetadataStore, ReferenceCheck};

#[derive(Default)]
pub struct MemoryMetadataStore {
    records: RwLock<HashMap<String, FileRecord>>,
    refs: ReferenceCheck,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_references(refs: ReferenceCheck) -> Self {
        Self {
            records: RwLock::default(),
            refs,
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl MetadataStore for MemoryMetadataStore {
    async fn create(&self, new: NewFileRecord) -> VaultResult<FileRecord> {
        self.refs.validate(&new)?;
        let mut records = self.records.write().await;
        ensure_key_free(&records, &new.storage_key)?;

        let sequence = next_sequence(&records);
        let record = new.into_record(uuid::Uuid::new_v4().to_string(), sequence, unix_now());
        records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, id: &str) -> VaultResult<Option<FileRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> VaultResult<bool> {
        Ok(self.records.write().await.remove(id).is_some())
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
