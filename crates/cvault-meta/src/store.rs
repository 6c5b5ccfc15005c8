use std::collections::{HashMap, HashSet};
use std::future::Future;

use cvault_core::config::MetadataConfig;
use cvault_core::{FileFilter, FileRecord, NewFileRecord, VaultError, VaultResult};

/// Create/read/delete/query contract for file metadata.
///
/// No update operation: records are immutable once created.
pub trait MetadataStore: Send + Sync {
    /// Persist a new record, assigning its `id` and `uploaded_at`.
    fn create(&self, new: NewFileRecord) -> impl Future<Output = VaultResult<FileRecord>> + Send;

    fn get(&self, id: &str) -> impl Future<Output = VaultResult<Option<FileRecord>>> + Send;

    /// Remove a record. Returns false if no record had that id.
    fn delete(&self, id: &str) -> impl Future<Output = VaultResult<bool>> + Send;

    /// Records matching `filter`, oldest first.
    fn find(&self, filter: &FileFilter)
        -> impl Future<Output = VaultResult<Vec<FileRecord>>> + Send;
}

/// Referential checks applied at creation time.
///
/// A `None` set means the adapter does not know that table and accepts any
/// reference.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCheck {
    pub owners: Option<HashSet<String>>,
    pub patients: Option<HashSet<i64>>,
}

impl ReferenceCheck {
    pub fn from_config(cfg: &MetadataConfig) -> Self {
        Self {
            owners: (!cfg.known_owners.is_empty())
                .then(|| cfg.known_owners.iter().cloned().collect()),
            patients: (!cfg.known_patients.is_empty())
                .then(|| cfg.known_patients.iter().copied().collect()),
        }
    }

    pub fn validate(&self, new: &NewFileRecord) -> VaultResult<()> {
        if new.storage_key.is_empty() {
            return Err(VaultError::InvalidInput("storage key is empty".into()));
        }
        if new.owner_id.is_empty() {
            return Err(VaultError::InvalidInput("owner id is empty".into()));
        }
        if let Some(owners) = &self.owners {
            if !owners.contains(&new.owner_id) {
                return Err(VaultError::Metadata(format!(
                    "unknown owner {}",
                    new.owner_id
                )));
            }
        }
        if let Some(patients) = &self.patients {
            if !patients.contains(&new.patient_id) {
                return Err(VaultError::Metadata(format!(
                    "unknown patient {}",
                    new.patient_id
                )));
            }
        }
        Ok(())
    }
}

/// Creation order: sequence, then upload time and id for records written
/// before sequences existed.
pub(crate) fn sort_records(records: &mut [FileRecord]) {
    records.sort_by(|a, b| {
        a.sequence
            .cmp(&b.sequence)
            .then_with(|| a.uploaded_at.cmp(&b.uploaded_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// One past the highest sequence currently held.
pub(crate) fn next_sequence(records: &HashMap<String, FileRecord>) -> u64 {
    records.values().map(|r| r.sequence).max().unwrap_or(0) + 1
}

/// A storage key maps to at most one live record.
pub(crate) fn ensure_key_free(
    records: &HashMap<String, FileRecord>,
    storage_key: &str,
) -> VaultResult<()> {
    match records.values().find(|r| r.storage_key == storage_key) {
        Some(existing) => Err(VaultError::Conflict(format!(
            "storage key {storage_key} already belongs to record {}",
            existing.id
        ))),
        None => Ok(()),
    }
}
