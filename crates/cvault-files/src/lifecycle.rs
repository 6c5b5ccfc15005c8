//! File lifecycle manager
//!
//! Ordering rules:
//!   - save: the object write completes before the metadata row is created,
//!     so a row never points at a missing object. A crash in between leaves
//!     an orphaned ciphertext object, which is harmless.
//!   - save never overwrites an object a live record points at: a storage key
//!     already held by a record, or repeated within one batch, fails that file
//!     with `Conflict` before anything is written.
//!   - delete: the object is removed and its absence confirmed before the
//!     row is removed, so a listed-as-deleted file cannot still be
//!     downloaded through a stale row.

use std::collections::HashSet;

use cvault_core::config::LifecycleConfig;
use cvault_core::{FileFilter, FileRecord, NewFileRecord, StorageKey, VaultError, VaultResult};
use cvault_crypto::KeyMaterial;
use cvault_meta::MetadataStore;
use cvault_storage::ObjectStore;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::batch::{BatchFailure, BatchReport, DeleteStage, SaveStage};
use crate::upload::UploadFile;

/// Decrypted file ready to hand back to the requester
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub plaintext: Vec<u8>,
    pub content_type: String,
    pub filename: String,
}

/// Source of per-file key material
pub type KeySource = fn() -> VaultResult<KeyMaterial>;

pub struct FileManager<S, M> {
    objects: S,
    metadata: M,
    config: LifecycleConfig,
    keys: KeySource,
}

impl<S: ObjectStore, M: MetadataStore> FileManager<S, M> {
    pub fn new(objects: S, metadata: M, config: LifecycleConfig) -> Self {
        Self {
            objects,
            metadata,
            config,
            keys: cvault_crypto::generate,
        }
    }

    /// Replace the OS CSPRNG as the key source.
    pub fn with_key_source(mut self, keys: KeySource) -> Self {
        self.keys = keys;
        self
    }

    pub fn objects(&self) -> &S {
        &self.objects
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    fn concurrency(&self) -> usize {
        self.config.concurrency.max(1)
    }

    // ── save ──────────────────────────────────────────────────────────────

    /// Encrypt and store each file, returning the records that fully
    /// succeeded in input order.
    pub async fn save_files(
        &self,
        files: Vec<UploadFile>,
        owner_id: &str,
        patient_id: i64,
        event_id: Option<&str>,
    ) -> Vec<FileRecord> {
        self.save_files_report(files, owner_id, patient_id, event_id)
            .await
            .succeeded
    }

    /// Like [`save_files`](Self::save_files), but also reports each failed
    /// file with the stage it failed in.
    pub async fn save_files_report(
        &self,
        files: Vec<UploadFile>,
        owner_id: &str,
        patient_id: i64,
        event_id: Option<&str>,
    ) -> BatchReport<FileRecord, SaveStage> {
        let total = files.len();

        // A storage key is used once per batch; later repeats fail.
        let mut seen = HashSet::new();
        let jobs: Vec<(UploadFile, bool)> = files
            .into_iter()
            .map(|file| {
                let repeated = StorageKey::new(patient_id, event_id, &file.name)
                    .map(|key| !seen.insert(key.to_string()))
                    .unwrap_or(false);
                (file, repeated)
            })
            .collect();

        let report: BatchReport<_, _> = stream::iter(jobs)
            .map(|(file, repeated)| self.save_one(file, repeated, owner_id, patient_id, event_id))
            .buffered(self.concurrency())
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect();

        info!(
            owner = owner_id,
            patient = patient_id,
            event = event_id.unwrap_or(""),
            total,
            saved = report.succeeded.len(),
            failed = report.failed.len(),
            "save batch finished"
        );
        report
    }

    async fn save_one(
        &self,
        file: UploadFile,
        repeated: bool,
        owner_id: &str,
        patient_id: i64,
        event_id: Option<&str>,
    ) -> Result<FileRecord, BatchFailure<SaveStage>> {
        let name = file.name.clone();
        let fail = |stage: SaveStage, error: VaultError| {
            warn!(file = %name, %stage, "save failed: {error}");
            BatchFailure {
                item: name.clone(),
                stage,
                error,
            }
        };

        let storage_key = StorageKey::new(patient_id, event_id, &file.name)
            .map_err(|e| fail(SaveStage::Requested, e))?
            .to_string();
        if repeated {
            return Err(fail(
                SaveStage::Requested,
                VaultError::Conflict(format!("{storage_key} appears more than once in the batch")),
            ));
        }
        let holders = self
            .metadata
            .find(&FileFilter::ByStorageKey(storage_key.clone()))
            .await
            .map_err(|e| fail(SaveStage::Requested, e))?;
        if let Some(existing) = holders.first() {
            return Err(fail(
                SaveStage::Requested,
                VaultError::Conflict(format!(
                    "{storage_key} already belongs to record {}",
                    existing.id
                )),
            ));
        }

        let content_type = file.effective_content_type().to_string();
        let plaintext = file
            .read_all()
            .await
            .map_err(|e| fail(SaveStage::Requested, e))?;

        let material = (self.keys)().map_err(|e| fail(SaveStage::Encrypting, e))?;
        let ciphertext = cvault_crypto::encrypt(&plaintext, material.key(), material.iv())
            .map_err(|e| fail(SaveStage::Encrypting, e))?;
        drop(plaintext);

        self.objects
            .put(&storage_key, ciphertext, &content_type)
            .await
            .map_err(|e| fail(SaveStage::Uploading, e))?;

        let record = self
            .metadata
            .create(NewFileRecord {
                storage_key: storage_key.clone(),
                owner_id: owner_id.to_string(),
                patient_id,
                event_id: event_id.map(str::to_string),
                encryption_key: *material.key(),
                encryption_iv: *material.iv(),
                content_type,
            })
            .await
            .map_err(|e| {
                debug!(key = %storage_key, "ciphertext left without a record");
                fail(SaveStage::Uploading, e)
            })?;

        info!(
            id = %record.id,
            key = %record.storage_key,
            stage = %SaveStage::Persisted,
            "file saved"
        );
        Ok(record)
    }

    // ── fetch ─────────────────────────────────────────────────────────────

    /// Metadata only; no ciphertext is read.
    pub async fn fetch_files(&self, filter: &FileFilter) -> VaultResult<Vec<FileRecord>> {
        self.metadata.find(filter).await
    }

    // ── download ──────────────────────────────────────────────────────────

    pub async fn download_file(
        &self,
        file_id: &str,
        requester_id: &str,
    ) -> VaultResult<DownloadedFile> {
        let record = self
            .metadata
            .get(file_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("file {file_id}")))?;

        if record.owner_id != requester_id {
            warn!(id = file_id, requester = requester_id, "download refused: not owner");
            return Err(VaultError::Unauthorized(format!(
                "file {file_id} is not owned by the requester"
            )));
        }

        let object = self.objects.get(&record.storage_key).await?;
        let plaintext =
            cvault_crypto::decrypt(&object.body, &record.encryption_key, &record.encryption_iv)
                .inspect_err(|e| warn!(id = file_id, key = %record.storage_key, "{e}"))?;

        debug!(id = file_id, bytes = plaintext.len(), "file decrypted");
        Ok(DownloadedFile {
            plaintext,
            content_type: record.content_type.clone(),
            filename: record.display_name(),
        })
    }

    // ── delete ────────────────────────────────────────────────────────────

    /// Delete the given records, returning the ids that were fully removed.
    /// Ids the requester does not own, or that do not exist, are left out.
    pub async fn delete_files(&self, ids: &[String], requester_id: &str) -> Vec<String> {
        self.delete_files_report(ids, requester_id).await.succeeded
    }

    pub async fn delete_files_report(
        &self,
        ids: &[String],
        requester_id: &str,
    ) -> BatchReport<String, DeleteStage> {
        let report: BatchReport<_, _> = stream::iter(ids)
            .map(|id| self.delete_one(id, requester_id))
            .buffered(self.concurrency())
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect();

        info!(
            requester = requester_id,
            total = ids.len(),
            deleted = report.succeeded.len(),
            failed = report.failed.len(),
            "delete batch finished"
        );
        report
    }

    async fn delete_one(
        &self,
        id: &str,
        requester_id: &str,
    ) -> Result<String, BatchFailure<DeleteStage>> {
        let fail = |stage: DeleteStage, error: VaultError| BatchFailure {
            item: id.to_string(),
            stage,
            error,
        };

        let record = match self.metadata.get(id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(id, "delete skipped: no such record");
                return Err(fail(
                    DeleteStage::Persisted,
                    VaultError::NotFound(format!("file {id}")),
                ));
            }
            Err(e) => {
                warn!(id, "delete failed: record lookup: {e}");
                return Err(fail(DeleteStage::Persisted, e));
            }
        };

        if record.owner_id != requester_id {
            debug!(id, requester = requester_id, "delete skipped: not owner");
            return Err(fail(
                DeleteStage::Persisted,
                VaultError::Unauthorized(format!("file {id} is not owned by the requester")),
            ));
        }

        let key = record.storage_key.as_str();
        if let Err(e) = self.objects.delete(key).await {
            warn!(id, key, stage = %DeleteStage::ObjectDeleting, "delete failed: {e}");
            return Err(fail(DeleteStage::ObjectDeleting, e));
        }
        if let Err(e) = self
            .objects
            .wait_until_absent(key, self.config.confirm_timeout())
            .await
        {
            warn!(id, key, stage = %DeleteStage::ObjectDeleting, "delete failed: {e}");
            return Err(fail(DeleteStage::ObjectDeleting, e));
        }

        match self.metadata.delete(id).await {
            Ok(true) => {}
            Ok(false) => debug!(id, "record already gone"),
            Err(e) => {
                warn!(id, key, stage = %DeleteStage::ObjectConfirmedAbsent, "delete failed: {e}");
                return Err(fail(DeleteStage::ObjectConfirmedAbsent, e));
            }
        }

        info!(id, key, stage = %DeleteStage::MetadataDeleted, "file deleted");
        Ok(id.to_string())
    }
}
