//! Caller-facing operations
//!
//! Identity is resolved upstream; these entry points only check that one was
//! supplied and use it as the owner for every call.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use cvault_core::{FileFilter, FileRecord, VaultError, VaultResult};
use cvault_meta::MetadataStore;
use cvault_storage::ObjectStore;
use serde::Serialize;

use crate::lifecycle::{DownloadedFile, FileManager};
use crate::upload::UploadFile;

/// Authenticated caller, as resolved by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub user_id: String,
}

impl Requester {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// A record as shown to callers: no key material, plus the display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub id: String,
    pub filename: String,
    pub storage_key: String,
    pub owner_id: String,
    pub patient_id: i64,
    pub event_id: Option<String>,
    pub uploaded_at: u64,
    pub content_type: String,
}

impl From<&FileRecord> for FileSummary {
    fn from(r: &FileRecord) -> Self {
        Self {
            id: r.id.clone(),
            filename: r.display_name(),
            storage_key: r.storage_key.clone(),
            owner_id: r.owner_id.clone(),
            patient_id: r.patient_id,
            event_id: r.event_id.clone(),
            uploaded_at: r.uploaded_at,
            content_type: r.content_type.clone(),
        }
    }
}

/// Download result in the shape the UI consumes:
/// `{"success": true, "plaintextBase64", "contentType", "filename"}` or
/// `{"success": false, "error"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plaintext_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadResponse {
    pub fn ok(file: DownloadedFile) -> Self {
        Self {
            success: true,
            plaintext_base64: Some(STANDARD.encode(&file.plaintext)),
            content_type: Some(file.content_type),
            filename: Some(file.filename),
            error: None,
        }
    }

    pub fn failed(error: &VaultError) -> Self {
        Self {
            success: false,
            plaintext_base64: None,
            content_type: None,
            filename: None,
            error: Some(error.to_string()),
        }
    }
}

impl From<VaultResult<DownloadedFile>> for DownloadResponse {
    fn from(result: VaultResult<DownloadedFile>) -> Self {
        match result {
            Ok(file) => Self::ok(file),
            Err(e) => Self::failed(&e),
        }
    }
}

pub struct FileService<S, M> {
    manager: FileManager<S, M>,
}

fn require(requester: Option<&Requester>) -> VaultResult<&Requester> {
    requester.ok_or(VaultError::AuthenticationMissing)
}

impl<S: ObjectStore, M: MetadataStore> FileService<S, M> {
    pub fn new(manager: FileManager<S, M>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &FileManager<S, M> {
        &self.manager
    }

    pub async fn save_files(
        &self,
        requester: Option<&Requester>,
        files: Vec<UploadFile>,
        event_id: Option<&str>,
        patient_id: i64,
    ) -> VaultResult<Vec<FileRecord>> {
        let who = require(requester)?;
        Ok(self
            .manager
            .save_files(files, &who.user_id, patient_id, event_id)
            .await)
    }

    /// Files owned by the requester
    pub async fn get_files(&self, requester: Option<&Requester>) -> VaultResult<Vec<FileSummary>> {
        let who = require(requester)?;
        self.list(FileFilter::ByOwner(who.user_id.clone())).await
    }

    pub async fn get_files_by_event(
        &self,
        requester: Option<&Requester>,
        event_id: &str,
    ) -> VaultResult<Vec<FileSummary>> {
        require(requester)?;
        self.list(FileFilter::ByEvent(event_id.to_string())).await
    }

    pub async fn get_files_by_patient(
        &self,
        requester: Option<&Requester>,
        patient_id: i64,
    ) -> VaultResult<Vec<FileSummary>> {
        require(requester)?;
        self.list(FileFilter::ByPatient(patient_id)).await
    }

    async fn list(&self, filter: FileFilter) -> VaultResult<Vec<FileSummary>> {
        let records = self.manager.fetch_files(&filter).await?;
        Ok(records.iter().map(FileSummary::from).collect())
    }

    pub async fn delete_files(
        &self,
        requester: Option<&Requester>,
        ids: &[String],
    ) -> VaultResult<Vec<String>> {
        let who = require(requester)?;
        Ok(self.manager.delete_files(ids, &who.user_id).await)
    }

    pub async fn download_file(&self, requester: Option<&Requester>, id: &str) -> DownloadResponse {
        match require(requester) {
            Ok(who) => self.manager.download_file(id, &who.user_id).await.into(),
            Err(e) => DownloadResponse::failed(&e),
        }
    }
}
