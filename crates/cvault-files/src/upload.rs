use std::path::PathBuf;

use cvault_core::VaultResult;

/// Fallback when the uploader did not supply a MIME type
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone)]
pub enum UploadSource {
    Bytes(Vec<u8>),
    /// Read in full when the file's turn in the batch comes up
    Path(PathBuf),
}

/// One document handed to `save_files`
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub source: UploadSource,
}

impl UploadFile {
    pub fn from_bytes(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            source: UploadSource::Bytes(bytes),
        }
    }

    pub fn from_path(
        name: impl Into<String>,
        content_type: impl Into<String>,
        path: PathBuf,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            source: UploadSource::Path(path),
        }
    }

    pub fn effective_content_type(&self) -> &str {
        match self.content_type.trim() {
            "" => DEFAULT_CONTENT_TYPE,
            ct => ct,
        }
    }

    pub(crate) async fn read_all(self) -> VaultResult<Vec<u8>> {
        match self.source {
            UploadSource::Bytes(bytes) => Ok(bytes),
            UploadSource::Path(path) => Ok(tokio::fs::read(&path).await?),
        }
    }
}
