//! cvault-files: lifecycle of encrypted clinical documents
//!
//! Save: read → generate key material → encrypt → upload → record metadata.
//! Delete: delete object → wait until the store stops serving it → delete
//! metadata. Batches are best-effort: a failing item is logged and left out of
//! the result without affecting its siblings.

pub mod api;
pub mod batch;
pub mod lifecycle;
pub mod upload;

pub use api::{DownloadResponse, FileService, FileSummary, Requester};
pub use batch::{BatchFailure, BatchReport, DeleteStage, SaveStage};
pub use lifecycle::{DownloadedFile, FileManager, KeySource};
pub use upload::{UploadFile, UploadSource};
