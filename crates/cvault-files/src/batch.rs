//! Per-item states and partial batch results

use std::fmt;

use cvault_core::VaultError;

/// Save path: `Requested → Encrypting → Uploading → Persisted`.
///
/// A failed file reports the state it was in: `Uploading` covers both the
/// object write and the metadata write that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStage {
    Requested,
    Encrypting,
    Uploading,
    Persisted,
}

/// Delete path: `Persisted → ObjectDeleting → ObjectConfirmedAbsent → MetadataDeleted`.
///
/// `Persisted` on a failure means the id never got past lookup and ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStage {
    Persisted,
    ObjectDeleting,
    ObjectConfirmedAbsent,
    MetadataDeleted,
}

impl fmt::Display for SaveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SaveStage::Requested => "requested",
            SaveStage::Encrypting => "encrypting",
            SaveStage::Uploading => "uploading",
            SaveStage::Persisted => "persisted",
        })
    }
}

impl fmt::Display for DeleteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeleteStage::Persisted => "persisted",
            DeleteStage::ObjectDeleting => "object-deleting",
            DeleteStage::ObjectConfirmedAbsent => "object-confirmed-absent",
            DeleteStage::MetadataDeleted => "metadata-deleted",
        })
    }
}

/// One item that did not complete
#[derive(Debug)]
pub struct BatchFailure<S> {
    /// File name for saves, record id for deletes
    pub item: String,
    pub stage: S,
    pub error: VaultError,
}

/// Outcome of a best-effort batch. `succeeded` keeps input order.
#[derive(Debug)]
pub struct BatchReport<T, S> {
    pub succeeded: Vec<T>,
    pub failed: Vec<BatchFailure<S>>,
}

impl<T, S> Default for BatchReport<T, S> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T, S> BatchReport<T, S> {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl<T, S> FromIterator<Result<T, BatchFailure<S>>> for BatchReport<T, S> {
    fn from_iter<I: IntoIterator<Item = Result<T, BatchFailure<S>>>>(iter: I) -> Self {
        let mut report = Self::default();
        for outcome in iter {
            match outcome {
                Ok(item) => report.succeeded.push(item),
                Err(failure) => report.failed.push(failure),
            }
        }
        report
    }
}
