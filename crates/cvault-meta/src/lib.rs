//! cvault-meta: persistence of `FileRecord` rows
//!
//! The relational store behind the service is an external collaborator; this
//! crate defines the narrow contract the lifecycle manager needs and ships
//! two adapters:
//!   - **memory**: `HashMap` behind a `tokio::sync::RwLock`, for tests and
//!     embedding.
//!   - **json**: the same map mirrored to a JSON file, rewritten atomically
//!     (temp + rename) after every mutation.

pub mod json;
pub mod memory;
pub mod store;

pub use json::JsonMetadataStore;
pub use memory::MemoryMetadataStore;
pub use store::{MetadataStore, ReferenceCheck};
