//! cvault-storage: OpenDAL object store client

pub mod blob;
pub mod credentials;
pub mod health;
pub mod operator;

pub use blob::{BlobStore, ObjectStore, StoredObject};
pub use credentials::S3Credentials;
pub use health::check_health;
pub use operator::{build_operator, memory_operator, StorageConfig};
