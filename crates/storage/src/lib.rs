//! Object storage abstraction and the chunk store for parcel.
//!
//! This crate provides:
//! - An object store trait with atomic writes and streaming uploads
//! - A local filesystem backend with path-traversal protection
//! - The chunk store holding temporary chunk payloads per upload

pub mod backends;
pub mod chunks;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use chunks::ChunkStore;
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload};

use parcel_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config {
        StorageConfig::Filesystem { path } => {
            if path.as_os_str().is_empty() {
                return Err(StorageError::Config(
                    "filesystem storage path must not be empty".to_string(),
                ));
            }
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}
