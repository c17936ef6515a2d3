//! Metadata store abstraction and the SQLite implementation for parcel.
//!
//! This crate provides the durable control-plane state:
//! - The upload session registry with per-chunk size bookkeeping
//! - The file catalog (listing, rename)
//! - Tags and file-tag associations

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use repos::{CatalogRepo, TagRepo, UploadRepo};
pub use store::{MetadataStore, SqliteStore};

use parcel_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            if path.as_os_str().is_empty() {
                return Err(MetadataError::Config(
                    "sqlite path must not be empty".to_string(),
                ));
            }
            let store = SqliteStore::new(path, *query_timeout_secs).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
