//! Application state shared across handlers.

use crate::engine::AssemblyEngine;
use crate::progress::ProgressTracker;
use parcel_core::config::AppConfig;
use parcel_metadata::MetadataStore;
use parcel_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage backend.
    pub storage: Arc<dyn ObjectStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Chunk ingestion and assembly.
    pub engine: Arc<AssemblyEngine>,
    /// Progress queries.
    pub progress: ProgressTracker,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let engine = AssemblyEngine::new(metadata.clone(), storage.clone(), &config.server);
        let progress = ProgressTracker::new(metadata.clone());

        Self {
            config: Arc::new(config),
            storage,
            metadata,
            engine: Arc::new(engine),
            progress,
        }
    }
}
