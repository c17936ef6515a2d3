//! Server test utilities.

use futures::StreamExt;
use parcel_core::config::{AppConfig, MetadataConfig, ServerConfig, StorageConfig};
use parcel_metadata::{MetadataStore, SqliteStore};
use parcel_server::{AppState, AssemblyEngine, create_router};
use parcel_storage::{FilesystemBackend, ObjectStore};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Chunk size used by test servers (the configurable minimum, 64 KiB).
#[allow(dead_code)]
pub const TEST_CHUNK_SIZE: u64 = parcel_core::MIN_CHUNK_SIZE;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub storage_path: PathBuf,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig {
            server: ServerConfig {
                chunk_size: TEST_CHUNK_SIZE,
                max_chunk_size: 4 * TEST_CHUNK_SIZE,
                ..ServerConfig::default()
            },
            storage: StorageConfig::Filesystem {
                path: storage_path.clone(),
            },
            metadata: MetadataConfig::Sqlite {
                path: db_path,
                query_timeout_secs: None,
            },
        };

        modifier(&mut config);

        let state = AppState::new(config, storage, metadata);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            storage_path,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Get access to the assembly engine.
    pub fn engine(&self) -> Arc<AssemblyEngine> {
        self.state.engine.clone()
    }

    /// Read a whole object from storage.
    pub async fn read_object(&self, key: &str) -> Vec<u8> {
        let mut stream = self
            .state
            .storage
            .get_stream(key)
            .await
            .expect("Failed to open object");
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.expect("Failed to read object"));
        }
        out
    }

    /// Keys currently stored under `prefix`.
    pub async fn list_objects(&self, prefix: &str) -> Vec<String> {
        self.state
            .storage
            .list(prefix)
            .await
            .expect("Failed to list objects")
    }
}
