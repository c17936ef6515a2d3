//! Temporary chunk payload storage.
//!
//! Each upload owns the namespace `temp/<storage_key>/`. A chunk payload is
//! one object per index, written atomically, so a re-sent index replaces
//! the earlier payload and a failed write leaves no partial chunk behind.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectStore};
use futures::StreamExt;
use parcel_core::StorageKey;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Chunk payload store backed by an [`ObjectStore`].
#[derive(Clone)]
pub struct ChunkStore {
    store: Arc<dyn ObjectStore>,
}

impl ChunkStore {
    /// Create a chunk store over `store`.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// The underlying object store.
    pub fn object_store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Persist a chunk payload, replacing any earlier payload for the index.
    ///
    /// Returns the number of bytes written. A payload larger than
    /// `max_bytes`, or any error from `payload` or the store, aborts the
    /// write and leaves the previous payload (if any) untouched.
    #[instrument(skip(self, payload), fields(storage_key = %key, chunk_index = index))]
    pub async fn put(
        &self,
        key: &StorageKey,
        index: u32,
        mut payload: ByteStream,
        max_bytes: u64,
    ) -> StorageResult<u64> {
        let mut upload = self.store.put_stream(&key.chunk_object_key(index)).await?;

        while let Some(next) = payload.next().await {
            let written = match next {
                Ok(bytes) if upload.bytes_written() + bytes.len() as u64 > max_bytes => {
                    Err(StorageError::PayloadTooLarge { limit: max_bytes })
                }
                Ok(bytes) => upload.write(bytes).await,
                Err(e) => Err(e),
            };

            if let Err(e) = written {
                if let Err(abort_err) = upload.abort().await {
                    warn!(error = %abort_err, "failed to abort chunk write");
                }
                return Err(e);
            }
        }

        let size = upload.finish().await?;
        debug!(size, "chunk stored");
        Ok(size)
    }

    /// Open a chunk payload for reading.
    pub async fn read(&self, key: &StorageKey, index: u32) -> StorageResult<ByteStream> {
        self.store.get_stream(&key.chunk_object_key(index)).await
    }

    /// Check whether a payload exists for the index.
    pub async fn exists(&self, key: &StorageKey, index: u32) -> StorageResult<bool> {
        self.store.exists(&key.chunk_object_key(index)).await
    }

    /// Indices in `0..total_chunks` that have no payload, ascending.
    pub async fn missing(&self, key: &StorageKey, total_chunks: u32) -> StorageResult<Vec<u32>> {
        let mut missing = Vec::new();
        for index in 0..total_chunks {
            if !self.exists(key, index).await? {
                missing.push(index);
            }
        }
        Ok(missing)
    }

    /// Remove one chunk payload. Failures are logged, never returned.
    pub async fn remove(&self, key: &StorageKey, index: u32) {
        match self.store.delete(&key.chunk_object_key(index)).await {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(e) => {
                warn!(storage_key = %key, chunk_index = index, error = %e, "failed to remove chunk");
            }
        }
    }

    /// Remove every payload in the upload's namespace, whatever its index.
    ///
    /// Returns the number of payloads removed.
    #[instrument(skip(self), fields(storage_key = %key))]
    pub async fn purge(&self, key: &StorageKey) -> usize {
        let keys = match self.store.list(&key.chunk_prefix()).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "failed to list chunks for purge");
                return 0;
            }
        };

        let mut removed = 0;
        for object_key in keys {
            match self.store.delete(&object_key).await {
                Ok(()) => removed += 1,
                Err(StorageError::NotFound(_)) => {}
                Err(e) => warn!(key = %object_key, error = %e, "failed to remove chunk"),
            }
        }
        removed
    }
}
