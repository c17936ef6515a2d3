//! Upload assembly engine.
//!
//! Chunks are persisted independently under the upload's temporary
//! namespace and the session registry counts the bytes actually written.
//! When the last index arrives the chunks are concatenated, in ascending
//! index order, into the final artifact. The merge runs under the session's
//! assembly lock so it happens exactly once per upload.

use crate::error::UploadError;
use crate::locks::SessionLocks;
use crate::metrics::{
    ASSEMBLY_DURATION, BYTES_UPLOADED, CHUNK_UPLOAD_DURATION, CHUNKS_UPLOADED,
    UPLOAD_SESSIONS_ABORTED, UPLOAD_SESSIONS_COMPLETED, UPLOAD_SESSIONS_CREATED,
};
use futures::StreamExt;
use parcel_core::catalog::normalize_name;
use parcel_core::config::ServerConfig;
use parcel_core::{ChunkReceipt, SessionId, StorageKey, UploadSession, UploadStatus};
use parcel_metadata::models::UploadSessionRow;
use parcel_metadata::{MetadataError, MetadataStore};
use parcel_storage::{ByteStream, ChunkStore, ObjectStore, StorageError, StreamingUpload};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

/// Error code recorded on sessions cancelled by the client.
pub const ABORTED_ERROR_CODE: &str = "aborted";

type EngineResult<T> = std::result::Result<T, UploadError>;

/// A freshly created upload and the chunk size contract for it.
#[derive(Clone, Debug)]
pub struct InitiatedUpload {
    pub session: UploadSession,
    pub chunk_size: u64,
}

/// A session together with the chunk indices persisted so far.
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    pub session: UploadSession,
    /// Ascending.
    pub received_chunks: Vec<u32>,
}

/// Where the assembled artifact of a completed upload lives.
#[derive(Clone, Debug)]
pub struct ArtifactLocation {
    pub session: UploadSession,
    pub object_key: String,
}

/// An open read of an assembled artifact.
pub struct ArtifactStream {
    pub location: ArtifactLocation,
    pub size: u64,
    pub body: ByteStream,
}

/// Orchestrates chunk ingestion, assembly and cleanup.
pub struct AssemblyEngine {
    metadata: Arc<dyn MetadataStore>,
    chunks: ChunkStore,
    locks: SessionLocks,
    chunk_size: u64,
    max_chunk_size: u64,
}

impl AssemblyEngine {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn ObjectStore>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            metadata,
            chunks: ChunkStore::new(storage),
            locks: SessionLocks::new(),
            chunk_size: config.chunk_size,
            max_chunk_size: config.max_chunk_size,
        }
    }

    /// Temporary chunk storage used by this engine.
    pub fn chunks(&self) -> &ChunkStore {
        &self.chunks
    }

    /// Assembly locks currently held or awaited.
    pub fn locks(&self) -> &SessionLocks {
        &self.locks
    }

    /// Create a pending session for `original_name`.
    #[instrument(skip(self))]
    pub async fn initiate_upload(
        &self,
        original_name: &str,
        declared_size: u64,
    ) -> EngineResult<InitiatedUpload> {
        let name = normalize_name(original_name, "filename")?;
        let session = UploadSession::new(&name, declared_size, self.chunk_size)?;
        let row = UploadSessionRow::from_session(&session)
            .map_err(|e| UploadError::InvalidInput(e.to_string()))?;
        self.metadata.create_session(&row).await?;

        UPLOAD_SESSIONS_CREATED.inc();
        info!(
            upload_id = %session.id,
            storage_key = %session.storage_key,
            declared_size,
            "upload initiated"
        );

        Ok(InitiatedUpload {
            session,
            chunk_size: self.chunk_size,
        })
    }

    /// Load a session, failing with `NotFound` if the registry has no record.
    pub async fn load_session(&self, id: SessionId) -> EngineResult<UploadSession> {
        let row = self
            .metadata
            .get_session(*id.as_uuid())
            .await?
            .ok_or_else(|| UploadError::NotFound(format!("upload {id}")))?;
        Ok(row.into_session()?)
    }

    /// Session state plus the indices persisted so far.
    pub async fn session(&self, id: SessionId) -> EngineResult<SessionSnapshot> {
        let session = self.load_session(id).await?;
        let received_chunks = self
            .metadata
            .get_received_chunks(*id.as_uuid())
            .await?
            .into_iter()
            .map(|row| {
                u32::try_from(row.chunk_index).map_err(|_| {
                    MetadataError::Internal(format!("chunk index {} out of range", row.chunk_index))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SessionSnapshot {
            session,
            received_chunks,
        })
    }

    /// Persist one chunk and, for the last index, assemble the artifact.
    #[instrument(skip(self, payload), fields(upload_id = %id, chunk_index = index))]
    pub async fn ingest_chunk(
        &self,
        id: SessionId,
        index: u32,
        total_chunks: u32,
        payload: ByteStream,
    ) -> EngineResult<ChunkReceipt> {
        if total_chunks == 0 {
            return Err(UploadError::InvalidInput(
                "total_chunks must be at least 1".to_string(),
            ));
        }
        if index >= total_chunks {
            return Err(UploadError::InvalidInput(format!(
                "chunk_index {index} out of range for {total_chunks} chunks"
            )));
        }

        let session = self.load_session(id).await?;
        if session.status.is_terminal() {
            return Err(UploadError::InvalidState(format!(
                "upload {id} is {}",
                session.status
            )));
        }
        let key = session.storage_key;

        let recorded = self
            .metadata
            .pin_total_chunks(*id.as_uuid(), total_chunks)
            .await?
            .ok_or_else(|| UploadError::NotFound(format!("upload {id}")))?;
        if recorded != total_chunks {
            return Err(UploadError::InvalidInput(format!(
                "total_chunks {total_chunks} does not match the {recorded} chunks recorded for upload {id}"
            )));
        }

        let started = Instant::now();
        let stored = match self
            .chunks
            .put(&key, index, payload, self.max_chunk_size)
            .await
        {
            Ok(size) => size,
            Err(StorageError::PayloadTooLarge { limit }) => {
                return Err(UploadError::InvalidInput(format!(
                    "chunk {index} exceeds the maximum chunk size of {limit} bytes"
                )));
            }
            Err(e) => return Err(e.into()),
        };
        CHUNK_UPLOAD_DURATION.observe(started.elapsed().as_secs_f64());

        let advanced = self
            .metadata
            .advance_session(*id.as_uuid(), index, stored, OffsetDateTime::now_utc())
            .await?;
        let Some(row) = advanced else {
            self.chunks.remove(&key, index).await;
            return Err(UploadError::NotFound(format!("upload {id}")));
        };
        let session = row.into_session()?;

        match session.status {
            UploadStatus::Completed => {
                // Lost the race against the merge; the artifact already exists
                // and finalize recorded its size.
                self.chunks.remove(&key, index).await;
                return Ok(ChunkReceipt::completed());
            }
            UploadStatus::Failed => {
                self.chunks.remove(&key, index).await;
                return Err(UploadError::InvalidState(format!("upload {id} is failed")));
            }
            UploadStatus::Pending | UploadStatus::Uploading => {}
        }

        CHUNKS_UPLOADED.inc();
        BYTES_UPLOADED.inc_by(stored);
        debug!(
            stored,
            received_bytes = session.received_bytes,
            "chunk recorded"
        );

        if index + 1 == total_chunks {
            return self.assemble(id, total_chunks).await;
        }

        Ok(ChunkReceipt {
            complete: false,
            progress: session.progress_percent(),
        })
    }

    /// Merge all chunks into the final artifact, at most once per session.
    #[instrument(skip(self), fields(upload_id = %id))]
    async fn assemble(&self, id: SessionId, total_chunks: u32) -> EngineResult<ChunkReceipt> {
        let _guard = self.locks.lock(id).await;

        let session = self.load_session(id).await?;
        match session.status {
            UploadStatus::Completed => return Ok(ChunkReceipt::completed()),
            UploadStatus::Failed => {
                return Err(UploadError::InvalidState(format!("upload {id} is failed")));
            }
            UploadStatus::Pending | UploadStatus::Uploading => {}
        }

        let key = &session.storage_key;
        let missing = self.chunks.missing(key, total_chunks).await?;
        if !missing.is_empty() {
            debug!(?missing, "assembly deferred");
            return Err(UploadError::IncompleteUpload { missing });
        }

        let started = Instant::now();
        let size = self.merge(key, total_chunks).await?;

        if let Err(e) = self
            .metadata
            .finalize_session(*id.as_uuid(), size, OffsetDateTime::now_utc())
            .await
        {
            self.discard_artifact(key).await;
            return Err(state_conflict(e));
        }
        ASSEMBLY_DURATION.observe(started.elapsed().as_secs_f64());
        UPLOAD_SESSIONS_COMPLETED.inc();

        let removed = self.chunks.purge(key).await;
        info!(storage_key = %key, size, total_chunks, removed, "upload assembled");

        Ok(ChunkReceipt::completed())
    }

    /// Concatenate chunks `0..total_chunks` into the artifact object.
    ///
    /// Nothing is visible under the artifact key unless every chunk was
    /// appended.
    async fn merge(&self, key: &StorageKey, total_chunks: u32) -> EngineResult<u64> {
        let store = self.chunks.object_store();
        let mut upload = store.put_stream(&key.artifact_object_key()).await?;

        match self.append_chunks(upload.as_mut(), key, total_chunks).await {
            Ok(()) => Ok(upload.finish().await?),
            Err(e) => {
                if let Err(abort_err) = upload.abort().await {
                    warn!(storage_key = %key, error = %abort_err, "failed to abort artifact write");
                }
                Err(e)
            }
        }
    }

    async fn append_chunks(
        &self,
        upload: &mut dyn StreamingUpload,
        key: &StorageKey,
        total_chunks: u32,
    ) -> EngineResult<()> {
        for index in 0..total_chunks {
            let mut chunk = match self.chunks.read(key, index).await {
                Ok(stream) => stream,
                Err(StorageError::NotFound(_)) => {
                    let missing = self.chunks.missing(key, total_chunks).await?;
                    return Err(UploadError::IncompleteUpload {
                        missing: if missing.is_empty() {
                            vec![index]
                        } else {
                            missing
                        },
                    });
                }
                Err(e) => return Err(e.into()),
            };

            while let Some(bytes) = chunk.next().await {
                upload.write(bytes?).await?;
            }
        }
        Ok(())
    }

    async fn discard_artifact(&self, key: &StorageKey) {
        match self
            .chunks
            .object_store()
            .delete(&key.artifact_object_key())
            .await
        {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(e) => warn!(storage_key = %key, error = %e, "failed to discard artifact"),
        }
    }

    /// Locate the assembled artifact. Only completed uploads have one.
    pub async fn artifact(&self, id: SessionId) -> EngineResult<ArtifactLocation> {
        let session = self.load_session(id).await?;
        if session.status != UploadStatus::Completed {
            return Err(UploadError::NotFound(format!(
                "upload {id} has no assembled artifact ({})",
                session.status
            )));
        }
        let object_key = session.storage_key.artifact_object_key();
        Ok(ArtifactLocation {
            session,
            object_key,
        })
    }

    /// Open the assembled artifact for streaming.
    pub async fn open_artifact(&self, id: SessionId) -> EngineResult<ArtifactStream> {
        let location = self.artifact(id).await?;
        let store = self.chunks.object_store();
        let meta = store.head(&location.object_key).await?;
        let body = store.get_stream(&location.object_key).await?;
        Ok(ArtifactStream {
            location,
            size: meta.size,
            body,
        })
    }

    /// Cancel an upload: mark it failed and drop its temporary chunks.
    ///
    /// Aborting an already failed upload is a no-op; a completed upload
    /// cannot be aborted.
    #[instrument(skip(self), fields(upload_id = %id))]
    pub async fn abort_upload(&self, id: SessionId) -> EngineResult<UploadSession> {
        let _guard = self.locks.lock(id).await;

        let session = self.load_session(id).await?;
        match session.status {
            UploadStatus::Completed => {
                return Err(UploadError::InvalidState(format!(
                    "upload {id} is already completed"
                )));
            }
            UploadStatus::Failed => return Ok(session),
            UploadStatus::Pending | UploadStatus::Uploading => {}
        }

        let row = self
            .metadata
            .fail_session(
                *id.as_uuid(),
                ABORTED_ERROR_CODE,
                Some("upload aborted by client"),
                OffsetDateTime::now_utc(),
            )
            .await
            .map_err(state_conflict)?;
        let removed = self.chunks.purge(&session.storage_key).await;

        UPLOAD_SESSIONS_ABORTED.inc();
        info!(removed, "upload aborted");
        Ok(row.into_session()?)
    }

    /// Remove an upload entirely: artifact, temporary chunks and record.
    #[instrument(skip(self), fields(upload_id = %id))]
    pub async fn delete_upload(&self, id: SessionId) -> EngineResult<()> {
        let _guard = self.locks.lock(id).await;

        let session = self.load_session(id).await?;
        let key = &session.storage_key;
        match self
            .chunks
            .object_store()
            .delete(&key.artifact_object_key())
            .await
        {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.chunks.purge(key).await;
        self.metadata.delete_session(*id.as_uuid()).await?;

        info!(storage_key = %key, "upload deleted");
        Ok(())
    }
}

fn state_conflict(err: MetadataError) -> UploadError {
    match err {
        MetadataError::InvalidStateTransition { from, to } => {
            UploadError::InvalidState(format!("cannot move upload from {from} to {to}"))
        }
        MetadataError::NotFound(what) => UploadError::NotFound(what),
        other => UploadError::Metadata(other),
    }
}
