//! Upload session registry.

use crate::error::MetadataResult;
use crate::models::{UploadChunkRow, UploadSessionRow};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for upload session operations.
///
/// Every mutation of a single session is atomic. Status only moves forward:
/// `pending -> uploading -> completed | failed`.
#[async_trait]
pub trait UploadRepo: Send + Sync {
    /// Create a new upload session.
    async fn create_session(&self, session: &UploadSessionRow) -> MetadataResult<()>;

    /// Get an upload session by ID.
    async fn get_session(&self, upload_id: Uuid) -> MetadataResult<Option<UploadSessionRow>>;

    /// Fix the session's chunk count on first use and return the recorded one.
    ///
    /// The first call stores `total_chunks`; later calls leave the stored
    /// value untouched, so a caller detects a mismatch by comparing. Returns
    /// None if the session doesn't exist.
    async fn pin_total_chunks(
        &self,
        upload_id: Uuid,
        total_chunks: u32,
    ) -> MetadataResult<Option<u32>>;

    /// Record a persisted chunk and advance the session's byte counter.
    ///
    /// The size recorded for `chunk_index` replaces any earlier size for the
    /// same index, and `received_bytes` becomes the sum over all indices, so
    /// re-sending a chunk never double counts. A non-terminal session moves
    /// to `uploading`.
    ///
    /// Returns None if the session doesn't exist. A terminal session is
    /// returned unchanged; callers must check its state.
    async fn advance_session(
        &self,
        upload_id: Uuid,
        chunk_index: u32,
        size_bytes: u64,
        received_at: OffsetDateTime,
    ) -> MetadataResult<Option<UploadSessionRow>>;

    /// Mark a session completed with `assembled_bytes` as its final byte count.
    ///
    /// The count replaces `received_bytes`, so chunks whose bookkeeping
    /// arrives after assembly are still reflected. Idempotent for an already completed session. Fails with
    /// `InvalidStateTransition` for a failed session and `NotFound` for an
    /// unknown one.
    async fn finalize_session(
        &self,
        upload_id: Uuid,
        assembled_bytes: u64,
        completed_at: OffsetDateTime,
    ) -> MetadataResult<UploadSessionRow>;

    /// Fail a session with error details.
    ///
    /// Idempotent for an already failed session. Fails with
    /// `InvalidStateTransition` for a completed session.
    async fn fail_session(
        &self,
        upload_id: Uuid,
        error_code: &str,
        error_detail: Option<&str>,
        failed_at: OffsetDateTime,
    ) -> MetadataResult<UploadSessionRow>;

    /// Get the chunks recorded for an upload, ordered by index.
    async fn get_received_chunks(&self, upload_id: Uuid) -> MetadataResult<Vec<UploadChunkRow>>;

    /// Delete a session together with its chunk records and tag links.
    async fn delete_session(&self, upload_id: Uuid) -> MetadataResult<()>;
}
