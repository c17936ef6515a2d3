//! Upload session types and lifecycle.

use crate::storage_key::StorageKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for an upload session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidSessionId(format!("{s}: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upload session status.
///
/// Transitions are monotonic: `pending -> uploading -> completed | failed`.
/// Nothing leaves a terminal status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Session created, no chunk persisted yet.
    Pending,
    /// At least one chunk persisted.
    Uploading,
    /// Every chunk was merged into the final artifact.
    Completed,
    /// Session was aborted and will accept no more chunks.
    Failed,
}

impl UploadStatus {
    /// Check if the session can still receive chunks.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Uploading)
    }

    /// Check if the session reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Persistent string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for UploadStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "uploading" => Ok(Self::Uploading),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(crate::Error::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An upload session tracking the lifecycle of one chunked upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadSession {
    /// Client-facing session identifier.
    pub id: SessionId,
    /// Filename supplied by the client. Display only, never a path.
    pub original_name: String,
    /// Internal name of the artifact and chunk namespace.
    pub storage_key: StorageKey,
    /// Size the client announced. Only used as the progress denominator.
    pub declared_size: u64,
    /// Bytes actually persisted, counting each chunk index once.
    pub received_bytes: u64,
    /// Chunk size handed to the client at initiation.
    pub chunk_size: u64,
    /// Current status.
    pub status: UploadStatus,
    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the session was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// When assembly finished.
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub completed_at: Option<OffsetDateTime>,
    /// Machine-readable reason for a failed session.
    #[serde(default)]
    pub error_code: Option<String>,
    /// Human-readable detail for a failed session.
    #[serde(default)]
    pub error_detail: Option<String>,
}

impl UploadSession {
    /// Create a new pending session.
    ///
    /// Rejects an empty or whitespace-only `original_name`.
    pub fn new(original_name: &str, declared_size: u64, chunk_size: u64) -> crate::Result<Self> {
        if original_name.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "filename must not be empty".to_string(),
            ));
        }

        let now = OffsetDateTime::now_utc();
        Ok(Self {
            id: SessionId::new(),
            original_name: original_name.to_string(),
            storage_key: StorageKey::generate(original_name),
            declared_size,
            received_bytes: 0,
            chunk_size,
            status: UploadStatus::Pending,
            created_at: now,
            updated_at: now,
            completed_at: None,
            error_code: None,
            error_detail: None,
        })
    }

    /// Percentage of the declared size that has been persisted.
    ///
    /// A completed session always reports 100. Otherwise the value is
    /// `floor(received * 100 / declared)` clamped to `0..=100`, and 0 when
    /// nothing was declared.
    pub fn progress_percent(&self) -> u8 {
        if self.status == UploadStatus::Completed {
            return 100;
        }
        progress_percent(self.received_bytes, self.declared_size)
    }

    /// Number of chunks the client is expected to send at this chunk size.
    pub fn expected_chunk_count(&self) -> u64 {
        if self.chunk_size == 0 {
            return 0;
        }
        self.declared_size.div_ceil(self.chunk_size)
    }
}

/// Integer progress for `received` out of `declared` bytes.
pub fn progress_percent(received: u64, declared: u64) -> u8 {
    if declared == 0 {
        return 0;
    }
    let percent = u128::from(received) * 100 / u128::from(declared);
    // Clamped to 100 above, so the narrowing cannot truncate.
    percent.min(100) as u8
}

/// Outcome of ingesting a single chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkReceipt {
    /// Whether the upload is now assembled.
    pub complete: bool,
    /// Progress after this chunk, 0 to 100.
    pub progress: u8,
}

impl ChunkReceipt {
    /// Receipt for a session whose artifact has been assembled.
    pub fn completed() -> Self {
        Self {
            complete: true,
            progress: 100,
        }
    }
}

/// Read-side view of an upload's progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
    /// Percentage 0 to 100, or [`crate::UNKNOWN_PROGRESS`] for unknown sessions.
    pub progress: i32,
    /// Session status, absent for unknown sessions.
    pub status: Option<UploadStatus>,
}

impl ProgressReport {
    /// Report for a session the registry does not know.
    pub fn unknown() -> Self {
        Self {
            progress: crate::UNKNOWN_PROGRESS,
            status: None,
        }
    }

    /// Report for a known session.
    pub fn of(session: &UploadSession) -> Self {
        Self {
            progress: i32::from(session.progress_percent()),
            status: Some(session.status),
        }
    }
}

/// Request to initiate an upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateUploadRequest {
    /// Original filename.
    pub filename: String,
    /// Total file size in bytes.
    pub file_size: u64,
}

/// Response from initiating an upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateUploadResponse {
    /// The upload session ID.
    pub upload_id: String,
    /// Internal storage key assigned to the upload.
    pub storage_key: String,
    /// Chunk size the client should split the file into.
    pub chunk_size: u64,
}

/// Response from querying upload state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadStateResponse {
    /// The upload session ID.
    pub upload_id: String,
    /// Original filename.
    pub filename: String,
    /// Current status.
    pub status: UploadStatus,
    /// Declared file size.
    pub file_size: u64,
    /// Bytes persisted so far.
    pub received_bytes: u64,
    /// Progress percentage.
    pub progress: u8,
    /// Chunk size contract for this upload.
    pub chunk_size: u64,
    /// Indices of the chunks persisted so far, ascending.
    pub received_chunks: Vec<u32>,
    /// Failure reason, if the upload was aborted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response from uploading a chunk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkUploadResponse {
    /// Index of the chunk that was stored.
    pub chunk_index: u32,
    /// Whether the upload is now assembled.
    pub complete: bool,
    /// Progress after this chunk.
    pub progress: u8,
}

/// Query parameters accompanying a chunk upload.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ChunkUploadParams {
    /// Total number of chunks the client will send.
    pub total_chunks: u32,
}

/// Information about a persisted chunk.
#[derive(Clone, Debug)]
pub struct ReceivedChunk {
    /// Position in the upload (0-indexed).
    pub index: u32,
    /// Size in bytes of the latest payload for this index.
    pub size: u64,
    /// When the latest payload was received.
    pub received_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_roundtrip() {
        let id = SessionId::new();
        let as_str = id.to_string();
        let parsed = SessionId::parse(&as_str).unwrap();
        assert_eq!(id, parsed);
        assert_eq!(id.as_uuid(), parsed.as_uuid());
        assert!(SessionId::parse("42").is_err());
    }

    #[test]
    fn test_upload_status_flags() {
        assert!(UploadStatus::Pending.is_active());
        assert!(UploadStatus::Uploading.is_active());
        for status in [UploadStatus::Completed, UploadStatus::Failed] {
            assert!(!status.is_active());
            assert!(status.is_terminal());
        }
    }

    #[test]
    fn test_upload_status_string_form() {
        for status in [
            UploadStatus::Pending,
            UploadStatus::Uploading,
            UploadStatus::Completed,
            UploadStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<UploadStatus>().unwrap(), status);
        }
        assert!("success".parse::<UploadStatus>().is_err());
    }

    #[test]
    fn test_new_session_rejects_blank_name() {
        assert!(UploadSession::new("", 10, 5).is_err());
        assert!(UploadSession::new("   ", 10, 5).is_err());

        let session = UploadSession::new("report.pdf", 10, 5).unwrap();
        assert_eq!(session.status, UploadStatus::Pending);
        assert_eq!(session.received_bytes, 0);
        assert_eq!(session.original_name, "report.pdf");
        assert!(session.storage_key.as_str().ends_with(".pdf"));
    }

    #[test]
    fn test_progress_percent_floors() {
        let declared = 15_000_000;
        assert_eq!(progress_percent(0, declared), 0);
        assert_eq!(progress_percent(5_000_000, declared), 33);
        assert_eq!(progress_percent(10_000_000, declared), 66);
        assert_eq!(progress_percent(15_000_000, declared), 100);
    }

    #[test]
    fn test_progress_percent_clamps_and_handles_zero() {
        assert_eq!(progress_percent(10, 0), 0);
        assert_eq!(progress_percent(200, 100), 100);
        assert_eq!(progress_percent(u64::MAX, u64::MAX), 100);
        assert_eq!(progress_percent(u64::MAX, 1), 100);
    }

    #[test]
    fn test_completed_session_reports_full_progress() {
        let mut session = UploadSession::new("empty.txt", 0, 5).unwrap();
        assert_eq!(session.progress_percent(), 0);
        session.status = UploadStatus::Completed;
        assert_eq!(session.progress_percent(), 100);
        assert_eq!(ProgressReport::of(&session).progress, 100);
    }

    #[test]
    fn test_unknown_progress_report() {
        let report = ProgressReport::unknown();
        assert_eq!(report.progress, -1);
        assert!(report.status.is_none());
    }

    #[test]
    fn test_expected_chunk_count() {
        let session = UploadSession::new("a", 100, 64).unwrap();
        assert_eq!(session.expected_chunk_count(), 2);
        let session = UploadSession::new("a", 128, 64).unwrap();
        assert_eq!(session.expected_chunk_count(), 2);
        let session = UploadSession::new("a", 0, 64).unwrap();
        assert_eq!(session.expected_chunk_count(), 0);
    }
}
