//! Database models mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use parcel_core::{SessionId, StorageKey, Tag, UploadSession};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Upload sessions
// =============================================================================

/// Upload session record.
#[derive(Debug, Clone, FromRow)]
pub struct UploadSessionRow {
    pub upload_id: Uuid,
    pub storage_key: String,
    pub original_name: String,
    pub declared_size: i64,
    pub received_bytes: i64,
    pub chunk_size: i64,
    /// Chunk count fixed by the first chunk request, None before that.
    pub total_chunks: Option<i64>,
    pub state: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
    pub error_code: Option<String>,
    pub error_detail: Option<String>,
}

fn to_db_size(value: u64, field: &str) -> MetadataResult<i64> {
    i64::try_from(value)
        .map_err(|_| MetadataError::Constraint(format!("{field} {value} exceeds storable range")))
}

fn from_db_size(value: i64, field: &str) -> MetadataResult<u64> {
    u64::try_from(value)
        .map_err(|_| MetadataError::Internal(format!("negative {field} in database: {value}")))
}

impl UploadSessionRow {
    /// Build a row from a domain session.
    pub fn from_session(session: &UploadSession) -> MetadataResult<Self> {
        Ok(Self {
            upload_id: *session.id.as_uuid(),
            storage_key: session.storage_key.to_string(),
            original_name: session.original_name.clone(),
            declared_size: to_db_size(session.declared_size, "declared_size")?,
            received_bytes: to_db_size(session.received_bytes, "received_bytes")?,
            chunk_size: to_db_size(session.chunk_size, "chunk_size")?,
            total_chunks: None,
            state: session.status.as_str().to_string(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            completed_at: session.completed_at,
            error_code: session.error_code.clone(),
            error_detail: session.error_detail.clone(),
        })
    }

    /// Convert into the domain session, validating stored values.
    pub fn into_session(self) -> MetadataResult<UploadSession> {
        Ok(UploadSession {
            id: SessionId::from_uuid(self.upload_id),
            storage_key: StorageKey::parse(&self.storage_key)?,
            original_name: self.original_name,
            declared_size: from_db_size(self.declared_size, "declared_size")?,
            received_bytes: from_db_size(self.received_bytes, "received_bytes")?,
            chunk_size: from_db_size(self.chunk_size, "chunk_size")?,
            status: self.state.parse()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
            error_code: self.error_code,
            error_detail: self.error_detail,
        })
    }
}

/// Latest persisted payload size for one chunk index.
#[derive(Debug, Clone, FromRow)]
pub struct UploadChunkRow {
    pub upload_id: Uuid,
    pub chunk_index: i64,
    pub size_bytes: i64,
    pub received_at: OffsetDateTime,
}

// =============================================================================
// Tags
// =============================================================================

/// Tag record.
#[derive(Debug, Clone, FromRow)]
pub struct TagRow {
    pub tag_id: i64,
    pub name: String,
    pub created_at: OffsetDateTime,
}

impl From<TagRow> for Tag {
    fn from(row: TagRow) -> Self {
        Tag {
            id: row.tag_id,
            name: row.name,
        }
    }
}

/// A tag attached to a file, as returned by bulk association queries.
#[derive(Debug, Clone, FromRow)]
pub struct FileTagRow {
    pub upload_id: Uuid,
    pub tag_id: i64,
    pub name: String,
}
