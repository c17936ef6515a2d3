//! Tag repository.

use crate::error::MetadataResult;
use crate::models::{FileTagRow, TagRow};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for tags and file-tag associations.
#[async_trait]
pub trait TagRepo: Send + Sync {
    /// Create a tag. Names are unique; a duplicate yields `AlreadyExists`.
    async fn create_tag(&self, name: &str, created_at: OffsetDateTime) -> MetadataResult<TagRow>;

    /// Get a tag by ID.
    async fn get_tag(&self, tag_id: i64) -> MetadataResult<Option<TagRow>>;

    /// List all tags ordered by name.
    async fn list_tags(&self) -> MetadataResult<Vec<TagRow>>;

    /// Delete a tag and detach it from every file.
    async fn delete_tag(&self, tag_id: i64) -> MetadataResult<()>;

    /// Replace the full tag set of a file. Unknown tag IDs are ignored.
    ///
    /// Returns the resulting tags.
    async fn set_file_tags(&self, upload_id: Uuid, tag_ids: &[i64]) -> MetadataResult<Vec<TagRow>>;

    /// Get the tags attached to a file, ordered by name.
    async fn get_file_tags(&self, upload_id: Uuid) -> MetadataResult<Vec<TagRow>>;

    /// Get every file-tag association, for bulk listing.
    async fn list_file_tags(&self) -> MetadataResult<Vec<FileTagRow>>;
}
