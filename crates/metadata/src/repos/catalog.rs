//! File catalog repository.

use crate::error::MetadataResult;
use crate::models::UploadSessionRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for browsing and renaming uploaded files.
#[async_trait]
pub trait CatalogRepo: Send + Sync {
    /// List all uploads, most recently initiated first.
    async fn list_files(&self) -> MetadataResult<Vec<UploadSessionRow>>;

    /// Change the display name of an upload. The storage key is unaffected.
    async fn rename_file(
        &self,
        upload_id: Uuid,
        new_name: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<UploadSessionRow>;
}
