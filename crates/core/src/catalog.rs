//! Catalog and tag wire types.

use crate::upload::UploadStatus;
use serde::{Deserialize, Serialize};

/// Numeric tag identifier.
pub type TagId = i64;

/// A user-defined label that can be attached to uploaded files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag identifier.
    pub id: TagId,
    /// Unique tag name.
    pub name: String,
}

/// A catalog entry for an uploaded file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileEntry {
    /// Upload session ID, the canonical handle for the file.
    pub id: String,
    /// Display filename.
    pub filename: String,
    /// Internal storage key.
    pub storage_key: String,
    /// Declared file size in bytes.
    pub file_size: u64,
    /// Upload status.
    pub status: UploadStatus,
    /// Progress percentage.
    pub progress: u8,
    /// When the upload was initiated (RFC 3339).
    pub uploaded_at: String,
    /// Tags attached to the file.
    pub tags: Vec<Tag>,
}

/// Response listing catalog entries, newest first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListFilesResponse {
    pub files: Vec<FileEntry>,
}

/// Request to rename a file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RenameFileRequest {
    pub new_name: String,
}

/// Request to create a tag.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
}

/// Request replacing the full set of tags on a file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetFileTagsRequest {
    pub tag_ids: Vec<TagId>,
}

/// Response listing tags.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListTagsResponse {
    pub tags: Vec<Tag>,
}

/// Normalize a user-supplied name (filename or tag), rejecting blank input.
pub fn normalize_name(raw: &str, what: &str) -> crate::Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(crate::Error::InvalidInput(format!("{what} must not be empty")));
    }
    Ok(trimmed.to_string())
}
