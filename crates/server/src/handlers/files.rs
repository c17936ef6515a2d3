//! File catalog handlers: listing, download, rename, delete and file tags.

use crate::error::{ApiError, ApiResult};
use crate::handlers::{parse_json, parse_upload_id, rfc3339};
use crate::state::AppState;
use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use parcel_core::catalog::{
    FileEntry, ListFilesResponse, ListTagsResponse, RenameFileRequest, SetFileTagsRequest,
    normalize_name,
};
use parcel_core::{Tag, UploadSession};
use parcel_metadata::models::UploadSessionRow;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// Characters escaped in an RFC 5987 `filename*` value.
const FILENAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Build a `Content-Disposition` header that downloads under `filename`.
pub fn content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename*=UTF-8''{}",
        utf8_percent_encode(filename, FILENAME_ENCODE_SET)
    )
}

fn file_entry(session: UploadSession, tags: Vec<Tag>) -> ApiResult<FileEntry> {
    Ok(FileEntry {
        id: session.id.to_string(),
        progress: session.progress_percent(),
        uploaded_at: rfc3339(session.created_at)?,
        filename: session.original_name,
        storage_key: session.storage_key.to_string(),
        file_size: session.declared_size,
        status: session.status,
        tags,
    })
}

fn into_session(row: UploadSessionRow) -> ApiResult<UploadSession> {
    Ok(row.into_session()?)
}

/// GET /v1/files - Every upload, newest first, with its tags.
pub async fn list_files(State(state): State<AppState>) -> ApiResult<Json<ListFilesResponse>> {
    let rows = state.metadata.list_files().await?;

    let mut tags_by_file: HashMap<Uuid, Vec<Tag>> = HashMap::new();
    for link in state.metadata.list_file_tags().await? {
        tags_by_file.entry(link.upload_id).or_default().push(Tag {
            id: link.tag_id,
            name: link.name,
        });
    }

    let files = rows
        .into_iter()
        .map(|row| {
            let tags = tags_by_file.remove(&row.upload_id).unwrap_or_default();
            file_entry(into_session(row)?, tags)
        })
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(Json(ListFilesResponse { files }))
}

/// GET /v1/files/{upload_id}/download - Stream the assembled artifact.
#[tracing::instrument(skip(state))]
pub async fn download_file(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Response> {
    let id = parse_upload_id(&upload_id)?;
    let artifact = state.engine.open_artifact(id).await?;

    let disposition = HeaderValue::from_str(&content_disposition(
        &artifact.location.session.original_name,
    ))
    .map_err(|e| ApiError::Internal(format!("invalid content-disposition: {e}")))?;

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_LENGTH, HeaderValue::from(artifact.size)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(artifact.body),
    )
        .into_response())
}

/// POST /v1/files/{upload_id}/rename - Change the display name.
#[tracing::instrument(skip(state, body))]
pub async fn rename_file(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<FileEntry>> {
    let id = parse_upload_id(&upload_id)?;
    let req: RenameFileRequest = parse_json(&body)?;
    let new_name = normalize_name(&req.new_name, "new_name")?;

    let row = state
        .metadata
        .rename_file(*id.as_uuid(), &new_name, OffsetDateTime::now_utc())
        .await?;
    let tags = state
        .metadata
        .get_file_tags(*id.as_uuid())
        .await?
        .into_iter()
        .map(Tag::from)
        .collect();

    tracing::info!(upload_id = %id, new_name = %new_name, "file renamed");
    Ok(Json(file_entry(into_session(row)?, tags)?))
}

/// DELETE /v1/files/{upload_id} - Delete artifact, chunks and record.
#[tracing::instrument(skip(state))]
pub async fn delete_file(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_upload_id(&upload_id)?;
    state.engine.delete_upload(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/files/{upload_id}/tags
pub async fn get_file_tags(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<ListTagsResponse>> {
    let id = parse_upload_id(&upload_id)?;
    state.engine.load_session(id).await?;

    let tags = state
        .metadata
        .get_file_tags(*id.as_uuid())
        .await?
        .into_iter()
        .map(Tag::from)
        .collect();
    Ok(Json(ListTagsResponse { tags }))
}

/// PUT /v1/files/{upload_id}/tags - Replace the file's tag set.
#[tracing::instrument(skip(state, body))]
pub async fn set_file_tags(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<ListTagsResponse>> {
    let id = parse_upload_id(&upload_id)?;
    let req: SetFileTagsRequest = parse_json(&body)?;

    let tags = state
        .metadata
        .set_file_tags(*id.as_uuid(), &req.tag_ids)
        .await?
        .into_iter()
        .map(Tag::from)
        .collect();
    Ok(Json(ListTagsResponse { tags }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_encodes_utf8() {
        assert_eq!(
            content_disposition("report-2024.pdf"),
            "attachment; filename*=UTF-8''report-2024.pdf"
        );
        assert_eq!(
            content_disposition("résumé final.doc"),
            "attachment; filename*=UTF-8''r%C3%A9sum%C3%A9%20final.doc"
        );
        assert_eq!(
            content_disposition("a\"b;c.txt"),
            "attachment; filename*=UTF-8''a%22b%3Bc.txt"
        );
    }
}
