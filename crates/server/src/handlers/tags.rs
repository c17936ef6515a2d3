//! Tag management handlers.

use crate::error::{ApiError, ApiResult};
use crate::handlers::parse_json;
use crate::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use parcel_core::catalog::{CreateTagRequest, ListTagsResponse, normalize_name};
use parcel_core::{Tag, TagId};
use time::OffsetDateTime;

/// GET /v1/tags - All tags ordered by name.
pub async fn list_tags(State(state): State<AppState>) -> ApiResult<Json<ListTagsResponse>> {
    let tags = state
        .metadata
        .list_tags()
        .await?
        .into_iter()
        .map(Tag::from)
        .collect();
    Ok(Json(ListTagsResponse { tags }))
}

/// POST /v1/tags - Create a tag. Duplicate names conflict.
#[tracing::instrument(skip(state, body))]
pub async fn create_tag(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Tag>)> {
    let req: CreateTagRequest = parse_json(&body)?;
    let name = normalize_name(&req.name, "tag name")?;

    let row = state
        .metadata
        .create_tag(&name, OffsetDateTime::now_utc())
        .await?;
    Ok((StatusCode::CREATED, Json(row.into())))
}

/// DELETE /v1/tags/{tag_id} - Delete a tag and detach it from every file.
#[tracing::instrument(skip(state))]
pub async fn delete_tag(
    State(state): State<AppState>,
    Path(tag_id): Path<String>,
) -> ApiResult<StatusCode> {
    let tag_id: TagId = tag_id
        .parse()
        .map_err(|_| ApiError::InvalidInput(format!("invalid tag ID: {tag_id}")))?;
    state.metadata.delete_tag(tag_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
