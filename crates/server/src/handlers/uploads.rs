//! Upload control plane handlers.

use crate::engine::SessionSnapshot;
use crate::error::{ApiError, ApiResult, UploadError};
use crate::handlers::{parse_json, parse_upload_id};
use crate::metrics::record_upload_error;
use crate::state::AppState;
use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use futures::TryStreamExt;
use parcel_core::ProgressReport;
use parcel_core::upload::{
    ChunkUploadParams, ChunkUploadResponse, CreateUploadRequest, CreateUploadResponse,
    UploadStateResponse,
};
use parcel_storage::{ByteStream, StorageError};

fn state_response(snapshot: SessionSnapshot) -> UploadStateResponse {
    let SessionSnapshot {
        session,
        received_chunks,
    } = snapshot;
    let progress = session.progress_percent();
    let error = session.error_detail.clone().or(session.error_code.clone());

    UploadStateResponse {
        upload_id: session.id.to_string(),
        filename: session.original_name,
        status: session.status,
        file_size: session.declared_size,
        received_bytes: session.received_bytes,
        progress,
        chunk_size: session.chunk_size,
        received_chunks,
        error,
    }
}

fn record_failure(err: UploadError) -> ApiError {
    record_upload_error(err.metric_label());
    err.into()
}

/// POST /v1/uploads - Initiate an upload.
#[tracing::instrument(skip(state, body))]
pub async fn create_upload(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<CreateUploadResponse>)> {
    let req: CreateUploadRequest = parse_json(&body)?;

    let initiated = state
        .engine
        .initiate_upload(&req.filename, req.file_size)
        .await
        .map_err(record_failure)?;

    Ok((
        StatusCode::CREATED,
        Json(CreateUploadResponse {
            upload_id: initiated.session.id.to_string(),
            storage_key: initiated.session.storage_key.to_string(),
            chunk_size: initiated.chunk_size,
        }),
    ))
}

/// GET /v1/uploads/{upload_id} - Session state and received chunk indices.
pub async fn get_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<UploadStateResponse>> {
    let id = parse_upload_id(&upload_id)?;
    let snapshot = state.engine.session(id).await?;
    Ok(Json(state_response(snapshot)))
}

/// PUT /v1/uploads/{upload_id}/chunks/{chunk_index}?total_chunks=N
///
/// The raw request body is the chunk payload. It is streamed straight to
/// chunk storage.
#[tracing::instrument(skip(state, params, body))]
pub async fn upload_chunk(
    State(state): State<AppState>,
    Path((upload_id, chunk_index)): Path<(String, String)>,
    params: Result<Query<ChunkUploadParams>, QueryRejection>,
    body: Body,
) -> ApiResult<Json<ChunkUploadResponse>> {
    let id = parse_upload_id(&upload_id)?;
    let index: u32 = chunk_index.parse().map_err(|_| {
        ApiError::InvalidInput(format!("chunk index must be a non-negative integer: {chunk_index}"))
    })?;
    let Query(params) = params.map_err(|e| {
        ApiError::InvalidInput(format!("total_chunks query parameter required: {e}"))
    })?;

    let payload: ByteStream = Box::pin(
        body.into_data_stream()
            .map_err(|e| StorageError::Io(std::io::Error::other(e))),
    );

    let receipt = state
        .engine
        .ingest_chunk(id, index, params.total_chunks, payload)
        .await
        .map_err(record_failure)?;

    Ok(Json(ChunkUploadResponse {
        chunk_index: index,
        complete: receipt.complete,
        progress: receipt.progress,
    }))
}

/// GET /v1/uploads/{upload_id}/progress
///
/// Unknown or malformed IDs answer `{"progress": -1, "status": null}`.
pub async fn get_progress(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Json<ProgressReport> {
    match parse_upload_id(&upload_id) {
        Ok(id) => Json(state.progress.progress_of(id).await),
        Err(_) => Json(ProgressReport::unknown()),
    }
}

/// DELETE /v1/uploads/{upload_id} - Abort an upload.
#[tracing::instrument(skip(state))]
pub async fn abort_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<UploadStateResponse>> {
    let id = parse_upload_id(&upload_id)?;
    state.engine.abort_upload(id).await.map_err(record_failure)?;
    let snapshot = state.engine.session(id).await?;
    Ok(Json(state_response(snapshot)))
}
