//! Capability discovery endpoint.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Capabilities response.
#[derive(Debug, Serialize)]
pub struct CapabilitiesResponse {
    /// Chunk size handed to new uploads, in bytes.
    pub chunk_size: u64,
    /// Largest accepted chunk payload, in bytes.
    pub max_chunk_size: u64,
    /// Whether missing chunks can be re-sent after an incomplete assembly.
    pub supports_resume: bool,
    /// API version.
    pub api_version: &'static str,
}

/// GET /v1/capabilities
pub async fn get_capabilities(
    State(state): State<AppState>,
) -> ApiResult<Json<CapabilitiesResponse>> {
    Ok(Json(CapabilitiesResponse {
        chunk_size: state.config.server.chunk_size,
        max_chunk_size: state.config.server.max_chunk_size,
        supports_resume: true,
        api_version: "v1",
    }))
}
