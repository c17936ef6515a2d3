//! Health check and shared handler helpers.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use parcel_core::SessionId;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub storage_backend: &'static str,
}

/// GET /v1/health - Liveness plus storage and metadata connectivity.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.metadata.health_check().await?;
    state.storage.health_check().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        storage_backend: state.storage.backend_name(),
    }))
}

/// Parse an upload ID from a path segment.
pub fn parse_upload_id(raw: &str) -> ApiResult<SessionId> {
    SessionId::parse(raw).map_err(|e| ApiError::InvalidInput(e.to_string()))
}

/// Decode a JSON request body, reporting malformed input as `invalid_input`.
pub fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidInput(format!("invalid JSON: {e}")))
}

/// Format a timestamp as RFC 3339.
pub fn rfc3339(at: time::OffsetDateTime) -> ApiResult<String> {
    at.format(&time::format_description::well_known::Rfc3339)
        .map_err(|e| ApiError::Internal(format!("failed to format timestamp: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_upload_id() {
        let id = SessionId::new();
        assert_eq!(parse_upload_id(&id.to_string()).unwrap(), id);

        // Row numbers are not accepted as file handles.
        let err = parse_upload_id("17").unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn test_parse_json_reports_invalid_input() {
        let err = parse_json::<parcel_core::catalog::CreateTagRequest>(b"{").unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        let req: parcel_core::catalog::CreateTagRequest = parse_json(br#"{"name":"x"}"#).unwrap();
        assert_eq!(req.name, "x");
    }
}
