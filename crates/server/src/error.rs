//! API and engine error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use parcel_metadata::MetadataError;
use parcel_storage::StorageError;
use serde::Serialize;

/// Errors produced by the assembly engine.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("incomplete upload: missing chunks {}", format_indices(.missing))]
    IncompleteUpload { missing: Vec<u32> },

    #[error("storage error: {0}")]
    Io(#[from] StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),
}

impl From<parcel_core::Error> for UploadError {
    fn from(err: parcel_core::Error) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl UploadError {
    /// Label used for the `parcel_upload_errors_total` metric.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::IncompleteUpload { .. } => "incomplete_upload",
            Self::Io(_) => "storage",
            Self::Metadata(_) => "metadata",
        }
    }
}

fn format_indices(indices: &[u32]) -> String {
    indices
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("incomplete upload: missing chunks {}", format_indices(.missing))]
    IncompleteUpload { missing: Vec<u32> },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::IncompleteUpload { .. } => "incomplete_upload",
            Self::Internal(_) => "internal_error",
            Self::Storage(StorageError::NotFound(_)) => "not_found",
            Self::Storage(_) => "storage_error",
            Self::Metadata(MetadataError::NotFound(_)) => "not_found",
            Self::Metadata(MetadataError::AlreadyExists(_)) => "already_exists",
            Self::Metadata(MetadataError::InvalidStateTransition { .. }) => "invalid_state",
            Self::Metadata(_) => "metadata_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::IncompleteUpload { .. } => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Metadata(e) => match e {
                MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                MetadataError::AlreadyExists(_) => StatusCode::CONFLICT,
                MetadataError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::InvalidInput(msg) => Self::InvalidInput(msg),
            UploadError::NotFound(msg) => Self::NotFound(msg),
            UploadError::InvalidState(msg) => Self::InvalidState(msg),
            UploadError::IncompleteUpload { missing } => Self::IncompleteUpload { missing },
            UploadError::Io(e) => Self::Storage(e),
            UploadError::Metadata(e) => Self::Metadata(e),
        }
    }
}

impl From<parcel_core::Error> for ApiError {
    fn from(err: parcel_core::Error) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ApiError::InvalidInput("bad".into()),
                StatusCode::BAD_REQUEST,
                "invalid_input",
            ),
            (
                ApiError::NotFound("gone".into()),
                StatusCode::NOT_FOUND,
                "not_found",
            ),
            (
                ApiError::InvalidState("done".into()),
                StatusCode::CONFLICT,
                "invalid_state",
            ),
            (
                ApiError::IncompleteUpload { missing: vec![1] },
                StatusCode::CONFLICT,
                "incomplete_upload",
            ),
            (
                ApiError::Storage(StorageError::Io(std::io::Error::other("disk"))),
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
            ),
            (
                ApiError::Metadata(MetadataError::Internal("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
                "metadata_error",
            ),
            (
                ApiError::Metadata(MetadataError::NotFound("tag".into())),
                StatusCode::NOT_FOUND,
                "not_found",
            ),
            (
                ApiError::Metadata(MetadataError::AlreadyExists("tag".into())),
                StatusCode::CONFLICT,
                "already_exists",
            ),
        ];

        for (err, status, code) in cases {
            assert_eq!(err.status_code(), status, "{err}");
            assert_eq!(err.code(), code, "{err}");
        }
    }

    #[test]
    fn test_incomplete_upload_lists_missing_indices() {
        let err = UploadError::IncompleteUpload {
            missing: vec![1, 4, 7],
        };
        assert_eq!(err.to_string(), "incomplete upload: missing chunks 1, 4, 7");

        let api: ApiError = err.into();
        assert_eq!(api.code(), "incomplete_upload");
        assert!(api.to_string().contains("1, 4, 7"));
    }

    #[test]
    fn test_upload_error_conversion_preserves_kind() {
        let api: ApiError = UploadError::InvalidState("aborted".into()).into();
        assert!(matches!(api, ApiError::InvalidState(_)));

        let api: ApiError = UploadError::Io(StorageError::InvalidKey("..".into())).into();
        assert_eq!(api.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
