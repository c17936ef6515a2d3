use anyhow::{Context, Result};
use bytes::Bytes;
use parcel_core::catalog::{
    CreateTagRequest, ListFilesResponse, ListTagsResponse, RenameFileRequest, SetFileTagsRequest,
};
use parcel_core::upload::{
    ChunkUploadResponse, CreateUploadRequest, CreateUploadResponse, UploadStateResponse,
};
use parcel_core::{FileEntry, ProgressReport, Tag, TagId};
use reqwest::Url;
use serde::{Deserialize, de::DeserializeOwned};
use std::fmt;
use std::time::Duration;

/// Retries after the first attempt for transient failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay before the first retry; doubles on each subsequent one.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    max_retries: u32,
    retry_delay: Duration,
}

/// A non-success answer from the server.
#[derive(Debug, Clone)]
pub struct ApiFailure {
    pub status: u16,
    /// Machine-readable code from the JSON error body, when present.
    pub code: Option<String>,
    pub message: String,
}

impl ApiFailure {
    pub fn is_incomplete_upload(&self) -> bool {
        self.code.as_deref() == Some("incomplete_upload")
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "API error ({}, {code}): {}", self.status, self.message),
            None => write!(f, "API error ({}): {}", self.status, self.message),
        }
    }
}

impl std::error::Error for ApiFailure {}

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid server URL")?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    /// Override the retry policy used for chunk transfers.
    pub fn with_retry(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("failed to build API URL")
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let failure = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(err) => ApiFailure {
                status: status.as_u16(),
                code: Some(err.code),
                message: err.message,
            },
            Err(_) => ApiFailure {
                status: status.as_u16(),
                code: None,
                message: body,
            },
        };
        Err(failure.into())
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let response = Self::check(req.send().await?).await?;
        Ok(response.json::<T>().await?)
    }

    async fn send_empty(&self, req: reqwest::RequestBuilder) -> Result<()> {
        Self::check(req.send().await?).await?;
        Ok(())
    }

    /// Retries an HTTP request with exponential backoff on transient failures.
    ///
    /// Retries on transport errors and 5xx responses. Returns immediately on
    /// success or 4xx (client errors that won't resolve with retries).
    async fn retry_request<F, Fut>(&self, mut make_request: F) -> reqwest::Result<reqwest::Response>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = reqwest::Result<reqwest::Response>>,
    {
        let mut attempt = 0;

        loop {
            let outcome = make_request().await;
            let transient = match &outcome {
                Ok(response) => response.status().is_server_error(),
                Err(_) => true,
            };
            if !transient || attempt >= self.max_retries {
                return outcome;
            }
            attempt += 1;
            let delay = self.retry_delay * (1 << (attempt - 1));
            match &outcome {
                Ok(response) => eprintln!(
                    "  Server error ({}), retrying in {}ms...",
                    response.status(),
                    delay.as_millis()
                ),
                Err(e) => eprintln!("  Request error ({e}), retrying in {}ms...", delay.as_millis()),
            }
            tokio::time::sleep(delay).await;
        }
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.url("/v1/health")?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn capabilities(&self) -> Result<CapabilitiesResponse> {
        let url = self.url("/v1/capabilities")?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn create_upload(&self, filename: &str, file_size: u64) -> Result<CreateUploadResponse> {
        let url = self.url("/v1/uploads")?;
        let req = CreateUploadRequest {
            filename: filename.to_string(),
            file_size,
        };
        self.send_json(self.http.post(url).json(&req)).await
    }

    pub async fn get_upload(&self, upload_id: &str) -> Result<UploadStateResponse> {
        let url = self.url(&format!("/v1/uploads/{upload_id}"))?;
        self.send_json(self.http.get(url)).await
    }

    /// Send one chunk, retrying transient failures.
    pub async fn upload_chunk(
        &self,
        upload_id: &str,
        chunk_index: u32,
        total_chunks: u32,
        data: Bytes,
    ) -> Result<ChunkUploadResponse> {
        let mut url = self.url(&format!("/v1/uploads/{upload_id}/chunks/{chunk_index}"))?;
        url.query_pairs_mut()
            .append_pair("total_chunks", &total_chunks.to_string());

        let response = self
            .retry_request(|| self.http.put(url.clone()).body(data.clone()).send())
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json::<ChunkUploadResponse>().await?)
    }

    pub async fn get_progress(&self, upload_id: &str) -> Result<ProgressReport> {
        let url = self.url(&format!("/v1/uploads/{upload_id}/progress"))?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn abort_upload(&self, upload_id: &str) -> Result<UploadStateResponse> {
        let url = self.url(&format!("/v1/uploads/{upload_id}"))?;
        self.send_json(self.http.delete(url)).await
    }

    pub async fn list_files(&self) -> Result<Vec<FileEntry>> {
        let url = self.url("/v1/files")?;
        let response: ListFilesResponse = self.send_json(self.http.get(url)).await?;
        Ok(response.files)
    }

    /// Start a download; the caller streams the body.
    pub async fn download(&self, upload_id: &str) -> Result<reqwest::Response> {
        let url = self.url(&format!("/v1/files/{upload_id}/download"))?;
        Self::check(self.http.get(url).send().await?).await
    }

    pub async fn rename_file(&self, upload_id: &str, new_name: &str) -> Result<FileEntry> {
        let url = self.url(&format!("/v1/files/{upload_id}/rename"))?;
        let req = RenameFileRequest {
            new_name: new_name.to_string(),
        };
        self.send_json(self.http.post(url).json(&req)).await
    }

    pub async fn delete_file(&self, upload_id: &str) -> Result<()> {
        let url = self.url(&format!("/v1/files/{upload_id}"))?;
        self.send_empty(self.http.delete(url)).await
    }

    pub async fn get_file_tags(&self, upload_id: &str) -> Result<Vec<Tag>> {
        let url = self.url(&format!("/v1/files/{upload_id}/tags"))?;
        let response: ListTagsResponse = self.send_json(self.http.get(url)).await?;
        Ok(response.tags)
    }

    pub async fn set_file_tags(&self, upload_id: &str, tag_ids: &[TagId]) -> Result<Vec<Tag>> {
        let url = self.url(&format!("/v1/files/{upload_id}/tags"))?;
        let req = SetFileTagsRequest {
            tag_ids: tag_ids.to_vec(),
        };
        let response: ListTagsResponse = self.send_json(self.http.put(url).json(&req)).await?;
        Ok(response.tags)
    }

    pub async fn list_tags(&self) -> Result<Vec<Tag>> {
        let url = self.url("/v1/tags")?;
        let response: ListTagsResponse = self.send_json(self.http.get(url)).await?;
        Ok(response.tags)
    }

    pub async fn create_tag(&self, name: &str) -> Result<Tag> {
        let url = self.url("/v1/tags")?;
        let req = CreateTagRequest {
            name: name.to_string(),
        };
        self.send_json(self.http.post(url).json(&req)).await
    }

    pub async fn delete_tag(&self, tag_id: TagId) -> Result<()> {
        let url = self.url(&format!("/v1/tags/{tag_id}"))?;
        self.send_empty(self.http.delete(url)).await
    }
}

// =============================================================================
// Response types (mirrored from server handlers)
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub storage_backend: String,
}

#[derive(Debug, Deserialize)]
pub struct CapabilitiesResponse {
    pub chunk_size: u64,
    pub max_chunk_size: u64,
    pub supports_resume: bool,
    pub api_version: String,
}
