//! Integration tests for HTTP API endpoints.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use bytes::Bytes;
use common::fixtures::{seeded_bytes, split_into_chunks};
use common::{TEST_CHUNK_SIZE, TestServer};
use serde_json::{Value, json};
use tower::ServiceExt;

/// Helper to make JSON requests.
async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let request = builder.body(body).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

/// PUT a raw chunk payload.
async fn put_chunk(
    router: &axum::Router,
    upload_id: &str,
    index: u32,
    total: u32,
    data: Bytes,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("PUT")
        .uri(format!(
            "/v1/uploads/{upload_id}/chunks/{index}?total_chunks={total}"
        ))
        .header("Content-Type", "application/octet-stream")
        .body(Body::from(data))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body_bytes).unwrap_or(Value::Null))
}

async fn create_upload(router: &axum::Router, filename: &str, size: usize) -> String {
    let (status, body) = json_request(
        router,
        "POST",
        "/v1/uploads",
        Some(json!({"filename": filename, "file_size": size})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["upload_id"].as_str().unwrap().to_string()
}

/// Upload `data` completely, sending chunks in ascending order.
async fn upload_file(router: &axum::Router, filename: &str, data: &[u8]) -> String {
    let upload_id = create_upload(router, filename, data.len()).await;
    let chunks = split_into_chunks(data, TEST_CHUNK_SIZE as usize);
    let total = chunks.len().max(1) as u32;
    if chunks.is_empty() {
        let (status, _) = put_chunk(router, &upload_id, 0, 1, Bytes::new()).await;
        assert_eq!(status, StatusCode::OK);
    }
    for (index, chunk) in chunks.into_iter().enumerate() {
        let (status, body) = put_chunk(router, &upload_id, index as u32, total, chunk).await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }
    upload_id
}

#[tokio::test]
async fn test_health_and_capabilities() {
    let server = TestServer::new().await;

    let (status, body) = json_request(&server.router, "GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage_backend"], "filesystem");

    let (status, body) = json_request(&server.router, "GET", "/v1/capabilities", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chunk_size"], TEST_CHUNK_SIZE);
    assert_eq!(body["max_chunk_size"], 4 * TEST_CHUNK_SIZE);
    assert_eq!(body["api_version"], "v1");
}

#[tokio::test]
async fn test_create_upload_returns_contract() {
    let server = TestServer::new().await;

    let (status, body) = json_request(
        &server.router,
        "POST",
        "/v1/uploads",
        Some(json!({"filename": "holiday.MOV", "file_size": 1234})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["chunk_size"], TEST_CHUNK_SIZE);
    assert!(body["storage_key"].as_str().unwrap().ends_with(".mov"));

    let upload_id = body["upload_id"].as_str().unwrap();
    let (status, state) =
        json_request(&server.router, "GET", &format!("/v1/uploads/{upload_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["status"], "pending");
    assert_eq!(state["filename"], "holiday.MOV");
    assert_eq!(state["file_size"], 1234);
    assert_eq!(state["received_chunks"], json!([]));
}

#[tokio::test]
async fn test_create_upload_rejects_bad_input() {
    let server = TestServer::new().await;

    let (status, body) = json_request(
        &server.router,
        "POST",
        "/v1/uploads",
        Some(json!({"filename": "  ", "file_size": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_input");

    let (status, body) = json_request(
        &server.router,
        "POST",
        "/v1/uploads",
        Some(json!({"filename": "a.txt"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_input");
}

#[tokio::test]
async fn test_chunk_upload_flow_and_progress() {
    let server = TestServer::new().await;
    let chunk = TEST_CHUNK_SIZE as usize;
    let data = seeded_bytes(5, 3 * chunk);
    let chunks = split_into_chunks(&data, chunk);
    let upload_id = create_upload(&server.router, "clip.mp4", data.len()).await;
    let progress_uri = format!("/v1/uploads/{upload_id}/progress");

    let (status, body) = put_chunk(&server.router, &upload_id, 1, 3, chunks[1].clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"chunk_index": 1, "complete": false, "progress": 33}));

    let (_, progress) = json_request(&server.router, "GET", &progress_uri, None).await;
    assert_eq!(progress, json!({"progress": 33, "status": "uploading"}));

    let (_, body) = put_chunk(&server.router, &upload_id, 0, 3, chunks[0].clone()).await;
    assert_eq!(body["progress"], 66);

    let (_, body) = put_chunk(&server.router, &upload_id, 2, 3, chunks[2].clone()).await;
    assert_eq!(body["complete"], true);
    assert_eq!(body["progress"], 100);

    let (_, progress) = json_request(&server.router, "GET", &progress_uri, None).await;
    assert_eq!(progress, json!({"progress": 100, "status": "completed"}));
}

#[tokio::test]
async fn test_progress_for_unknown_upload_is_minus_one() {
    let server = TestServer::new().await;

    let (status, body) = json_request(
        &server.router,
        "GET",
        &format!("/v1/uploads/{}/progress", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"progress": -1, "status": null}));

    let (status, body) =
        json_request(&server.router, "GET", "/v1/uploads/42/progress", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progress"], -1);
}

#[tokio::test]
async fn test_chunk_error_status_mapping() {
    let server = TestServer::new().await;
    let upload_id = create_upload(&server.router, "a.bin", 30).await;

    // Index beyond the declared chunk count.
    let (status, body) =
        put_chunk(&server.router, &upload_id, 5, 3, Bytes::from_static(b"x")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_input");

    // Missing total_chunks.
    let request = Request::builder()
        .method("PUT")
        .uri(format!("/v1/uploads/{upload_id}/chunks/0"))
        .body(Body::from("x"))
        .unwrap();
    let response = server.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unknown session.
    let (status, body) = put_chunk(
        &server.router,
        &uuid::Uuid::new_v4().to_string(),
        0,
        1,
        Bytes::from_static(b"x"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    // Last chunk before the others arrived.
    let (status, body) =
        put_chunk(&server.router, &upload_id, 2, 3, Bytes::from_static(b"z")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "incomplete_upload");
    assert!(body["message"].as_str().unwrap().contains("0, 1"));

    // A chunk count different from the one the upload started with.
    let (status, body) =
        put_chunk(&server.router, &upload_id, 3, 5, Bytes::from_static(b"w")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_input");
    assert!(body["message"].as_str().unwrap().contains("total_chunks 5"));

    // Oversized payload.
    let big = seeded_bytes(1, 4 * TEST_CHUNK_SIZE as usize + 1);
    let (status, body) = put_chunk(&server.router, &upload_id, 0, 3, big).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_input");
}

#[tokio::test]
async fn test_abort_upload() {
    let server = TestServer::new().await;
    let upload_id = create_upload(&server.router, "a.bin", 30).await;
    put_chunk(&server.router, &upload_id, 0, 3, Bytes::from_static(b"0123456789")).await;

    let (status, body) =
        json_request(&server.router, "DELETE", &format!("/v1/uploads/{upload_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");
    assert!(body["error"].as_str().is_some());

    let (status, body) =
        put_chunk(&server.router, &upload_id, 1, 3, Bytes::from_static(b"0123456789")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_state");
}

#[tokio::test]
async fn test_download_streams_artifact_with_original_name() {
    let server = TestServer::new().await;
    let data = seeded_bytes(8, 2 * TEST_CHUNK_SIZE as usize + 333);
    let upload_id = upload_file(&server.router, "Relatório final.pdf", &data).await;

    let request = Request::builder()
        .method("GET")
        .uri(format!("/v1/files/{upload_id}/download"))
        .body(Body::empty())
        .unwrap();
    let response = server.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename*=UTF-8''Relat%C3%B3rio%20final.pdf"
    );
    assert_eq!(
        response.headers()[header::CONTENT_LENGTH],
        data.len().to_string().as_str()
    );

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(body, data);
}

#[tokio::test]
async fn test_download_incomplete_upload_is_not_found() {
    let server = TestServer::new().await;
    let upload_id = create_upload(&server.router, "a.bin", 30).await;

    let (status, body) = json_request(
        &server.router,
        "GET",
        &format!("/v1/files/{upload_id}/download"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    parcel_server::metrics::register_metrics();
    let server = TestServer::new().await;
    upload_file(&server.router, "m.txt", b"metrics").await;

    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let response = server.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("parcel_upload_sessions_completed_total"));
    assert!(text.contains("parcel_chunks_uploaded_total"));
}

#[tokio::test]
async fn test_metrics_endpoint_can_be_disabled() {
    let server = TestServer::with_config(|config| config.server.metrics_enabled = false).await;

    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let response = server.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
