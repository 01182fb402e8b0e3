//! Mock HTTP tests for SessionClient.
//!
//! These tests cover:
//! - Request formatting for the upload and preprocess calls
//! - Bearer authentication
//! - Error message extraction and status mapping
//! - Read retries on transient failures
//! - Theme listing, session creation and result download

use std::time::Duration;

use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use photobooth::api::{
    extract_error_message, ApiError, RetryPolicy, SessionApi, SessionClient, DEFAULT_UPLOAD_TIMEOUT,
};
use photobooth::photo::encode_data_url;

fn client(server: &MockServer) -> SessionClient {
    SessionClient::with_api_key(format!("{}/api", server.uri()), Some("test-key".to_string()))
        .expect("Failed to create test client")
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        backoff_base: Duration::from_millis(10),
        backoff_max: Duration::from_millis(20),
    }
}

// === Upload ===

#[tokio::test]
async fn test_update_session_image_sends_data_url() {
    let server = MockServer::start().await;
    let data_url = encode_data_url(&[0xFF, 0xD8, 0xFF, 0xE0]);

    Mock::given(method("PATCH"))
        .and(path("/api/sessions/session-123"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_json(serde_json::json!({ "image": data_url })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "session-123"
        })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .update_session_image("session-123", data_url, DEFAULT_UPLOAD_TIMEOUT)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_update_session_image_error_message() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/api/sessions/session-123"))
        .respond_with(ResponseTemplate::new(413).set_body_json(serde_json::json!({
            "message": "Image too large"
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .update_session_image(
            "session-123",
            "data:image/jpeg;base64,AA==".to_string(),
            DEFAULT_UPLOAD_TIMEOUT,
        )
        .await
        .unwrap_err();

    match err {
        ApiError::Status { status, message } => {
            assert_eq!(status, 413);
            assert_eq!(message, "Image too large");
        }
        other => panic!("Expected Status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_update_session_image_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/api/sessions/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let err = client(&server)
        .update_session_image(
            "slow",
            "data:image/jpeg;base64,AA==".to_string(),
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Timeout));
}

#[tokio::test]
async fn test_update_session_image_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/api/sessions/session-123"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .with_retry_policy(fast_retry())
        .update_session_image(
            "session-123",
            "data:image/jpeg;base64,AA==".to_string(),
            DEFAULT_UPLOAD_TIMEOUT,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Status { status: 503, .. }));
}

#[tokio::test]
async fn test_invalid_session_id_never_hits_network() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = client(&server)
        .update_session_image(
            "../themes",
            "data:image/jpeg;base64,AA==".to_string(),
            DEFAULT_UPLOAD_TIMEOUT,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::InvalidSessionId(_)));
}

// === Preprocess ===

#[tokio::test]
async fn test_preprocess_image_posts_session_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/preprocess-image"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_json(serde_json::json!({ "sessionId": "session-123" })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).preprocess_image("session-123").await.unwrap();
}

#[tokio::test]
async fn test_preprocess_image_reports_error_field() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/preprocess-image"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "error": "queue full"
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .preprocess_image("session-123")
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "API error (500): queue full");
}

// === Reads ===

#[tokio::test]
async fn test_list_themes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/themes"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "id": "neon", "name": "Neon", "description": "Glowing lights" },
            { "id": "retro", "name": "Retro", "previewUrl": "https://cdn.example/retro.jpg" }
        ])))
        .mount(&server)
        .await;

    let themes = client(&server).list_themes().await.unwrap();

    assert_eq!(themes.len(), 2);
    assert_eq!(themes[0].id, "neon");
    assert_eq!(themes[0].description.as_deref(), Some("Glowing lights"));
    assert_eq!(
        themes[1].preview_url.as_deref(),
        Some("https://cdn.example/retro.jpg")
    );
}

#[tokio::test]
async fn test_reads_retry_transient_failures() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/themes"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/themes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let themes = client(&server)
        .with_retry_policy(fast_retry())
        .list_themes()
        .await
        .unwrap();

    assert!(themes.is_empty());
}

#[tokio::test]
async fn test_reads_give_up_after_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/themes"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server)
        .with_retry_policy(fast_retry())
        .list_themes()
        .await
        .unwrap_err();

    match err {
        ApiError::NetworkError { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("Expected NetworkError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_reads_do_not_retry_client_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/sessions/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .with_retry_policy(fast_retry())
        .get_session("missing")
        .await
        .unwrap_err();

    match err {
        ApiError::Status { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "not found");
        }
        other => panic!("Expected Status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_get_session_with_result() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/sessions/session-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "session-123",
            "status": "completed",
            "themeId": "neon",
            "resultImageUrl": "https://cdn.example/result.jpg"
        })))
        .mount(&server)
        .await;

    let session = client(&server).get_session("session-123").await.unwrap();

    assert_eq!(session.status.as_deref(), Some("completed"));
    assert_eq!(session.theme_id.as_deref(), Some("neon"));
    assert_eq!(
        session.result_image_url.as_deref(),
        Some("https://cdn.example/result.jpg")
    );
}

#[tokio::test]
async fn test_create_session() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/sessions"))
        .and(body_json(serde_json::json!({ "themeId": "neon" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "new-session",
            "status": "created"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = client(&server).create_session("neon").await.unwrap();

    assert_eq!(session.id, "new-session");
    assert!(session.result_image_url.is_none());
}

// === Download ===

#[tokio::test]
async fn test_download_image_streams_to_disk() {
    let server = MockServer::start().await;
    let body: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();

    Mock::given(method("GET"))
        .and(path("/results/session-123.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body.clone())
                .insert_header("content-type", "image/jpeg"),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("results").join("out.jpg");
    let url = format!("{}/results/session-123.jpg", server.uri());

    let written = client(&server).download_image(&url, &dest).await.unwrap();

    assert_eq!(written, dest);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
}

#[tokio::test]
async fn test_download_image_missing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/results/gone.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let url = format!("{}/results/gone.jpg", server.uri());

    let err = client(&server)
        .download_image(&url, &dir.path().join("gone.jpg"))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Status { status: 404, .. }));
}

// === Error bodies ===

#[test]
fn test_extract_error_message_variants() {
    assert_eq!(extract_error_message(r#"{"message":"Bad image"}"#), "Bad image");
    assert_eq!(extract_error_message(r#"{"error":"Quota exceeded"}"#), "Quota exceeded");
    assert_eq!(extract_error_message("Service Unavailable"), "Service Unavailable");
    assert_eq!(extract_error_message("   "), "Unknown error");
}

#[test]
fn test_client_without_key() {
    let client = SessionClient::with_api_key("http://localhost:3000/api/", None).unwrap();
    assert!(!client.has_api_key());
    assert_eq!(client.base_url(), "http://localhost:3000/api");
}
