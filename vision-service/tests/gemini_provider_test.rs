//! Wire-level tests for the Gemini provider against an in-process stub of
//! the REST API.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use secrecy::Secret;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use vision_service::models::{Part, Turn};
use vision_service::services::providers::gemini::{GeminiConfig, GeminiProvider};
use vision_service::services::providers::{
    AssetUploader, ChatProvider, GenerationSettings, ProviderError,
};

const API_KEY: &str = "test-key";

#[derive(Clone, Default)]
struct Stub {
    address: String,
    upload_starts: Arc<Mutex<Vec<(Value, HeaderMap)>>>,
    uploaded_bytes: Arc<Mutex<Vec<Bytes>>>,
    generate_requests: Arc<Mutex<Vec<Value>>>,
}

fn key_ok(headers: &HeaderMap) -> bool {
    headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) == Some(API_KEY)
}

async fn start_upload(
    State(stub): State<Stub>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !key_ok(&headers) || query.contains_key("key") {
        return StatusCode::FORBIDDEN.into_response();
    }
    stub.upload_starts.lock().unwrap().push((body, headers));
    (
        [(
            "x-goog-upload-url",
            format!("{}/upload-session/1", stub.address),
        )],
        "",
    )
        .into_response()
}

async fn finalize_upload(State(stub): State<Stub>, headers: HeaderMap, body: Bytes) -> Response {
    let command = headers
        .get("x-goog-upload-command")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if command != "upload, finalize" {
        return StatusCode::BAD_REQUEST.into_response();
    }
    stub.uploaded_bytes.lock().unwrap().push(body);
    Json(json!({
        "file": {
            "name": "files/abc123",
            "displayName": "cat.png",
            "mimeType": "image/png",
            "uri": "https://generativelanguage.test/v1beta/files/abc123",
            "state": "ACTIVE"
        }
    }))
    .into_response()
}

async fn generate(
    State(stub): State<Stub>,
    Path(target): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !key_ok(&headers) || query.contains_key("key") {
        return StatusCode::FORBIDDEN.into_response();
    }
    stub.generate_requests.lock().unwrap().push(body);

    if target.starts_with("limited-model") {
        return (StatusCode::TOO_MANY_REQUESTS, "quota exceeded").into_response();
    }
    if target.starts_with("blocked-model") {
        return Json(json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        }))
        .into_response();
    }

    Json(json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": "A cat" }, { "text": " on a mat." }] },
            "finishReason": "STOP"
        }],
        "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 5, "totalTokenCount": 17 }
    }))
    .into_response()
}

async fn spawn_stub() -> Stub {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let stub = Stub {
        address: format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port()),
        ..Default::default()
    };

    let router = Router::new()
        .route("/upload/v1beta/files", post(start_upload))
        .route("/upload-session/1", post(finalize_upload))
        .route("/v1beta/models/:target", post(generate))
        .with_state(stub.clone());

    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    stub
}

fn provider(stub: &Stub, model: &str) -> GeminiProvider {
    GeminiProvider::new(GeminiConfig {
        api_key: Secret::new(API_KEY.to_string()),
        model: model.to_string(),
        api_base: stub.address.clone(),
    })
    .unwrap()
}

#[tokio::test]
async fn upload_uses_resumable_protocol_and_returns_file_uri() {
    let stub = spawn_stub().await;
    let dir = std::env::temp_dir().join(format!("gemini-upload-{}", std::process::id()));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let path = dir.join("cat.png");
    tokio::fs::write(&path, b"image-bytes").await.unwrap();

    let uploaded = provider(&stub, "gemini-1.5-pro")
        .upload(&path, "image/png")
        .await
        .unwrap();

    assert_eq!(
        uploaded.uri,
        "https://generativelanguage.test/v1beta/files/abc123"
    );
    assert_eq!(uploaded.name, "files/abc123");
    assert_eq!(uploaded.mime_type, "image/png");

    let starts = stub.upload_starts.lock().unwrap().clone();
    assert_eq!(starts.len(), 1);
    let (body, headers) = &starts[0];
    assert_eq!(body, &json!({ "file": { "displayName": "cat.png" } }));
    assert_eq!(headers["x-goog-upload-protocol"], "resumable");
    assert_eq!(headers["x-goog-upload-command"], "start");
    assert_eq!(headers["x-goog-upload-header-content-length"], "11");
    assert_eq!(headers["x-goog-upload-header-content-type"], "image/png");

    let bytes = stub.uploaded_bytes.lock().unwrap().clone();
    assert_eq!(bytes, vec![Bytes::from_static(b"image-bytes")]);

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn upload_of_missing_file_fails_without_calling_api() {
    let stub = spawn_stub().await;

    let err = provider(&stub, "gemini-1.5-pro")
        .upload(std::path::Path::new("/nonexistent/cat.png"), "image/png")
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::FileError(_)));
    assert!(stub.upload_starts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn generate_sends_full_history_with_fixed_settings() {
    let stub = spawn_stub().await;
    let history = vec![
        Turn::user(vec![Part::text("hello")]),
        Turn::model("hi!"),
        Turn::user(vec![
            Part::asset("https://generativelanguage.test/v1beta/files/abc123", "image/png"),
            Part::text("what is this?"),
        ]),
    ];

    let reply = provider(&stub, "gemini-1.5-pro")
        .generate(&history, &GenerationSettings::default())
        .await
        .unwrap();

    assert_eq!(reply.text, "A cat on a mat.");
    assert_eq!(reply.input_tokens, 12);
    assert_eq!(reply.output_tokens, 5);

    let requests = stub.generate_requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    let body = &requests[0];
    assert_eq!(body["contents"].as_array().unwrap().len(), 3);
    assert_eq!(body["contents"][1]["role"], "model");
    assert_eq!(
        body["contents"][2]["parts"][0]["fileData"]["fileUri"],
        "https://generativelanguage.test/v1beta/files/abc123"
    );
    assert_eq!(body["contents"][2]["parts"][1]["text"], "what is this?");
    assert_eq!(body["generationConfig"]["topK"], 64);
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
    assert_eq!(body["generationConfig"]["responseMimeType"], "text/plain");
}

#[tokio::test]
async fn too_many_requests_maps_to_rate_limited() {
    let stub = spawn_stub().await;

    let err = provider(&stub, "limited-model")
        .generate(
            &[Turn::user(vec![Part::text("hello")])],
            &GenerationSettings::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::RateLimited));
}

#[tokio::test]
async fn safety_block_maps_to_content_filtered() {
    let stub = spawn_stub().await;

    let err = provider(&stub, "blocked-model")
        .generate(
            &[Turn::user(vec![Part::text("hello")])],
            &GenerationSettings::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::ContentFiltered));
}

#[tokio::test]
async fn wrong_key_surfaces_api_error() {
    let stub = spawn_stub().await;
    let provider = GeminiProvider::new(GeminiConfig {
        api_key: Secret::new("wrong".to_string()),
        model: "gemini-1.5-pro".to_string(),
        api_base: stub.address.clone(),
    })
    .unwrap();

    let err = provider
        .generate(
            &[Turn::user(vec![Part::text("hello")])],
            &GenerationSettings::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::ApiError(_)));
}

#[tokio::test]
async fn transport_errors_do_not_leak_api_key() {
    let provider = GeminiProvider::new(GeminiConfig {
        api_key: Secret::new("SUPER-SECRET-KEY".to_string()),
        model: "gemini-1.5-pro".to_string(),
        api_base: "http://127.0.0.1:1".to_string(),
    })
    .unwrap();

    let err = provider
        .generate(&[Turn::user(vec![Part::text("hi")])], &GenerationSettings::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::NetworkError(_)), "got {err:?}");
    assert!(!err.to_string().contains("SUPER-SECRET-KEY"), "{err}");
    assert!(!format!("{err:?}").contains("SUPER-SECRET-KEY"));

    let err = provider.health_check().await.unwrap_err();
    assert!(!err.to_string().contains("SUPER-SECRET-KEY"), "{err}");

    let path = std::env::temp_dir().join(format!("leak-check-{}.png", std::process::id()));
    tokio::fs::write(&path, b"png").await.unwrap();
    let err = provider.upload(&path, "image/png").await.unwrap_err();
    tokio::fs::remove_file(&path).await.ok();
    assert!(matches!(err, ProviderError::NetworkError(_)), "got {err:?}");
    assert!(!err.to_string().contains("SUPER-SECRET-KEY"), "{err}");
}
