#![allow(dead_code)]

use axum::{
    extract::Path,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use uuid::Uuid;
use vision_service::config::VisionConfig;
use vision_service::services::providers::mock::MockProvider;
use vision_service::services::ConversationStore;
use vision_service::startup::Application;

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nnot-really-a-png";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub store: ConversationStore,
    pub provider: Arc<MockProvider>,
    pub download_dir: PathBuf,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let download_dir = std::env::temp_dir().join(format!("vision-test-{}", Uuid::new_v4()));
        let config = VisionConfig::with_api_key("test-api-key", download_dir.clone());
        let provider = Arc::new(MockProvider::new());

        let app = Application::build_with_providers(config, provider.clone(), provider.clone())
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let store = app.store();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            store,
            provider,
            download_dir,
            client,
        }
    }

    /// Call the vision endpoint with the given query parameters.
    pub async fn vision(&self, query: &[(&str, &str)]) -> reqwest::Response {
        self.client
            .get(format!("{}/api/gemini_vision", self.address))
            .query(query)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .expect("Failed to send request")
    }

    /// Cleanup downloaded images.
    pub async fn cleanup(&self) {
        let _ = tokio::fs::remove_dir_all(&self.download_dir).await;
    }
}

/// Serves fixed image bytes under `/images/{name}` and `dir`-specific bytes
/// (`"{dir}-bytes"`) under `/images/{dir}/{name}`; names starting with
/// `missing` are a 404.
pub struct ImageServer {
    pub address: String,
}

impl ImageServer {
    pub async fn spawn() -> Self {
        async fn image(Path(name): Path<String>) -> impl IntoResponse {
            if name.starts_with("missing") {
                return StatusCode::NOT_FOUND.into_response();
            }
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "image/png")],
                PNG_BYTES,
            )
                .into_response()
        }

        async fn nested_image(Path((dir, name)): Path<(String, String)>) -> impl IntoResponse {
            if name.starts_with("missing") {
                return StatusCode::NOT_FOUND.into_response();
            }
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "image/png")],
                format!("{}-bytes", dir),
            )
                .into_response()
        }

        let router = Router::new()
            .route("/images/:name", get(image))
            .route("/images/:dir/:name", get(nested_image));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind image server");
        let address = format!(
            "http://127.0.0.1:{}",
            listener.local_addr().expect("No local address").port()
        );

        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        ImageServer { address }
    }

    pub fn url(&self, name: &str) -> String {
        format!("{}/images/{}", self.address, name)
    }
}
