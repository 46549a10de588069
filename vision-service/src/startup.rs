//! Application startup and lifecycle management.
//!
//! Wires the conversation store, image fetcher and Gemini provider into the
//! chat orchestrator and serves the HTTP API.

use crate::config::VisionConfig;
use crate::handlers::{
    health::{health_check, readiness_check},
    metrics::metrics,
    vision::gemini_vision,
};
use crate::services::providers::gemini::{GeminiConfig, GeminiProvider};
use crate::services::providers::{AssetUploader, ChatProvider};
use crate::services::{
    metrics as service_metrics, ChatOrchestrator, ConversationStore, ImageFetcher,
};
use axum::{middleware::from_fn, routing::get, Router};
use service_core::error::AppError;
use service_core::middleware::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: VisionConfig,
    pub orchestrator: ChatOrchestrator,
    pub chat_provider: Arc<dyn ChatProvider>,
}

impl AppState {
    /// Build state around the given providers with a fresh conversation store.
    pub fn new(
        config: VisionConfig,
        uploader: Arc<dyn AssetUploader>,
        chat_provider: Arc<dyn ChatProvider>,
    ) -> Result<Self, AppError> {
        let fetcher = ImageFetcher::new(config.images.download_dir.clone())
            .map_err(|e| AppError::InternalError(anyhow::Error::new(e)))?;

        let orchestrator = ChatOrchestrator::new(
            ConversationStore::new(),
            fetcher,
            uploader,
            chat_provider.clone(),
            config.models.generation.clone(),
            config.images.default_mime_type.clone(),
        );

        Ok(Self {
            config,
            orchestrator,
            chat_provider,
        })
    }

    pub fn store(&self) -> &ConversationStore {
        self.orchestrator.store()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/gemini_vision", get(gemini_vision))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the Gemini provider.
    pub async fn build(config: VisionConfig) -> Result<Self, AppError> {
        let provider = Arc::new(
            GeminiProvider::new(GeminiConfig {
                api_key: config.google.api_key.clone(),
                model: config.models.model.clone(),
                api_base: config.models.api_base.clone(),
            })
            .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?,
        );

        tracing::info!(
            model = %provider.model(),
            "Initialized Gemini provider"
        );

        Self::build_with_providers(config, provider.clone(), provider).await
    }

    /// Build the application around caller-supplied providers.
    pub async fn build_with_providers(
        config: VisionConfig,
        uploader: Arc<dyn AssetUploader>,
        chat_provider: Arc<dyn ChatProvider>,
    ) -> Result<Self, AppError> {
        service_metrics::init_metrics();

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let state = AppState::new(config, uploader, chat_provider)?;

        // Port 0 = random port for testing
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port = port,
            download_dir = %state.config.images.download_dir.display(),
            "Vision service listening"
        );

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a handle to the conversation store.
    pub fn store(&self) -> ConversationStore {
        self.state.store().clone()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);

        axum::serve(self.listener, router).await.map_err(|e| {
            tracing::error!("HTTP server error: {}", e);
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }

    /// Run the application until `shutdown` resolves.
    pub async fn run_with_graceful_shutdown<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = build_router(self.state);

        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| {
                tracing::error!("HTTP server error: {}", e);
                std::io::Error::other(format!("HTTP server error: {}", e))
            })
    }
}
