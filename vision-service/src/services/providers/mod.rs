//! AI provider abstractions and implementations.
//!
//! The relay needs two capabilities from a model provider: registering a
//! local file so later turns can reference it, and continuing a chat from a
//! full history. Each is a trait so the Gemini backend can be swapped for the
//! mock in tests.

pub mod gemini;
pub mod mock;

use crate::models::Turn;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Content filtered")]
    ContentFiltered,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
}

impl ProviderError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::ApiError(_) => "api_error",
            ProviderError::InvalidRequest(_) => "invalid_request",
            ProviderError::RateLimited => "rate_limited",
            ProviderError::ContentFiltered => "content_filtered",
            ProviderError::NetworkError(_) => "network_error",
            ProviderError::FileError(_) => "file_error",
        }
    }
}

/// A file registered with the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Provider resource name (e.g., `files/abc123`).
    pub name: String,

    /// URI to reference the file from a conversation turn.
    pub uri: String,

    /// Media type the file was registered with.
    pub mime_type: String,

    pub display_name: String,
}

/// Generated reply for a chat call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,

    /// Input tokens consumed.
    pub input_tokens: i32,

    /// Output tokens generated.
    pub output_tokens: i32,
}

/// Sampling configuration sent with every chat call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: i32,
    pub max_output_tokens: i32,
    pub response_mime_type: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 0.95,
            top_k: 64,
            max_output_tokens: 8192,
            response_mime_type: "text/plain".to_string(),
        }
    }
}

/// Registers local files with the provider.
#[async_trait]
pub trait AssetUploader: Send + Sync {
    /// Upload the file at `path` as `mime_type`. Single attempt.
    async fn upload(&self, path: &Path, mime_type: &str) -> Result<UploadedFile, ProviderError>;
}

/// Multi-turn chat generation (e.g., Gemini).
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Generate the next model reply for `history`, whose last turn is the
    /// user message being answered.
    async fn generate(
        &self,
        history: &[Turn],
        settings: &GenerationSettings,
    ) -> Result<ChatReply, ProviderError>;

    /// Health check.
    async fn health_check(&self) -> Result<(), ProviderError>;
}
