//! Chat orchestration: image download → upload → history → model → history.
//!
//! The user turn is appended only once it is fully built, so a failed
//! download or upload leaves the history untouched. A failed model call
//! happens after the user turn was appended; that turn stays in the history
//! without a matching model turn.

use crate::models::{Part, Turn};
use crate::services::conversation_store::ConversationStore;
use crate::services::image_fetcher::{FetchError, ImageFetcher};
use crate::services::metrics;
use crate::services::providers::{AssetUploader, ChatProvider, GenerationSettings, ProviderError};
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

pub const MISSING_USER_ID: &str = "user_id parameter not provided";
pub const MISSING_TEXT: &str = "Text or image_url parameter not provided";

const DOWNLOAD_FAILED: &str = "Failed to download image";
const UPLOAD_FAILED: &str = "Failed to upload image";
const PROCESSING_FAILED: &str = "An error occurred while processing your request";

/// Failures of a chat request.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    InvalidRequest(&'static str),

    #[error("Image download failed: {0}")]
    Download(#[from] FetchError),

    #[error("Image upload failed: {0}")]
    Upload(#[source] ProviderError),

    #[error("Model invocation failed: {0}")]
    Provider(#[source] ProviderError),
}

impl ChatError {
    /// Message returned to HTTP callers; never includes upstream details.
    pub fn public_message(&self) -> &'static str {
        match self {
            ChatError::InvalidRequest(msg) => *msg,
            ChatError::Download(_) => DOWNLOAD_FAILED,
            ChatError::Upload(_) => UPLOAD_FAILED,
            ChatError::Provider(_) => PROCESSING_FAILED,
        }
    }

    /// Metrics label.
    pub fn outcome(&self) -> &'static str {
        match self {
            ChatError::InvalidRequest(_) => "invalid_request",
            ChatError::Download(_) => "download_error",
            ChatError::Upload(_) => "upload_error",
            ChatError::Provider(_) => "provider_error",
        }
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::InvalidRequest(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            other => AppError::ProcessingError(other.public_message().to_string()),
        }
    }
}

/// Runs one chat exchange for a user against the shared conversation store.
#[derive(Clone)]
pub struct ChatOrchestrator {
    store: ConversationStore,
    fetcher: ImageFetcher,
    uploader: Arc<dyn AssetUploader>,
    chat: Arc<dyn ChatProvider>,
    settings: GenerationSettings,
    default_mime_type: String,
}

impl ChatOrchestrator {
    pub fn new(
        store: ConversationStore,
        fetcher: ImageFetcher,
        uploader: Arc<dyn AssetUploader>,
        chat: Arc<dyn ChatProvider>,
        settings: GenerationSettings,
        default_mime_type: impl Into<String>,
    ) -> Self {
        Self {
            store,
            fetcher,
            uploader,
            chat,
            settings,
            default_mime_type: default_mime_type.into(),
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Handle a request and return the model's reply text.
    ///
    /// `text` is required. When `image_url` is also given the image is
    /// downloaded and uploaded first, and the user turn becomes
    /// `[asset, text]`. Empty strings count as absent.
    pub async fn handle(
        &self,
        user_id: &str,
        text: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<String, ChatError> {
        let result = self.run(user_id, text, image_url).await;

        match &result {
            Ok(_) => metrics::record_vision_request("ok"),
            Err(e) => {
                metrics::record_vision_request(e.outcome());
                if !matches!(e, ChatError::InvalidRequest(_)) {
                    tracing::error!(user_id = %user_id, error = %e, "Error processing request");
                }
            }
        }

        result
    }

    async fn run(
        &self,
        user_id: &str,
        text: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<String, ChatError> {
        if user_id.is_empty() {
            return Err(ChatError::InvalidRequest(MISSING_USER_ID));
        }

        let history = self.store.get_or_create(user_id);
        metrics::set_conversations_active(self.store.len());

        let text = text
            .filter(|t| !t.is_empty())
            .ok_or(ChatError::InvalidRequest(MISSING_TEXT))?;
        let image_url = image_url.filter(|u| !u.is_empty());

        let parts = match image_url {
            Some(url) => {
                let asset = self.upload_image(url).await?;
                vec![asset, Part::text(text)]
            }
            None => vec![Part::text(text)],
        };

        history.push(Turn::user(parts)).await;
        let turns = history.snapshot().await;

        let start = Instant::now();
        let reply = self
            .chat
            .generate(&turns, &self.settings)
            .await
            .map_err(|e| {
                metrics::record_provider_error("generate", e.kind());
                ChatError::Provider(e)
            })?;
        metrics::record_provider_latency("generate", start.elapsed().as_secs_f64());
        metrics::record_tokens(reply.input_tokens, reply.output_tokens);

        history.push(Turn::model(reply.text.clone())).await;

        tracing::info!(
            user_id = %user_id,
            turns = turns.len() + 1,
            reply_len = reply.text.len(),
            "Model replied"
        );

        Ok(reply.text)
    }

    /// Download the image and register it with the provider.
    async fn upload_image(&self, url: &str) -> Result<Part, ChatError> {
        let image = self.fetcher.fetch(url).await?;

        let mime_type = image
            .content_type
            .as_deref()
            .filter(|ct| ct.starts_with("image/"))
            .unwrap_or(&self.default_mime_type);

        let start = Instant::now();
        let uploaded = self
            .uploader
            .upload(&image.path, mime_type)
            .await
            .map_err(|e| {
                metrics::record_provider_error("upload", e.kind());
                ChatError::Upload(e)
            })?;
        metrics::record_provider_latency("upload", start.elapsed().as_secs_f64());

        Ok(Part::asset(uploaded.uri, uploaded.mime_type))
    }
}
