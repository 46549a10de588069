//! Gemini AI provider implementation.
//!
//! Talks to Google's Gemini REST API: the Files API for registering images
//! and `generateContent` for multi-turn chat.

use super::{
    AssetUploader, ChatProvider, ChatReply, GenerationSettings, ProviderError, UploadedFile,
};
use crate::models::{Part, Turn};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::path::Path;

const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini provider configuration.
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: Secret<String>,
    pub model: String,
    /// Base URL without version suffix, e.g. `https://generativelanguage.googleapis.com`.
    pub api_base: String,
}

/// Gemini provider for file uploads and chat.
pub struct GeminiProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn base(&self) -> &str {
        self.config.api_base.trim_end_matches('/')
    }

    /// Build the API URL for the given model and method.
    fn api_url(&self, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base(), self.config.model, method)
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/v1beta/files", self.base())
    }

    fn api_key(&self) -> &str {
        self.config.api_key.expose_secret()
    }

    /// Convert conversation turns into Gemini contents.
    fn history_to_contents(history: &[Turn]) -> Vec<Content> {
        history
            .iter()
            .map(|turn| Content {
                role: Some(turn.role.as_str().to_string()),
                parts: turn
                    .parts
                    .iter()
                    .map(|part| match part {
                        Part::Text { text } => ContentPart::Text { text: text.clone() },
                        Part::Asset { uri, mime_type } => ContentPart::FileData {
                            file_data: FileData {
                                mime_type: mime_type.clone(),
                                file_uri: uri.clone(),
                            },
                        },
                    })
                    .collect(),
            })
            .collect()
    }

    fn build_generation_config(settings: &GenerationSettings) -> GenerationConfig {
        GenerationConfig {
            temperature: settings.temperature,
            top_p: settings.top_p,
            top_k: settings.top_k,
            max_output_tokens: settings.max_output_tokens,
            response_mime_type: settings.response_mime_type.clone(),
        }
    }
}

/// Transport failure, with the request URL stripped from the message.
fn network_error(e: reqwest::Error) -> ProviderError {
    ProviderError::NetworkError(e.without_url().to_string())
}

/// Body decoding failure, with the request URL stripped from the message.
fn parse_error(e: reqwest::Error) -> ProviderError {
    ProviderError::ApiError(format!("Failed to parse response: {}", e.without_url()))
}

/// Map a non-success response to a provider error.
async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited);
    }

    if status == StatusCode::BAD_REQUEST {
        return Err(ProviderError::InvalidRequest(error_text));
    }

    Err(ProviderError::ApiError(format!(
        "Gemini API error {}: {}",
        status, error_text
    )))
}

#[async_trait]
impl AssetUploader for GeminiProvider {
    async fn upload(&self, path: &Path, mime_type: &str) -> Result<UploadedFile, ProviderError> {
        let bytes = tokio::fs::read(path).await?;
        let display_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();

        tracing::debug!(
            path = %path.display(),
            size = bytes.len(),
            mime_type = %mime_type,
            "Starting Gemini file upload"
        );

        // Resumable protocol: open a session, then send the bytes and finalize.
        let start = self
            .client
            .post(self.upload_url())
            .header(API_KEY_HEADER, self.api_key())
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&StartUploadRequest {
                file: FileMetadata {
                    display_name: display_name.clone(),
                },
            })
            .send()
            .await
            .map_err(network_error)?;
        let start = check_status(start).await?;

        let session_url = start
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ProviderError::ApiError("Upload session URL missing".to_string()))?
            .to_string();

        let response = self
            .client
            .post(&session_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await
            .map_err(network_error)?;
        let response = check_status(response).await?;

        let uploaded: UploadFileResponse = response
            .json()
            .await
            .map_err(parse_error)?;
        let file = uploaded.file;

        let uploaded = UploadedFile {
            name: file.name,
            uri: file.uri,
            mime_type: file.mime_type.unwrap_or_else(|| mime_type.to_string()),
            display_name: file.display_name.unwrap_or(display_name),
        };

        tracing::info!(
            display_name = %uploaded.display_name,
            uri = %uploaded.uri,
            "Uploaded file to Gemini"
        );

        Ok(uploaded)
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    async fn generate(
        &self,
        history: &[Turn],
        settings: &GenerationSettings,
    ) -> Result<ChatReply, ProviderError> {
        if history.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "Conversation history is empty".to_string(),
            ));
        }

        let request = GenerateContentRequest {
            contents: Self::history_to_contents(history),
            generation_config: Self::build_generation_config(settings),
        };

        tracing::debug!(
            model = %self.config.model,
            turns = history.len(),
            "Sending request to Gemini API"
        );

        let response = self
            .client
            .post(self.api_url("generateContent"))
            .header(API_KEY_HEADER, self.api_key())
            .json(&request)
            .send()
            .await
            .map_err(network_error)?;
        let response = check_status(response).await?;

        let api_response: GenerateContentResponse = response
            .json()
            .await
            .map_err(parse_error)?;

        let candidate = api_response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError("Gemini returned no candidates".to_string()))?;

        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            return Err(ProviderError::ContentFiltered);
        }

        let text: String = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text),
                ContentPart::FileData { .. } => None,
            })
            .collect();

        if text.is_empty() {
            return Err(ProviderError::ApiError(
                "Gemini returned an empty reply".to_string(),
            ));
        }

        let usage = api_response.usage_metadata.unwrap_or_default();

        Ok(ChatReply {
            text,
            input_tokens: usage.prompt_token_count.unwrap_or(0),
            output_tokens: usage.candidates_token_count.unwrap_or(0),
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.api_key().is_empty() {
            return Err(ProviderError::NotConfigured(
                "Gemini API key not configured".to_string(),
            ));
        }

        // Listing models verifies the API key works
        let url = format!("{}/v1beta/models", self.base());

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, self.api_key())
            .send()
            .await
            .map_err(network_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProviderError::ApiError(format!(
                "Health check failed: {}",
                response.status()
            )))
        }
    }
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartUploadRequest {
    file: FileMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata {
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct UploadFileResponse {
    file: FileResource,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    name: String,
    uri: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        text: String,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<i32>,
    candidates_token_count: Option<i32>,
}
