//! Mock provider implementation for testing.

use super::{
    AssetUploader, ChatProvider, ChatReply, GenerationSettings, ProviderError, UploadedFile,
};
use crate::models::Turn;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Mock provider that records what it was asked and replies deterministically.
#[derive(Default)]
pub struct MockProvider {
    fail_uploads: AtomicBool,
    fail_generations: AtomicBool,
    upload_count: AtomicUsize,
    uploads: Mutex<Vec<(PathBuf, String)>>,
    histories: Mutex<Vec<Vec<Turn>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent uploads fail.
    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent generations fail.
    pub fn fail_generations(&self, fail: bool) {
        self.fail_generations.store(fail, Ordering::SeqCst);
    }

    /// Every `(path, mime_type)` passed to `upload`, in call order.
    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.uploads.lock().map(|u| u.clone()).unwrap_or_default()
    }

    /// Every history passed to `generate`, in call order.
    pub fn histories(&self) -> Vec<Vec<Turn>> {
        self.histories.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// The reply `generate` produces for a given prompt text.
    pub fn reply_for(text: &str) -> String {
        format!("Mock response for: {}", text)
    }
}

#[async_trait]
impl AssetUploader for MockProvider {
    async fn upload(&self, path: &Path, mime_type: &str) -> Result<UploadedFile, ProviderError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(ProviderError::ApiError("Mock upload failure".to_string()));
        }

        // The file must exist, as it would for a real upload
        tokio::fs::metadata(path).await?;

        if let Ok(mut uploads) = self.uploads.lock() {
            uploads.push((path.to_path_buf(), mime_type.to_string()));
        }

        let n = self.upload_count.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(UploadedFile {
            name: format!("files/mock-{}", n),
            uri: format!("mock://files/mock-{}", n),
            mime_type: mime_type.to_string(),
            display_name: path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("image")
                .to_string(),
        })
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    async fn generate(
        &self,
        history: &[Turn],
        _settings: &GenerationSettings,
    ) -> Result<ChatReply, ProviderError> {
        if let Ok(mut histories) = self.histories.lock() {
            histories.push(history.to_vec());
        }

        if self.fail_generations.load(Ordering::SeqCst) {
            return Err(ProviderError::ApiError("Mock generation failure".to_string()));
        }

        let prompt = history
            .last()
            .and_then(|turn| turn.parts.iter().rev().find_map(|p| p.as_text()))
            .unwrap_or_default();

        Ok(ChatReply {
            text: Self::reply_for(prompt),
            input_tokens: prompt.len() as i32 / 4,
            output_tokens: 10,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
