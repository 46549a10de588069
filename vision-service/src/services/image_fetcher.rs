//! Downloads remote images to local storage ahead of upload.
//!
//! Files are named after the last path segment of the source URL, so two
//! URLs sharing a basename overwrite each other. Nothing is cleaned up.

use crate::services::metrics;
use futures::StreamExt;
use reqwest::{header::CONTENT_TYPE, Client, StatusCode, Url};
use std::path::PathBuf;
use std::time::Instant;
use tokio::io::AsyncWriteExt;

/// File name used when the URL path has no usable last segment.
const FALLBACK_FILE_NAME: &str = "image";

/// Error type for image downloads.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid image URL: {0}")]
    InvalidUrl(String),

    #[error("Image server responded with status {0}")]
    Status(StatusCode),

    #[error("Image request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to store image: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl(_) => "invalid_url",
            FetchError::Status(_) => "status",
            FetchError::Request(_) => "request",
            FetchError::Io(_) => "io",
        }
    }
}

/// An image written to local storage.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub path: PathBuf,

    /// Media type announced by the server, without parameters.
    pub content_type: Option<String>,

    pub size: u64,
}

/// Streams images over HTTP into a download directory.
#[derive(Clone)]
pub struct ImageFetcher {
    client: Client,
    download_dir: PathBuf,
}

impl ImageFetcher {
    pub fn new(download_dir: impl Into<PathBuf>) -> Result<Self, FetchError> {
        let client = Client::builder().build()?;

        Ok(Self {
            client,
            download_dir: download_dir.into(),
        })
    }

    /// Download `url` and return where it was written.
    pub async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError> {
        let start = Instant::now();

        match self.download(url).await {
            Ok(image) => {
                metrics::record_image_fetch(start.elapsed().as_secs_f64());
                tracing::info!(
                    url = %url,
                    path = %image.path.display(),
                    size = image.size,
                    content_type = ?image.content_type,
                    "Downloaded image"
                );
                Ok(image)
            }
            Err(e) => {
                metrics::record_image_fetch_error(e.kind());
                tracing::warn!(url = %url, error = %e, "Image download failed");
                Err(e)
            }
        }
    }

    async fn download(&self, url: &str) -> Result<FetchedImage, FetchError> {
        let parsed =
            Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;
        let path = self.download_dir.join(file_name_for(&parsed));

        let response = self.client.get(parsed).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty());

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let mut file = tokio::fs::File::create(&path).await?;

        let mut size = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(FetchedImage {
            path,
            content_type,
            size,
        })
    }
}

/// Basename of the URL path.
fn file_name_for(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .unwrap_or(FALLBACK_FILE_NAME)
        .to_string()
}
