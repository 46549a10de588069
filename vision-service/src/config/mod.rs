use crate::services::providers::GenerationSettings;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;

/// Media type assumed for downloaded images that carry no usable content type.
pub const DEFAULT_IMAGE_MIME_TYPE: &str = "image/jpeg";

const DEFAULT_MODEL: &str = "gemini-1.5-pro";
const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub common: core_config::Config,
    pub google: GoogleConfig,
    pub models: ModelConfig,
    pub images: ImageConfig,
}

#[derive(Clone)]
pub struct GoogleConfig {
    pub api_key: Secret<String>,
}

impl std::fmt::Debug for GoogleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleConfig")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Gemini model used for every chat call (e.g., gemini-1.5-pro)
    pub model: String,
    /// Base URL of the Gemini REST API
    pub api_base: String,
    /// Sampling configuration shared by all users and calls
    pub generation: GenerationSettings,
}

#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// Directory downloaded images are written to
    pub download_dir: PathBuf,
    pub default_mime_type: String,
}

impl VisionConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";
        let temp_dir = env::temp_dir();

        Ok(VisionConfig {
            common: common_config,
            google: GoogleConfig {
                api_key: Secret::new(get_env("GEMINI_API_KEY", None, is_prod)?),
            },
            models: ModelConfig {
                model: get_env("GEMINI_MODEL", Some(DEFAULT_MODEL), is_prod)?,
                api_base: get_env("GEMINI_API_BASE", Some(DEFAULT_API_BASE), is_prod)?,
                generation: GenerationSettings::default(),
            },
            images: ImageConfig {
                download_dir: PathBuf::from(get_env(
                    "IMAGE_DOWNLOAD_DIR",
                    temp_dir.to_str(),
                    is_prod,
                )?),
                default_mime_type: DEFAULT_IMAGE_MIME_TYPE.to_string(),
            },
        })
    }

    /// Configuration for tests and embedding: random port, default model,
    /// images written to `download_dir`.
    pub fn with_api_key(api_key: &str, download_dir: PathBuf) -> Self {
        VisionConfig {
            common: core_config::Config { port: 0 },
            google: GoogleConfig {
                api_key: Secret::new(api_key.to_string()),
            },
            models: ModelConfig {
                model: DEFAULT_MODEL.to_string(),
                api_base: DEFAULT_API_BASE.to_string(),
                generation: GenerationSettings::default(),
            },
            images: ImageConfig {
                download_dir,
                default_mime_type: DEFAULT_IMAGE_MIME_TYPE.to_string(),
            },
        }
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}
