use std::env;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_TEXT_MODEL: &str = "models/gemini-1.5-flash";
pub const DEFAULT_VISION_MODEL: &str = "models/gemini-1.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "models/gemini-2.0-flash-preview-image-generation";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_HUGGING_FACE_API_BASE: &str = "https://api-inference.huggingface.co/models";
pub const DEFAULT_OUTPUT_DIR: &str = "generated_images";
pub const DEFAULT_IMAGE_BACKEND: &str = "hosted";

pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const HUGGING_FACE_API: &str = "HUGGING_FACE_API";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} not found in environment or .env file")]
    MissingCredential(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Sampling settings sent with every Gemini request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub max_output_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_output_tokens: 800,
            temperature: 0.9,
            top_p: 1.0,
            top_k: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub gemini_api_base: String,
    pub hugging_face_api: Option<String>,
    pub hugging_face_api_base: String,
    pub text_model: String,
    pub vision_model: String,
    pub image_model: String,
    pub generation: GenerationSettings,
    pub output_dir: PathBuf,
    pub image_backend: String,
}

impl Config {
    /// Loads `.env` (if any) and then reads the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        load_dotenv();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let hugging_face_api = var(HUGGING_FACE_API);
        if hugging_face_api.is_some() {
            info!("{HUGGING_FACE_API} loaded");
        } else {
            warn!("{HUGGING_FACE_API} not set; hosted image generation will be unavailable");
        }

        let Some(gemini_api_key) = var(GEMINI_API_KEY) else {
            return Err(ConfigError::MissingCredential(GEMINI_API_KEY));
        };
        info!("{GEMINI_API_KEY} loaded");

        let mut generation = GenerationSettings::default();
        if let Some(raw) = var("MUSE_MAX_RESPONSE_TOKENS") {
            generation.max_output_tokens = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "MUSE_MAX_RESPONSE_TOKENS",
                value: raw.clone(),
            })?;
        }
        if let Some(raw) = var("MUSE_TEMPERATURE") {
            generation.temperature = raw
                .parse::<f64>()
                .ok()
                .filter(|value| (0.0..=2.0).contains(value))
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "MUSE_TEMPERATURE",
                    value: raw.clone(),
                })?;
        }

        Ok(Self {
            gemini_api_key,
            gemini_api_base: var("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
            hugging_face_api,
            hugging_face_api_base: var("HUGGING_FACE_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_HUGGING_FACE_API_BASE.to_string()),
            text_model: var("MUSE_TEXT_MODEL").unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            vision_model: var("MUSE_VISION_MODEL")
                .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            image_model: var("MUSE_IMAGE_MODEL")
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            generation,
            output_dir: var("MUSE_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            image_backend: var("MUSE_IMAGE_BACKEND")
                .map(|value| value.to_ascii_lowercase())
                .unwrap_or_else(|| DEFAULT_IMAGE_BACKEND.to_string()),
        })
    }
}

/// Hugging Face token and endpoint base, for callers that never talk to Gemini.
pub fn hugging_face_from_env() -> (Option<String>, String) {
    load_dotenv();
    let token = non_empty_env(HUGGING_FACE_API);
    let base = non_empty_env("HUGGING_FACE_API_BASE")
        .map(|value| value.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_HUGGING_FACE_API_BASE.to_string());
    (token, base)
}

pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(err) if err.not_found() => {}
        Err(err) => warn!("failed to read .env: {err}"),
    }
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
