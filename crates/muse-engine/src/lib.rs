pub mod chat;
pub mod config;
pub mod gemini;
pub mod imaging;
pub mod media;
pub mod session;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Response as HttpResponse;
use serde_json::{Map, Value};

pub use chat::ChatSession;
pub use config::{Config, ConfigError, GenerationSettings};
pub use gemini::{ContentGenerator, GeminiClient, ModelInfo};
pub use imaging::{ImageGenerator, ImageOutput};
pub use media::ImageAttachment;
pub use session::{Session, UiFlags};

pub(crate) fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    serde_json::from_str(&body).with_context(|| format!("{provider} returned invalid JSON payload"))
}

pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
