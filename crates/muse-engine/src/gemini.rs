use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::config::{Config, GenerationSettings};
use crate::media::ImageAttachment;
use crate::response_json_or_error;

pub const CONNECTION_TEST_PROMPT: &str = "Test connection";

/// One turn in the Gemini wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: "user".to_string(),
            parts,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::user(vec![Part::text(text)])
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn image(attachment: &ImageAttachment) -> Self {
        Part::InlineData {
            inline_data: Blob {
                mime_type: attachment.mime_type.clone(),
                data: BASE64.encode(&attachment.bytes),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

/// Seam between the chat session and the hosted model.
pub trait ContentGenerator {
    fn generate_content(&self, model: &str, contents: &[Content]) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub supported_generation_methods: Vec<String>,
}

impl ModelInfo {
    pub fn supports(&self, method: &str) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|item| item == method)
    }
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_base: String,
    api_key: String,
    generation: GenerationSettings,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self> {
        // No request timeout: a slow reply blocks the turn.
        let http = HttpClient::builder()
            .timeout(None::<Duration>)
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            api_base: config.gemini_api_base.clone(),
            api_key: config.gemini_api_key.clone(),
            generation: config.generation.clone(),
            http,
        })
    }

    pub fn endpoint_for_model(&self, model: &str) -> String {
        format!("{}/{}:generateContent", self.api_base, model_path(model))
    }

    /// One-shot request used at startup to confirm the key and model work.
    pub fn check_connection(&self, model: &str) -> bool {
        match self.generate_content(model, &[Content::user_text(CONNECTION_TEST_PROMPT)]) {
            Ok(_) => {
                info!("Gemini API initialized successfully");
                true
            }
            Err(err) => {
                error!("Failed to initialize Gemini API: {err:#}");
                false
            }
        }
    }

    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let endpoint = format!("{}/models", self.api_base);
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("key", self.api_key.clone())];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }
            let response = self
                .http
                .get(&endpoint)
                .query(&query)
                .send()
                .with_context(|| format!("Gemini request failed ({endpoint})"))?;
            let payload = response_json_or_error("Gemini", response)?;
            models.extend(parse_model_list(&payload));
            page_token = payload
                .get("nextPageToken")
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }
        Ok(models)
    }
}

impl ContentGenerator for GeminiClient {
    fn generate_content(&self, model: &str, contents: &[Content]) -> Result<String> {
        let endpoint = self.endpoint_for_model(model);
        let payload = build_payload(contents, &self.generation);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Gemini", response)?;
        extract_text(&response_payload)
    }
}

fn model_path(model: &str) -> String {
    let trimmed = model.trim();
    if trimmed.starts_with("models/") {
        trimmed.to_string()
    } else {
        format!("models/{trimmed}")
    }
}

pub(crate) fn build_payload(contents: &[Content], settings: &GenerationSettings) -> Value {
    json!({
        "contents": contents,
        "generationConfig": {
            "maxOutputTokens": settings.max_output_tokens,
            "temperature": settings.temperature,
            "topP": settings.top_p,
            "topK": settings.top_k,
        },
    })
}

pub(crate) fn extract_text(response_payload: &Value) -> Result<String> {
    let parts = response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let text = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<&str>>()
        .join("");
    if !text.is_empty() {
        return Ok(text);
    }

    if let Some(reason) = response_payload
        .get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
    {
        bail!("Gemini blocked the prompt ({reason})");
    }
    if let Some(reason) = response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("finishReason"))
        .and_then(Value::as_str)
    {
        bail!("Gemini returned no text (finish reason {reason})");
    }
    bail!("Gemini returned no text")
}

fn parse_model_list(payload: &Value) -> Vec<ModelInfo> {
    payload
        .get("models")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|row| {
            let name = row.get("name").and_then(Value::as_str)?.to_string();
            let supported_generation_methods = row
                .get("supportedGenerationMethods")
                .and_then(Value::as_array)
                .map(|methods| {
                    methods
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            Some(ModelInfo {
                name,
                supported_generation_methods,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        build_payload, extract_text, model_path, parse_model_list, Content, GeminiClient, Part,
    };
    use crate::config::{Config, GenerationSettings};
    use crate::media::ImageAttachment;

    fn config() -> Config {
        Config::from_lookup(|key| match key {
            "GEMINI_API_KEY" => Some("test-key".to_string()),
            "GEMINI_API_BASE" => Some("http://127.0.0.1:9/v1beta".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn endpoint_accepts_bare_and_prefixed_model_names() -> anyhow::Result<()> {
        let client = GeminiClient::new(&config())?;
        assert_eq!(
            client.endpoint_for_model("models/gemini-1.5-flash"),
            "http://127.0.0.1:9/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert_eq!(
            client.endpoint_for_model(" gemini-1.5-flash "),
            "http://127.0.0.1:9/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert_eq!(model_path("models/x"), "models/x");
        Ok(())
    }

    #[test]
    fn payload_serializes_text_and_inline_image_parts() {
        let attachment = ImageAttachment::png(vec![1, 2, 3]);
        let contents = vec![
            Content::user_text("hi"),
            Content::model_text("hello"),
            Content::user(vec![Part::text("what is this?"), Part::image(&attachment)]),
        ];
        let payload = build_payload(&contents, &GenerationSettings::default());
        assert_eq!(
            payload,
            json!({
                "contents": [
                    {"role": "user", "parts": [{"text": "hi"}]},
                    {"role": "model", "parts": [{"text": "hello"}]},
                    {"role": "user", "parts": [
                        {"text": "what is this?"},
                        {"inlineData": {"mimeType": "image/png", "data": "AQID"}}
                    ]}
                ],
                "generationConfig": {
                    "maxOutputTokens": 800,
                    "temperature": 0.9,
                    "topP": 1.0,
                    "topK": 1
                }
            })
        );
    }

    #[test]
    fn history_deserializes_from_wire_shape() -> anyhow::Result<()> {
        let parsed: Content = serde_json::from_value(json!({
            "role": "user",
            "parts": [{"text": "a"}, {"inlineData": {"mimeType": "image/png", "data": "AQID"}}]
        }))?;
        assert_eq!(parsed.parts.len(), 2);
        assert_eq!(parsed.parts[0], Part::text("a"));
        assert!(matches!(parsed.parts[1], Part::InlineData { .. }));
        Ok(())
    }

    #[test]
    fn extract_text_joins_candidate_parts() -> anyhow::Result<()> {
        let payload = json!({
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "Hello, "}, {"text": "world"}]}},
                {"content": {"role": "model", "parts": [{"text": "ignored"}]}}
            ]
        });
        assert_eq!(extract_text(&payload)?, "Hello, world");
        Ok(())
    }

    #[test]
    fn extract_text_reports_block_reason() {
        let payload = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = extract_text(&payload).unwrap_err();
        assert_eq!(err.to_string(), "Gemini blocked the prompt (SAFETY)");
    }

    #[test]
    fn extract_text_reports_finish_reason_without_text() {
        let payload = json!({"candidates": [{"finishReason": "MAX_TOKENS", "content": {"parts": []}}]});
        let err = extract_text(&payload).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Gemini returned no text (finish reason MAX_TOKENS)"
        );
    }

    #[test]
    fn model_list_parses_methods() {
        let payload = json!({
            "models": [
                {"name": "models/gemini-1.5-flash", "supportedGenerationMethods": ["generateContent", "countTokens"]},
                {"name": "models/embedding-001", "supportedGenerationMethods": ["embedContent"]},
                {"displayName": "nameless"}
            ]
        });
        let models = parse_model_list(&payload);
        assert_eq!(models.len(), 2);
        assert!(models[0].supports("generateContent"));
        assert!(!models[1].supports("generateContent"));
    }

    #[test]
    fn unreachable_endpoint_fails_connection_check() -> anyhow::Result<()> {
        let client = GeminiClient::new(&config())?;
        assert!(!client.check_connection("models/gemini-1.5-flash"));
        Ok(())
    }
}
