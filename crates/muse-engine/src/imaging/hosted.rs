use std::time::Duration;

use anyhow::{bail, Context, Result};
use image::DynamicImage;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use tracing::debug;

use super::{DiffusionPipeline, PipelineLoader, PipelineSpec, RenderParams};
use crate::truncate_text;

/// Outcome of one call to a hosted inference endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostedResponse {
    Image(Vec<u8>),
    Failed { status: u16, body: String },
}

/// Posts `payload` with a bearer token. HTTP 200 carries raw image bytes;
/// any other status carries the error body.
pub fn post_inference(
    http: &HttpClient,
    endpoint: &str,
    token: &str,
    payload: &Value,
) -> Result<HostedResponse> {
    let response = http
        .post(endpoint)
        .bearer_auth(token)
        .json(payload)
        .send()
        .with_context(|| format!("Hugging Face request failed ({endpoint})"))?;
    let status = response.status();
    if status.as_u16() == 200 {
        let bytes = response
            .bytes()
            .context("Hugging Face response body read failed")?;
        return Ok(HostedResponse::Image(bytes.to_vec()));
    }
    let body = response
        .text()
        .context("Hugging Face response body read failed")?;
    Ok(HostedResponse::Failed {
        status: status.as_u16(),
        body,
    })
}

/// Hugging Face inference endpoint running the diffusion model remotely.
pub struct HostedLoader {
    token: Option<String>,
    api_base: String,
}

impl HostedLoader {
    pub fn new(token: Option<String>, api_base: impl Into<String>) -> Self {
        Self {
            token,
            api_base: api_base.into(),
        }
    }

    pub fn endpoint_for_model(&self, model_id: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), model_id.trim())
    }
}

impl PipelineLoader for HostedLoader {
    fn name(&self) -> &str {
        "hosted"
    }

    fn load(&self, spec: &PipelineSpec) -> Result<Box<dyn DiffusionPipeline>> {
        let Some(token) = self.token.clone() else {
            bail!("HUGGING_FACE_API not set");
        };
        let http = HttpClient::builder()
            .timeout(None::<Duration>)
            .build()
            .context("failed to build Hugging Face HTTP client")?;
        debug!(
            scheduler = %spec.scheduler,
            attention_slicing = spec.attention_slicing,
            "scheduler and attention slicing are applied by the hosted endpoint"
        );
        Ok(Box::new(HostedPipeline {
            http,
            endpoint: self.endpoint_for_model(&spec.model_id),
            token,
        }))
    }
}

struct HostedPipeline {
    http: HttpClient,
    endpoint: String,
    token: String,
}

impl DiffusionPipeline for HostedPipeline {
    fn render(&self, prompt: &str, params: &RenderParams) -> Result<DynamicImage> {
        let payload = render_payload(prompt, params);
        match post_inference(&self.http, &self.endpoint, &self.token, &payload)? {
            HostedResponse::Image(bytes) => image::load_from_memory(&bytes)
                .context("Hugging Face returned bytes that are not an image"),
            HostedResponse::Failed { status, body } => bail!(
                "Hugging Face request failed ({status}): {}",
                truncate_text(&body, 512)
            ),
        }
    }
}

fn render_payload(prompt: &str, params: &RenderParams) -> Value {
    json!({
        "inputs": prompt,
        "parameters": {
            "width": params.width,
            "height": params.height,
            "num_inference_steps": params.num_inference_steps,
            "guidance_scale": params.guidance_scale,
        },
    })
}
