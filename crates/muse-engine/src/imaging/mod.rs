mod device;
mod dryrun;
mod hosted;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use image::{DynamicImage, ImageFormat};
use tracing::{error, info};

use crate::config::Config;
use crate::truncate_text;

pub use device::{
    parse_compute_capability, probe_accelerator, select_device, Accelerator, Device,
    DeviceSelection, Precision,
};
pub use dryrun::DryrunLoader;
pub use hosted::{post_inference, HostedLoader, HostedResponse};

pub const DEFAULT_MODEL_ID: &str = "stabilityai/stable-diffusion-2-1";
pub const DEFAULT_SCHEDULER: &str = "DPMSolverMultistepScheduler";
pub const SETUP_FAILED_MESSAGE: &str = "Local image generation setup failed. Please check logs.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParams {
    pub width: u32,
    pub height: u32,
    pub num_inference_steps: u32,
    pub guidance_scale: f64,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            num_inference_steps: 30,
            guidance_scale: 7.5,
        }
    }
}

/// Everything a loader needs to bring a pipeline up.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSpec {
    pub model_id: String,
    pub scheduler: String,
    pub attention_slicing: bool,
    pub device: DeviceSelection,
    pub params: RenderParams,
}

impl PipelineSpec {
    pub fn new(device: DeviceSelection) -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            scheduler: DEFAULT_SCHEDULER.to_string(),
            attention_slicing: true,
            device,
            params: RenderParams::default(),
        }
    }
}

pub trait DiffusionPipeline: Send + Sync {
    fn render(&self, prompt: &str, params: &RenderParams) -> Result<DynamicImage>;
}

pub trait PipelineLoader {
    fn name(&self) -> &str;
    fn load(&self, spec: &PipelineSpec) -> Result<Box<dyn DiffusionPipeline>>;
}

#[derive(Default)]
pub struct PipelineLoaderRegistry {
    loaders: BTreeMap<String, Box<dyn PipelineLoader>>,
}

impl PipelineLoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<L: PipelineLoader + 'static>(&mut self, loader: L) {
        self.loaders
            .insert(loader.name().to_string(), Box::new(loader));
    }

    pub fn get(&self, name: &str) -> Option<&dyn PipelineLoader> {
        self.loaders.get(name).map(|loader| loader.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.loaders.keys().cloned().collect()
    }
}

pub fn default_loader_registry(config: &Config) -> PipelineLoaderRegistry {
    let mut loaders = PipelineLoaderRegistry::new();
    loaders.register(DryrunLoader);
    loaders.register(HostedLoader::new(
        config.hugging_face_api.clone(),
        config.hugging_face_api_base.clone(),
    ));
    loaders
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutput {
    Path(PathBuf),
    Error(String),
}

enum PipelineState {
    Ready(Box<dyn DiffusionPipeline>),
    Unavailable { reason: String },
}

/// Text-to-image service.
///
/// Built once through [`ImageGenerator::initialize`]. A failed load leaves the
/// generator unavailable for its whole lifetime; there is no retry.
pub struct ImageGenerator {
    state: PipelineState,
    spec: PipelineSpec,
    output_dir: PathBuf,
}

impl fmt::Debug for ImageGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageGenerator")
            .field("available", &self.is_available())
            .field("spec", &self.spec)
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

impl ImageGenerator {
    pub fn initialize(
        loader: &dyn PipelineLoader,
        spec: PipelineSpec,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        info!(
            backend = loader.name(),
            model = %spec.model_id,
            device = %spec.device.device,
            precision = %spec.device.precision,
            "loading diffusion pipeline"
        );
        let state = match loader.load(&spec) {
            Ok(pipeline) => {
                info!("diffusion pipeline loaded");
                PipelineState::Ready(pipeline)
            }
            Err(err) => {
                error!("failed to load diffusion pipeline: {err:#}");
                PipelineState::Unavailable {
                    reason: format!("{err:#}"),
                }
            }
        };
        Self {
            state,
            spec,
            output_dir: output_dir.into(),
        }
    }

    /// Probes the device, then loads the named backend from the registry.
    pub fn from_registry(
        registry: &PipelineLoaderRegistry,
        backend: &str,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        let spec = PipelineSpec::new(select_device(probe_accelerator()));
        match registry.get(backend) {
            Some(loader) => Self::initialize(loader, spec, output_dir),
            None => {
                let reason = format!(
                    "unknown image backend '{backend}' (available: {})",
                    registry.names().join(", ")
                );
                error!("{reason}");
                Self::unavailable(reason, spec, output_dir)
            }
        }
    }

    pub fn unavailable(
        reason: impl Into<String>,
        spec: PipelineSpec,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            state: PipelineState::Unavailable {
                reason: reason.into(),
            },
            spec,
            output_dir: output_dir.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.state, PipelineState::Ready(_))
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.state {
            PipelineState::Ready(_) => None,
            PipelineState::Unavailable { reason } => Some(reason.as_str()),
        }
    }

    pub fn spec(&self) -> &PipelineSpec {
        &self.spec
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Empty prompt gives an empty result; failures give one error element.
    /// A whitespace-only prompt counts as empty.
    pub fn generate(&self, prompt: &str) -> Vec<ImageOutput> {
        if prompt.trim().is_empty() {
            error!("image generation prompt cannot be empty");
            return Vec::new();
        }
        let pipeline = match &self.state {
            PipelineState::Ready(pipeline) => pipeline,
            PipelineState::Unavailable { .. } => {
                error!("diffusion pipeline is not available; check initialization logs");
                return vec![ImageOutput::Error(SETUP_FAILED_MESSAGE.to_string())];
            }
        };

        info!(prompt = %truncate_text(prompt, 60), "generating image");
        match self.render_to_file(pipeline.as_ref(), prompt) {
            Ok(path) => {
                info!(path = %path.display(), "image saved");
                vec![ImageOutput::Path(path)]
            }
            Err(err) => {
                error!("error during image generation: {err:#}");
                vec![ImageOutput::Error(format!(
                    "Local image generation failed: {err:#}"
                ))]
            }
        }
    }

    fn render_to_file(&self, pipeline: &dyn DiffusionPipeline, prompt: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("failed to create {}", self.output_dir.display()))?;
        let path = artifact_path(&self.output_dir, Local::now());
        let image = pipeline.render(prompt, &self.spec.params)?;
        image
            .save_with_format(&path, ImageFormat::Png)
            .with_context(|| format!("failed to save {}", path.display()))?;
        Ok(path)
    }
}

/// Second-resolution names: two images in the same second share a path.
pub fn artifact_path(output_dir: &Path, now: DateTime<Local>) -> PathBuf {
    output_dir.join(format!(
        "generated_image_{}.png",
        now.format("%Y%m%d_%H%M%S")
    ))
}
