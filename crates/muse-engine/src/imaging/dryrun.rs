use anyhow::Result;
use image::{DynamicImage, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use super::{DiffusionPipeline, PipelineLoader, PipelineSpec, RenderParams};

/// Offline backend: renders a flat color derived from the prompt.
pub struct DryrunLoader;

impl PipelineLoader for DryrunLoader {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn load(&self, _spec: &PipelineSpec) -> Result<Box<dyn DiffusionPipeline>> {
        Ok(Box::new(DryrunPipeline))
    }
}

struct DryrunPipeline;

impl DiffusionPipeline for DryrunPipeline {
    fn render(&self, prompt: &str, params: &RenderParams) -> Result<DynamicImage> {
        let (r, g, b) = color_from_prompt(prompt);
        let image = RgbImage::from_pixel(params.width, params.height, Rgb([r, g, b]));
        Ok(DynamicImage::ImageRgb8(image))
    }
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
