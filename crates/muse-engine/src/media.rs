use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};
use muse_contracts::session::UploadedImage;

/// Uploads are shrunk to fit inside this square before they are kept.
pub const UPLOAD_MAX_SIDE: u32 = 1024;

/// An image sent alongside a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            mime_type: "image/png".to_string(),
            bytes,
        }
    }

    /// Uploads are already normalized to RGB PNG by [`prepare_upload`].
    pub fn from_uploaded(image: &UploadedImage) -> Self {
        Self::png(image.bytes().to_vec())
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let image =
            image::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
        Ok(Self::png(encode_png(&rgb)?))
    }
}

/// Decodes an uploaded file, converts it to RGB, shrinks it to fit
/// [`UPLOAD_MAX_SIDE`] and re-encodes it as PNG.
pub fn prepare_upload(raw: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(raw).context("failed to decode uploaded image")?;
    let mut rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
    if rgb.width() > UPLOAD_MAX_SIDE || rgb.height() > UPLOAD_MAX_SIDE {
        rgb = rgb.thumbnail(UPLOAD_MAX_SIDE, UPLOAD_MAX_SIDE);
    }
    encode_png(&rgb)
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .context("failed to encode png")?;
    Ok(cursor.into_inner())
}
