use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Bot,
}

/// Raw bytes of the session's current upload.
///
/// Cloning shares the buffer, so an `image_upload` message and the session's
/// current-upload slot point at the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    bytes: Arc<[u8]>,
}

impl UploadedImage {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn shares_buffer_with(&self, other: &UploadedImage) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Text(String),
    ImageUpload { caption: String, image: UploadedImage },
    Image { paths: Vec<PathBuf> },
}

impl MessageBody {
    pub fn kind(&self) -> &'static str {
        match self {
            MessageBody::Text(_) => "text",
            MessageBody::ImageUpload { .. } => "image_upload",
            MessageBody::Image { .. } => "image",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub body: MessageBody,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            body: MessageBody::Text(text.into()),
        }
    }

    pub fn bot_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Bot,
            body: MessageBody::Text(text.into()),
        }
    }

    pub fn user_upload(caption: impl Into<String>, image: UploadedImage) -> Self {
        Self {
            role: Role::User,
            body: MessageBody::ImageUpload {
                caption: caption.into(),
                image,
            },
        }
    }

    pub fn bot_images(paths: Vec<PathBuf>) -> Self {
        Self {
            role: Role::Bot,
            body: MessageBody::Image { paths },
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text(text) => Some(text.as_str()),
            MessageBody::ImageUpload { caption, .. } => Some(caption.as_str()),
            MessageBody::Image { .. } => None,
        }
    }

    /// Last path of an image message, the one later "generated image" turns refer to.
    pub fn latest_image_path(&self) -> Option<&PathBuf> {
        match &self.body {
            MessageBody::Image { paths } => paths.last(),
            _ => None,
        }
    }
}
