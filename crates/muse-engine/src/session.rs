use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use muse_contracts::chat::{ImageReference, Route, RouteContext, Router};
use muse_contracts::events::EventWriter;
use muse_contracts::session::{Message, UploadedImage};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::chat::ChatSession;
use crate::gemini::ContentGenerator;
use crate::imaging::{ImageGenerator, ImageOutput};
use crate::map_object;
use crate::media::{prepare_upload, ImageAttachment};

pub const WELCOME_MESSAGE: &str = "Hello! I'm your AI assistant.\n- Ask questions\n- Generate images (type: **generate an image of: [description]**)\n- Analyze uploaded images";
pub const UPLOAD_CAPTION: &str = "Uploaded an image for analysis.";
pub const GENERATION_FAILED_MESSAGE: &str = "Image generation failed";

/// Transient front-end state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UiFlags {
    pub processing: bool,
    pub show_history: bool,
    pub show_confirmation: bool,
}

/// One user's interaction: transcript, current upload and the chat/image
/// services every turn is routed to.
pub struct Session<G> {
    chat: ChatSession<G>,
    images: ImageGenerator,
    router: Router,
    events: EventWriter,
    messages: Vec<Message>,
    uploaded: Option<UploadedImage>,
    last_generated: Option<PathBuf>,
    flags: UiFlags,
}

impl<G: ContentGenerator> Session<G> {
    pub fn new(chat: ChatSession<G>, images: ImageGenerator, events: EventWriter) -> Result<Self> {
        let session = Self {
            chat,
            images,
            router: Router::new()?,
            events,
            messages: Vec::new(),
            uploaded: None,
            last_generated: None,
            flags: UiFlags::default(),
        };
        session.events.emit(
            "session_started",
            map_object(json!({
                "text_model": session.chat.text_model(),
                "vision_model": session.chat.vision_model(),
                "image_generation_available": session.images.is_available(),
            })),
        )?;
        Ok(session)
    }

    pub fn id(&self) -> &str {
        self.events.session_id()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn uploaded_image(&self) -> Option<&UploadedImage> {
        self.uploaded.as_ref()
    }

    pub fn last_generated_image(&self) -> Option<&Path> {
        self.last_generated.as_deref()
    }

    pub fn flags(&self) -> UiFlags {
        self.flags
    }

    pub fn chat(&self) -> &ChatSession<G> {
        &self.chat
    }

    pub fn images(&self) -> &ImageGenerator {
        &self.images
    }

    /// Adds the greeting when the transcript is empty.
    pub fn ensure_greeting(&mut self) -> bool {
        if !self.messages.is_empty() {
            return false;
        }
        self.push(Message::bot_text(WELCOME_MESSAGE));
        true
    }

    pub fn upload_image_file(&mut self, path: &Path) -> Result<&Message> {
        let raw = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        self.upload_image(&raw)
    }

    /// Normalizes the image, makes it the current upload and records it.
    pub fn upload_image(&mut self, raw: &[u8]) -> Result<&Message> {
        self.flags.processing = true;
        let prepared = prepare_upload(raw);
        self.flags.processing = false;

        let image = UploadedImage::new(prepared?);
        self.uploaded = Some(image.clone());
        self.record("image_uploaded", json!({ "bytes": image.len() }));
        Ok(self.push(Message::user_upload(UPLOAD_CAPTION, image)))
    }

    /// Routes one user turn and appends the reply. Failures arrive as
    /// bot text, so a turn always yields a reply.
    pub fn submit(&mut self, prompt: &str) -> &Message {
        self.push(Message::user_text(prompt));
        self.flags.processing = true;
        let reply = self.answer(prompt);
        self.flags.processing = false;
        debug!(kind = reply.body.kind(), "turn answered");
        self.push(reply)
    }

    pub fn request_reset(&mut self) {
        self.flags.show_confirmation = true;
    }

    pub fn cancel_reset(&mut self) {
        self.flags.show_confirmation = false;
    }

    /// Resets only when a confirmation is pending.
    pub fn confirm_reset(&mut self) -> bool {
        if !self.flags.show_confirmation {
            return false;
        }
        self.reset();
        true
    }

    pub fn reset(&mut self) {
        let cleared = self.messages.len();
        self.chat.reset();
        self.messages.clear();
        self.uploaded = None;
        self.last_generated = None;
        self.flags.show_confirmation = false;
        self.record("session_reset", json!({ "cleared_messages": cleared }));
    }

    pub fn toggle_history(&mut self) -> bool {
        self.flags.show_history = !self.flags.show_history;
        self.flags.show_history
    }

    pub fn raw_history(&self) -> Value {
        self.chat.history_json()
    }

    fn answer(&mut self, prompt: &str) -> Message {
        let ctx = RouteContext {
            uploaded: self.uploaded.as_ref(),
            last_generated: self.last_generated.as_deref(),
        };
        let route = self.router.route(prompt, &ctx);
        match route {
            Route::GenerateImage { description } => self.answer_with_image(&description),
            Route::Chat { prompt, image } => self.answer_with_chat(&prompt, image),
        }
    }

    fn answer_with_image(&mut self, description: &str) -> Message {
        let outputs = self.images.generate(description);
        let mut paths = Vec::new();
        let mut failure = None;
        for output in outputs {
            match output {
                ImageOutput::Path(path) => paths.push(path),
                ImageOutput::Error(message) => {
                    failure.get_or_insert(message);
                }
            }
        }

        if failure.is_none() && !paths.is_empty() {
            self.record(
                "image_generated",
                json!({
                    "prompt": description,
                    "image_paths": paths
                        .iter()
                        .map(|path| path.to_string_lossy().to_string())
                        .collect::<Vec<String>>(),
                }),
            );
            return Message::bot_images(paths);
        }

        let message = failure.unwrap_or_else(|| GENERATION_FAILED_MESSAGE.to_string());
        self.record(
            "image_generation_failed",
            json!({
                "prompt": description,
                "error": message,
            }),
        );
        Message::bot_text(message)
    }

    fn answer_with_chat(&mut self, prompt: &str, image: Option<ImageReference>) -> Message {
        let (attachment, source) = match image {
            Some(ImageReference::Uploaded(uploaded)) => {
                (Some(ImageAttachment::from_uploaded(&uploaded)), "uploaded")
            }
            Some(ImageReference::Generated(path)) => match ImageAttachment::from_path(&path) {
                Ok(attachment) => (Some(attachment), "generated"),
                Err(err) => {
                    warn!("generated image unreadable, sending text only: {err:#}");
                    (None, "none")
                }
            },
            None => (None, "none"),
        };

        let reply = self.chat.send_message(prompt, attachment.as_ref());
        self.record(
            "chat_reply",
            json!({
                "image_source": source,
                "history_turns": self.chat.get_history().len(),
                "reply_chars": reply.chars().count(),
            }),
        );
        Message::bot_text(reply)
    }

    /// The event log never decides a turn's outcome.
    fn record(&self, event_type: &str, payload: Value) {
        if let Err(err) = self.events.emit(event_type, map_object(payload)) {
            warn!(event = event_type, "failed to write event: {err:#}");
        }
    }

    fn push(&mut self, message: Message) -> &Message {
        if let Some(path) = message.latest_image_path() {
            self.last_generated = Some(path.clone());
        }
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }
}
