use anyhow::Result;
use serde_json::Value;
use tracing::{error, info};

use crate::gemini::{Content, ContentGenerator, Part};
use crate::media::ImageAttachment;

/// A single running conversation with the hosted model.
///
/// Plain turns are sent with every prior turn and appended on success.
/// Image turns are one-shot requests against the vision model and never
/// enter the conversation history.
pub struct ChatSession<G> {
    generator: G,
    text_model: String,
    vision_model: String,
    history: Vec<Content>,
}

impl<G: ContentGenerator> ChatSession<G> {
    pub fn new(generator: G, text_model: impl Into<String>, vision_model: impl Into<String>) -> Self {
        let text_model = text_model.into();
        info!(model = %text_model, "new multimodal chat session started");
        Self {
            generator,
            text_model,
            vision_model: vision_model.into(),
            history: Vec::new(),
        }
    }

    /// Returns the reply text, or an apology carrying the failure detail.
    pub fn send_message(&mut self, prompt: &str, image: Option<&ImageAttachment>) -> String {
        let result = match image {
            Some(image) => self.send_one_shot(prompt, image),
            None => self.send_in_conversation(prompt),
        };
        match result {
            Ok(reply) => reply,
            Err(err) => {
                error!("error in send_message: {err:#}");
                format!("Sorry, I encountered an error: {err:#}")
            }
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
        info!("chat session reset");
    }

    pub fn get_history(&self) -> &[Content] {
        &self.history
    }

    pub fn history_json(&self) -> Value {
        serde_json::to_value(&self.history).unwrap_or(Value::Array(Vec::new()))
    }

    pub fn text_model(&self) -> &str {
        &self.text_model
    }

    pub fn vision_model(&self) -> &str {
        &self.vision_model
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    fn send_one_shot(&self, prompt: &str, image: &ImageAttachment) -> Result<String> {
        let contents = [Content::user(vec![Part::text(prompt), Part::image(image)])];
        self.generator.generate_content(&self.vision_model, &contents)
    }

    fn send_in_conversation(&mut self, prompt: &str) -> Result<String> {
        let user_turn = Content::user_text(prompt);
        let mut contents = self.history.clone();
        contents.push(user_turn.clone());
        let reply = self.generator.generate_content(&self.text_model, &contents)?;
        self.history.push(user_turn);
        self.history.push(Content::model_text(reply.clone()));
        Ok(reply)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use anyhow::{anyhow, Result};
    use serde_json::json;

    use super::ChatSession;
    use crate::gemini::{Content, ContentGenerator, Part};
    use crate::media::ImageAttachment;

    /// Replays scripted replies and records every request.
    #[derive(Default)]
    pub(crate) struct ScriptedGenerator {
        pub replies: RefCell<VecDeque<Result<String>>>,
        pub requests: RefCell<Vec<(String, Vec<Content>)>>,
    }

    impl ScriptedGenerator {
        pub(crate) fn with_replies(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: RefCell::new(replies.into_iter().collect()),
                requests: RefCell::new(Vec::new()),
            }
        }
    }

    impl ContentGenerator for ScriptedGenerator {
        fn generate_content(&self, model: &str, contents: &[Content]) -> Result<String> {
            self.requests
                .borrow_mut()
                .push((model.to_string(), contents.to_vec()));
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok("ok".to_string()))
        }
    }

    fn session(replies: Vec<Result<String>>) -> ChatSession<ScriptedGenerator> {
        ChatSession::new(
            ScriptedGenerator::with_replies(replies),
            "models/text",
            "models/vision",
        )
    }

    #[test]
    fn plain_turns_thread_prior_history() {
        let mut chat = session(vec![Ok("one".to_string()), Ok("two".to_string())]);
        assert_eq!(chat.send_message("first", None), "one");
        assert_eq!(chat.send_message("second", None), "two");

        let history = chat.get_history();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0], Content::user_text("first"));
        assert_eq!(history[1], Content::model_text("one"));

        let requests = chat.generator().requests.borrow();
        assert_eq!(requests[1].0, "models/text");
        assert_eq!(requests[1].1.len(), 3);
        assert_eq!(requests[1].1[2], Content::user_text("second"));
    }

    #[test]
    fn image_turns_are_one_shot_and_leave_history_alone() {
        let mut chat = session(vec![Ok("warmup".to_string()), Ok("a red square".to_string())]);
        chat.send_message("hello", None);
        let before = chat.get_history().len();

        let image = ImageAttachment::png(vec![0, 1]);
        assert_eq!(
            chat.send_message("what is in the uploaded image?", Some(&image)),
            "a red square"
        );
        assert_eq!(chat.get_history().len(), before);

        let requests = chat.generator().requests.borrow();
        let (model, contents) = &requests[1];
        assert_eq!(model, "models/vision");
        assert_eq!(contents.len(), 1);
        assert_eq!(
            contents[0].parts,
            vec![Part::text("what is in the uploaded image?"), Part::image(&image)]
        );
    }

    #[test]
    fn failures_become_apology_text_and_keep_history() {
        let mut chat = session(vec![
            Ok("fine".to_string()),
            Err(anyhow!("Gemini request failed (503): overloaded")),
        ]);
        chat.send_message("hi", None);
        let reply = chat.send_message("again", None);
        assert_eq!(
            reply,
            "Sorry, I encountered an error: Gemini request failed (503): overloaded"
        );
        assert_eq!(chat.get_history().len(), 2);
    }

    #[test]
    fn reset_starts_an_empty_conversation() {
        let mut chat = session(Vec::new());
        chat.send_message("remember this", None);
        assert!(!chat.get_history().is_empty());
        chat.reset();
        assert!(chat.get_history().is_empty());

        chat.send_message("what was our last conversation about?", None);
        let requests = chat.generator().requests.borrow();
        assert_eq!(
            requests.last().map(|(_, contents)| contents.len()),
            Some(1)
        );
    }

    #[test]
    fn history_json_uses_wire_shape() {
        let mut chat = session(vec![Ok("hey".to_string())]);
        chat.send_message("yo", None);
        assert_eq!(
            chat.history_json(),
            json!([
                {"role": "user", "parts": [{"text": "yo"}]},
                {"role": "model", "parts": [{"text": "hey"}]}
            ])
        );
    }
}
