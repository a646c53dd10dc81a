use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use muse_contracts::chat::{parse_input, ShellInput, CHAT_HELP_COMMANDS};
use muse_contracts::events::EventWriter;
use muse_contracts::session::{Message, MessageBody, Role};
use muse_engine::imaging::default_loader_registry;
use muse_engine::{ChatSession, Config, GeminiClient, ImageGenerator, Session};
use tracing::warn;
use uuid::Uuid;

const RESET_CONFIRMATION: &str =
    "Are you sure you want to reset the conversation? Type /confirm or /cancel.";

/// Wires the Gemini client and the configured image backend into a session.
pub fn open_session(config: &Config, events_path: &Path) -> Result<Session<GeminiClient>> {
    let client = GeminiClient::new(config)?;
    if !client.check_connection(&config.text_model) {
        warn!("Gemini connection check failed; replies may be errors");
    }
    let chat = ChatSession::new(client, &config.text_model, &config.vision_model);
    let images = ImageGenerator::from_registry(
        &default_loader_registry(config),
        &config.image_backend,
        &config.output_dir,
    );
    let events = EventWriter::new(events_path, Uuid::new_v4().to_string());
    Session::new(chat, images, events)
}

pub fn run_chat(events: Option<PathBuf>) -> Result<()> {
    let config = Config::load()?;
    let events_path = events.unwrap_or_else(|| config.output_dir.join("events.jsonl"));
    let mut session = open_session(&config, &events_path)?;

    println!("Muse chat started. Type /help for commands.");
    if let Some(reason) = session.images().unavailable_reason() {
        println!("Image generation unavailable: {reason}");
    }

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        if session.ensure_greeting() {
            print_messages(session.messages());
        }

        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        match parse_input(line.trim_end_matches(['\n', '\r'])) {
            ShellInput::Noop => continue,
            ShellInput::Help => println!("{}", format_help()),
            ShellInput::Upload { path } => {
                if path.is_empty() {
                    println!("/upload requires a path");
                    continue;
                }
                match session.upload_image_file(Path::new(&path)) {
                    Ok(message) => println!("{}", render_message(message)),
                    Err(err) => println!("Upload failed: {err:#}"),
                }
            }
            ShellInput::RequestReset => {
                session.request_reset();
                println!("{RESET_CONFIRMATION}");
            }
            ShellInput::ConfirmReset => {
                if session.confirm_reset() {
                    println!("Conversation reset.");
                } else {
                    println!("No reset pending.");
                }
            }
            ShellInput::CancelReset => {
                session.cancel_reset();
                println!("Reset cancelled.");
            }
            ShellInput::ToggleHistory => {
                if session.toggle_history() {
                    print_raw_history(&session);
                } else {
                    println!("Chat history hidden.");
                }
            }
            ShellInput::Transcript => print_messages(session.messages()),
            ShellInput::Quit => break,
            ShellInput::Unknown { command, .. } => {
                println!("Unknown command: /{command}. Type /help for commands.");
            }
            ShellInput::Prompt(prompt) => {
                let reply = session.submit(&prompt);
                println!("{}", render_message(reply));
                if session.flags().show_history {
                    print_raw_history(&session);
                }
            }
        }
    }

    Ok(())
}

fn print_messages(messages: &[Message]) {
    for message in messages {
        println!("{}", render_message(message));
    }
}

fn print_raw_history(session: &Session<GeminiClient>) {
    let history = session.raw_history();
    let rendered = serde_json::to_string_pretty(&history).unwrap_or_else(|_| history.to_string());
    println!("Chat history:\n{rendered}");
}

fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Bot => "Muse",
    }
}

pub fn render_message(message: &Message) -> String {
    let who = speaker(message.role);
    match &message.body {
        MessageBody::Text(text) => format!("{who}: {text}"),
        MessageBody::ImageUpload { caption, image } => {
            format!("{who}: {caption} [image, {} bytes]", image.len())
        }
        MessageBody::Image { paths } => paths
            .iter()
            .map(|path| format!("{who}: [generated image] {}", path.display()))
            .collect::<Vec<String>>()
            .join("\n"),
    }
}

pub fn format_help() -> String {
    let width = CHAT_HELP_COMMANDS
        .iter()
        .map(|(command, _)| command.len())
        .max()
        .unwrap_or(0);
    let mut lines = vec!["Commands:".to_string()];
    for (command, description) in CHAT_HELP_COMMANDS {
        lines.push(format!("  {command:<width$}  {description}"));
    }
    lines.push("Anything else is sent as a prompt. Start with \"generate an image of:\" to draw.".to_string());
    lines.join("\n")
}
