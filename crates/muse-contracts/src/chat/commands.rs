use super::command_registry::{CommandSpec, NO_ARG_COMMANDS, SINGLE_PATH_COMMANDS};

/// One line of shell input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellInput {
    Noop,
    Help,
    Upload { path: String },
    RequestReset,
    ConfirmReset,
    CancelReset,
    ToggleHistory,
    Transcript,
    Quit,
    Unknown { command: String, arg: String },
    Prompt(String),
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    let parts = parse_path_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

fn no_arg_input(action: &str) -> Option<ShellInput> {
    let input = match action {
        "help" => ShellInput::Help,
        "request_reset" => ShellInput::RequestReset,
        "confirm_reset" => ShellInput::ConfirmReset,
        "cancel_reset" => ShellInput::CancelReset,
        "toggle_history" => ShellInput::ToggleHistory,
        "transcript" => ShellInput::Transcript,
        "quit" => ShellInput::Quit,
        _ => return None,
    };
    Some(input)
}

pub fn parse_input(text: &str) -> ShellInput {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return ShellInput::Noop;
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if find_action(&command, SINGLE_PATH_COMMANDS).is_some() {
                return ShellInput::Upload {
                    path: parse_single_path_arg(arg),
                };
            }

            if let Some(input) = find_action(&command, NO_ARG_COMMANDS).and_then(no_arg_input) {
                return input;
            }

            return ShellInput::Unknown {
                command,
                arg: arg.to_string(),
            };
        }
    }

    ShellInput::Prompt(text.to_string())
}
