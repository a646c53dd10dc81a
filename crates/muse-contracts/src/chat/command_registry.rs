#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "upload",
    action: "upload",
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "reset",
        action: "request_reset",
    },
    CommandSpec {
        command: "new",
        action: "request_reset",
    },
    CommandSpec {
        command: "confirm",
        action: "confirm_reset",
    },
    CommandSpec {
        command: "cancel",
        action: "cancel_reset",
    },
    CommandSpec {
        command: "history",
        action: "toggle_history",
    },
    CommandSpec {
        command: "transcript",
        action: "transcript",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const CHAT_HELP_COMMANDS: &[(&str, &str)] = &[
    ("/help", "show this list"),
    ("/upload <path>", "upload a png/jpg image for analysis"),
    ("/reset", "start a new conversation (asks for confirmation)"),
    ("/confirm", "confirm a pending reset"),
    ("/cancel", "cancel a pending reset"),
    ("/history", "toggle the raw conversation history view"),
    ("/transcript", "print every message so far"),
    ("/quit", "leave the chat"),
];
