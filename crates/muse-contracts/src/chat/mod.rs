mod command_registry;
mod commands;
pub mod router;

pub use command_registry::CHAT_HELP_COMMANDS;
pub use commands::{parse_input, ShellInput};
pub use router::{ImageReference, Route, RouteContext, RouteKind, Router};
