//! The `/voice` chat command.

pub mod args;
pub mod voice;

pub use args::{ArgsError, VoiceAction, VoiceArgs};
pub use voice::{Output, Reply, USAGE, execute, help, parse};

pub const PREFIX: &str = "/voice";

/// The text after `/voice`, or `None` for any other line.
pub fn strip_prefix(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix(PREFIX)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}
