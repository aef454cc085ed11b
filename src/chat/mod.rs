//! Interactive chat on top of [`KbClient`](crate::KbClient).
//!
//! - [`config`]: CLI arguments, the YAML settings file and their resolution
//! - [`session`]: the conversation, one streamed turn at a time
//! - [`commands`]: slash command parsing

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig};
pub use session::{ChatSession, SessionStats};
