//! Terminal User Interface module
//!
//! Full-screen chat window for Jarvix: the conversation, a message box and
//! a modal for voice capture.

mod app;
pub mod clipboard;
mod commands;
mod input;
mod shimmer;
mod theme;
mod widgets;

pub use app::{find_code_block, App};
pub use commands::{parse_command, LocalCommand, ParsedCommand};
pub use theme::Theme;
