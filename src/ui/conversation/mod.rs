//! Conversation UI components for the terminal chat

pub mod commands;
pub mod history;
pub mod manager;
pub mod streaming;

pub use commands::{get_help_text, parse_slash_command, ParsedCommand, SlashCommand};
pub use history::{format_history, format_message};
pub use manager::{ConversationAction, ConversationManager};
pub use streaming::StreamingResponse;
