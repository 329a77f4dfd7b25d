//! Plain-text rendering of the conversation

use chrono::{DateTime, Local};

use crate::message::{Message, Role};

pub const ASSISTANT_LABEL: &str = "🏎️  Paddock";

pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "👤 You",
        Role::Assistant => ASSISTANT_LABEL,
        Role::System => "⚙️ System",
    }
}

/// Local `HH:MM` for a stored timestamp, or the raw value if it does not parse
fn short_time(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}

pub fn format_message(message: &Message) -> String {
    format!(
        "[{}] {}: {}",
        short_time(&message.timestamp),
        role_label(message.role),
        message.content
    )
}

/// Render every message, one block per message
pub fn format_history(messages: &[Message]) -> String {
    if messages.is_empty() {
        return "📭 No messages yet. Ask anything about Formula 1!".to_string();
    }

    messages
        .iter()
        .map(format_message)
        .collect::<Vec<_>>()
        .join("\n\n")
}
