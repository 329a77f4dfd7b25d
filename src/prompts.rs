/// System prompt used when `config.toml` does not set one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an F1 racing expert and enthusiast AI assistant. \
You have deep knowledge of Formula 1 racing, drivers, teams, circuits, race strategies, \
technical regulations, and F1 history. Provide engaging, accurate, and passionate responses \
about all things Formula 1. Use F1 terminology naturally and share your enthusiasm for the sport.";

/// Return the system prompt to send, falling back to the default when the
/// configured one is blank.
pub fn effective_system_prompt(configured: &str) -> &str {
    if configured.trim().is_empty() {
        DEFAULT_SYSTEM_PROMPT
    } else {
        configured
    }
}
