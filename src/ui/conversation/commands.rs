use std::str::FromStr;

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Commands that can be invoked by starting a message with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Ask for a new reply to the last user message
    Regenerate,
    /// Wipe the conversation (asks first)
    Clear,
    /// Write the conversation to a JSON file
    Export,
    /// Hide the current error
    Dismiss,
    /// Print the whole conversation
    History,
    /// Re-read settings from the environment and config.toml
    Reload,
    /// Show help
    Help,
    /// Exit the application
    Bye,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

impl ParsedCommand {
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::Regenerate => "discard the last reply and ask again",
            SlashCommand::Clear => "clear all chat history",
            SlashCommand::Export => "export chat history to chat-history-<date>.json [dir]",
            SlashCommand::Dismiss => "dismiss the current error",
            SlashCommand::History => "print the conversation so far",
            SlashCommand::Reload => "reload Azure OpenAI settings from .env and config.toml",
            SlashCommand::Help => "show available commands",
            SlashCommand::Bye => "exit the application",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }

    /// Whether this command can be run while a reply is still arriving.
    pub fn available_while_sending(self) -> bool {
        !matches!(self, SlashCommand::Regenerate)
    }
}

/// Parse a slash command from user input
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    let body = input.trim().strip_prefix('/')?;

    let mut parts = body.split_whitespace();
    let head = parts.next()?;
    let rest: Vec<&str> = parts.collect();

    let command = SlashCommand::from_str(&head.to_lowercase())
        .ok()
        .or_else(|| match head.to_lowercase().as_str() {
            "q" | "quit" | "exit" => Some(SlashCommand::Bye),
            "r" | "retry" | "regen" => Some(SlashCommand::Regenerate),
            "reset" => Some(SlashCommand::Clear),
            "save" => Some(SlashCommand::Export),
            "ok" => Some(SlashCommand::Dismiss),
            "h" | "?" => Some(SlashCommand::Help),
            _ => None,
        })?;

    let argument = if rest.is_empty() {
        None
    } else {
        Some(rest.join(" "))
    };

    Some(ParsedCommand { command, argument })
}

/// Get help text for all available commands
pub fn get_help_text() -> String {
    let mut help = String::from("Available commands:\n\n");
    for command in SlashCommand::iter() {
        help.push_str(&format!("/{} - {}\n", command.command(), command.description()));
    }

    help.push_str("\nAliases: /r for /regenerate, /q for /bye, /save for /export, /? for /help");
    help
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_names() {
        let parsed = parse_slash_command("/regenerate").unwrap();
        assert_eq!(parsed.command, SlashCommand::Regenerate);
        assert_eq!(parsed.argument(), None);

        assert_eq!(parse_slash_command("/CLEAR").unwrap().command, SlashCommand::Clear);
    }

    #[test]
    fn parses_aliases_and_arguments() {
        assert_eq!(parse_slash_command("/q").unwrap().command, SlashCommand::Bye);
        assert_eq!(parse_slash_command("/r").unwrap().command, SlashCommand::Regenerate);

        let parsed = parse_slash_command("  /save  /tmp/exports ").unwrap();
        assert_eq!(parsed.command, SlashCommand::Export);
        assert_eq!(parsed.argument(), Some("/tmp/exports"));
    }

    #[test]
    fn plain_text_and_unknown_commands_are_not_commands() {
        assert!(parse_slash_command("who won in 1988?").is_none());
        assert!(parse_slash_command("/drs").is_none());
        assert!(parse_slash_command("/").is_none());
    }

    #[test]
    fn help_lists_every_command() {
        let help = get_help_text();
        for command in SlashCommand::iter() {
            assert!(help.contains(&format!("/{}", command.command())));
        }
    }

    #[test]
    fn regenerate_is_blocked_while_sending() {
        assert!(!SlashCommand::Regenerate.available_while_sending());
        assert!(SlashCommand::Clear.available_while_sending());
    }
}
