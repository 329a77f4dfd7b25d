use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use crate::config::Settings;
use crate::controller::{ChatController, ChatState, ChatUpdate, SendOutcome};
use crate::llm::CompletionService;
use crate::ui::conversation::history::{format_history, format_message, ASSISTANT_LABEL};
use crate::ui::conversation::{get_help_text, parse_slash_command, ParsedCommand, SlashCommand, StreamingResponse};

/// Actions that can be requested by the conversation manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationAction {
    None,
    Exit,
}

type SettingsLoader = Box<dyn FnMut() -> Result<Settings>>;

/// Line-oriented chat loop: reads user input, drives the controller and
/// prints replies as they stream in.
pub struct ConversationManager<C: CompletionService + 'static, W: Write> {
    controller: ChatController<C>,
    streaming: StreamingResponse,
    out: W,
    export_dir: PathBuf,
    reload: Option<SettingsLoader>,
}

impl<C: CompletionService + 'static, W: Write> ConversationManager<C, W> {
    pub fn new(controller: ChatController<C>, out: W, export_dir: PathBuf) -> Self {
        Self {
            controller,
            streaming: StreamingResponse::new(),
            out,
            export_dir,
            reload: None,
        }
    }

    /// Source of fresh settings for `/reload`
    pub fn with_reloader<F>(mut self, reload: F) -> Self
    where
        F: FnMut() -> Result<Settings> + 'static,
    {
        self.reload = Some(Box::new(reload));
        self
    }

    pub fn controller(&self) -> &ChatController<C> {
        &self.controller
    }

    /// Run until `/bye` or end of input. A reply still in flight at end of
    /// input is waited for; `/bye` leaves immediately.
    pub async fn run<R>(&mut self, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        self.start_conversation()?;
        let mut lines = input.lines();

        loop {
            tokio::select! {
                biased;
                update = self.controller.next_update(), if self.controller.is_sending() => {
                    if let Some(update) = update {
                        self.render_update(&update)?;
                    }
                }
                line = lines.next_line() => {
                    match line.context("Failed to read input")? {
                        Some(line) => {
                            if self.handle_line(&line, &mut lines).await? == ConversationAction::Exit {
                                return Ok(());
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        while let Some(update) = self.controller.next_update().await {
            self.render_update(&update)?;
        }
        Ok(())
    }

    /// Print the banner, any restored history and the error state.
    fn start_conversation(&mut self) -> Result<()> {
        writeln!(self.out, "🏁 Paddock: Formula 1 chat. Type /help for commands.")?;
        if !self.controller.messages().is_empty() {
            writeln!(self.out, "{}\n", format_history(self.controller.messages()))?;
        }
        self.render_banner()?;
        self.prompt()
    }

    async fn handle_line<R>(&mut self, line: &str, lines: &mut Lines<R>) -> Result<ConversationAction>
    where
        R: AsyncBufRead + Unpin,
    {
        if let Some(command) = parse_slash_command(line) {
            return self.handle_slash_command(command, lines).await;
        }
        self.handle_input(line)?;
        Ok(ConversationAction::None)
    }

    /// Handle user input and start the request
    fn handle_input(&mut self, input: &str) -> Result<()> {
        match self.controller.submit(input) {
            SendOutcome::Started => self.render_waiting()?,
            SendOutcome::Empty => self.prompt()?,
            SendOutcome::Busy => {
                writeln!(self.out, "⏳ Still waiting for the previous reply.")?;
            }
            SendOutcome::NotConfigured | SendOutcome::NothingToRegenerate => {
                self.render_banner()?;
                self.prompt()?;
            }
        }
        self.render_storage_warning()
    }

    /// Handle slash commands
    async fn handle_slash_command<R>(
        &mut self,
        command: ParsedCommand,
        lines: &mut Lines<R>,
    ) -> Result<ConversationAction>
    where
        R: AsyncBufRead + Unpin,
    {
        if self.controller.is_sending() && !command.command.available_while_sending() {
            writeln!(self.out, "⏳ /{} is unavailable while a reply is on its way.", command.command.command())?;
            return Ok(ConversationAction::None);
        }

        match command.command {
            SlashCommand::Regenerate => match self.controller.regenerate() {
                SendOutcome::Started => self.render_waiting()?,
                SendOutcome::NothingToRegenerate => {
                    writeln!(self.out, "ℹ️ Nothing to regenerate yet.")?;
                    self.prompt()?;
                }
                _ => {
                    self.render_banner()?;
                    self.prompt()?;
                }
            },
            SlashCommand::Clear => {
                write!(self.out, "Are you sure you want to clear all chat history? [y/N] ")?;
                self.out.flush()?;
                let answer = lines.next_line().await.context("Failed to read confirmation")?;
                let confirmed = answer
                    .map(|a| matches!(a.trim().to_lowercase().as_str(), "y" | "yes"))
                    .unwrap_or(false);

                if self.controller.clear(|| confirmed) {
                    writeln!(self.out, "🧹 Chat history cleared.")?;
                } else {
                    writeln!(self.out, "Kept chat history.")?;
                }
                self.render_storage_warning()?;
                self.prompt()?;
            }
            SlashCommand::Export => {
                if self.controller.messages().is_empty() {
                    writeln!(self.out, "📭 Nothing to export yet.")?;
                } else {
                    let dir = command
                        .argument()
                        .map(PathBuf::from)
                        .unwrap_or_else(|| self.export_dir.clone());
                    match self.controller.export_to(&dir) {
                        Ok(path) => writeln!(
                            self.out,
                            "💾 Exported {} messages to {}",
                            self.controller.messages().len(),
                            path.display()
                        )?,
                        Err(e) => writeln!(self.out, "❌ Export failed: {:#}", e)?,
                    }
                }
                self.prompt()?;
            }
            SlashCommand::Dismiss => {
                if self.controller.dismiss_error() {
                    writeln!(self.out, "Error dismissed.")?;
                } else if self.controller.error_message().is_some() {
                    writeln!(self.out, "⚠️ Fix the configuration and run /reload to clear this error.")?;
                } else {
                    writeln!(self.out, "Nothing to dismiss.")?;
                }
                self.prompt()?;
            }
            SlashCommand::History => {
                writeln!(self.out, "{}", format_history(self.controller.messages()))?;
                self.prompt()?;
            }
            SlashCommand::Reload => {
                match self.reload.as_mut().map(|load| load()) {
                    Some(Ok(settings)) => {
                        if self.controller.reconfigure(settings) {
                            writeln!(self.out, "✅ Azure OpenAI settings loaded.")?;
                        } else {
                            self.render_banner()?;
                        }
                    }
                    Some(Err(e)) => writeln!(self.out, "❌ Failed to reload settings: {:#}", e)?,
                    None => writeln!(self.out, "ℹ️ Reloading settings is not available here.")?,
                }
                self.prompt()?;
            }
            SlashCommand::Help => {
                writeln!(self.out, "{}", get_help_text())?;
                self.prompt()?;
            }
            SlashCommand::Bye => {
                writeln!(self.out, "👋 See you at the next Grand Prix!")?;
                return Ok(ConversationAction::Exit);
            }
        }

        Ok(ConversationAction::None)
    }

    fn render_update(&mut self, update: &ChatUpdate) -> Result<()> {
        match update {
            ChatUpdate::Partial(text) => {
                if !self.streaming.is_streaming() {
                    write!(self.out, "{}: ", ASSISTANT_LABEL)?;
                }
                let tail = self.streaming.push(text);
                write!(self.out, "{}", tail)?;
                self.out.flush()?;
                return Ok(());
            }
            ChatUpdate::Replied(message) => {
                if self.streaming.is_streaming() {
                    let tail = self.streaming.finish(&message.content);
                    writeln!(self.out, "{}", tail)?;
                } else {
                    writeln!(self.out, "{}", format_message(message))?;
                }
                self.render_storage_warning()?;
            }
            ChatUpdate::Failed(_) => {
                self.end_partial_line()?;
                self.render_banner()?;
            }
            ChatUpdate::Discarded => {
                self.end_partial_line()?;
                writeln!(self.out, "ℹ️ A reply arrived after the chat was cleared and was dropped.")?;
            }
        }
        self.prompt()
    }

    fn end_partial_line(&mut self) -> Result<()> {
        if self.streaming.is_streaming() {
            self.streaming.clear();
            writeln!(self.out)?;
        }
        Ok(())
    }

    /// Typing indicator shown until the first text arrives
    fn render_waiting(&mut self) -> Result<()> {
        writeln!(self.out, "⏳ {} is typing…", ASSISTANT_LABEL.trim_start_matches(|c: char| !c.is_alphabetic()))?;
        Ok(())
    }

    fn render_banner(&mut self) -> Result<()> {
        if let ChatState::Error { message, dismissible } = self.controller.state() {
            if *dismissible {
                writeln!(self.out, "❌ {} (/dismiss to hide)", message)?;
            } else {
                writeln!(self.out, "⚠️ {}", message)?;
            }
        }
        Ok(())
    }

    fn render_storage_warning(&mut self) -> Result<()> {
        if let Some(warning) = self.controller.take_storage_warning() {
            writeln!(self.out, "⚠️ {}", warning)?;
        }
        Ok(())
    }

    fn prompt(&mut self) -> Result<()> {
        if !self.controller.is_sending() {
            write!(self.out, "> ")?;
            self.out.flush()?;
        }
        Ok(())
    }
}
