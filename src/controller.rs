use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use tokio::sync::mpsc;

use crate::config::{ChatOptions, Settings};
use crate::error::{CompletionError, StorageWarning};
use crate::llm::{send_completion, CompletionService};
use crate::message::{last_user_index, Message};
use crate::prompts::effective_system_prompt;
use crate::storage::ConversationStore;

pub const NOT_CONFIGURED: &str = "Azure OpenAI is not configured. Set AZURE_OPENAI_KEY, \
AZURE_OPENAI_ENDPOINT and AZURE_OPENAI_DEPLOYMENT (or edit ~/.paddock/config.toml).";

/// Where the conversation stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    /// A completion request is outstanding
    Sending,
    /// The last request failed. Configuration errors are not dismissible.
    Error { message: String, dismissible: bool },
}

/// Result of asking the controller to start a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Started,
    /// Blank input
    Empty,
    /// Another request is still in flight
    Busy,
    NotConfigured,
    /// Regenerate with no user message in the conversation
    NothingToRegenerate,
}

/// Something the presentation layer should show
#[derive(Debug, Clone, PartialEq)]
pub enum ChatUpdate {
    /// Cumulative assistant text received so far
    Partial(String),
    /// The assistant reply was appended
    Replied(Message),
    /// The request failed; the message is also the error banner
    Failed(String),
    /// A reply arrived for a conversation that was cleared and was dropped
    Discarded,
}

enum ReplyKind {
    Partial(String),
    Finished(std::result::Result<String, CompletionError>),
}

/// Message from the request task back to the controller
struct Reply {
    generation: u64,
    kind: ReplyKind,
}

/// Orchestrates send / regenerate / clear / export against the store and
/// the completion client.
///
/// Requests run on a spawned task and report back over a channel; nothing is
/// applied until the owner calls [`ChatController::next_update`]. Every
/// request is tagged with the conversation generation, which `clear` bumps, so
/// replies that land after a clear are dropped.
pub struct ChatController<C: CompletionService + 'static> {
    store: ConversationStore,
    client: Arc<C>,
    options: ChatOptions,
    state: ChatState,
    generation: u64,
    in_flight: Option<u64>,
    replies_tx: mpsc::UnboundedSender<Reply>,
    replies_rx: mpsc::UnboundedReceiver<Reply>,
}

impl<C: CompletionService + 'static> ChatController<C> {
    pub fn new(store: ConversationStore, client: Arc<C>, options: ChatOptions) -> Self {
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        let mut controller = Self {
            store,
            client,
            options,
            state: ChatState::Idle,
            generation: 0,
            in_flight: None,
            replies_tx,
            replies_rx,
        };
        if !controller.client.is_configured() {
            controller.show_not_configured();
        }
        controller
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn is_sending(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Current error banner, if any
    pub fn error_message(&self) -> Option<&str> {
        match &self.state {
            ChatState::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn take_storage_warning(&mut self) -> Option<StorageWarning> {
        self.store.take_warning()
    }

    /// Append a user message and request a reply.
    pub fn submit(&mut self, text: &str) -> SendOutcome {
        let content = text.trim();
        if content.is_empty() {
            return SendOutcome::Empty;
        }
        if self.is_sending() {
            return SendOutcome::Busy;
        }
        if !self.client.is_configured() {
            self.show_not_configured();
            return SendOutcome::NotConfigured;
        }

        self.store.append(Message::user(content));
        self.start_request();
        SendOutcome::Started
    }

    /// Drop everything after the last user message and request a new reply.
    pub fn regenerate(&mut self) -> SendOutcome {
        if self.is_sending() {
            return SendOutcome::Busy;
        }
        let Some(last_user) = last_user_index(self.store.messages()) else {
            return SendOutcome::NothingToRegenerate;
        };
        if !self.client.is_configured() {
            self.show_not_configured();
            return SendOutcome::NotConfigured;
        }

        let truncated = self.store.messages()[..=last_user].to_vec();
        tracing::debug!(
            dropped = self.store.len() - truncated.len(),
            "truncating conversation for regenerate"
        );
        self.store.replace(truncated);
        self.start_request();
        SendOutcome::Started
    }

    /// Wipe the conversation if `confirm` agrees. Does not cancel an
    /// outstanding request; its reply will be discarded.
    pub fn clear<F>(&mut self, confirm: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        if !confirm() {
            return false;
        }

        self.generation += 1;
        self.store.clear();
        if !self.is_sending() {
            self.state = ChatState::Idle;
        }
        if !self.client.is_configured() {
            self.show_not_configured();
        }
        true
    }

    /// Hand fresh settings to the client and refresh the configuration banner.
    pub fn reconfigure(&mut self, settings: Settings) -> bool {
        self.client.configure(settings);
        let configured = self.client.is_configured();
        if !configured {
            self.show_not_configured();
        } else if matches!(self.state, ChatState::Error { dismissible: false, .. }) {
            self.state = ChatState::Idle;
        }
        configured
    }

    /// Hide a dismissible error banner. Returns whether the banner went away.
    pub fn dismiss_error(&mut self) -> bool {
        let dismissed = match &self.state {
            ChatState::Error { dismissible, .. } => *dismissible || self.client.is_configured(),
            _ => false,
        };
        if dismissed {
            self.state = ChatState::Idle;
        }
        dismissed
    }

    /// Pretty-printed JSON array of the whole conversation
    pub fn export_json(&self) -> Result<String> {
        self.store.to_pretty_json()
    }

    /// Write the conversation to `chat-history-<date>.json` inside `dir`.
    pub fn export_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(export_file_name(Utc::now().date_naive()));
        let json = self.export_json()?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write export to {}", path.display()))?;
        tracing::debug!(path = %path.display(), count = self.store.len(), "exported chat history");
        Ok(path)
    }

    /// Wait for the outstanding request to report something and apply it.
    /// Returns `None` when no request is in flight.
    pub async fn next_update(&mut self) -> Option<ChatUpdate> {
        while self.in_flight.is_some() {
            let reply = self.replies_rx.recv().await?;
            if let Some(update) = self.apply(reply) {
                return Some(update);
            }
        }
        None
    }

    fn start_request(&mut self) {
        let generation = self.generation;
        self.in_flight = Some(generation);
        self.state = ChatState::Sending;

        let client = Arc::clone(&self.client);
        let history = self.store.messages().to_vec();
        let options = self.options.clone();
        let tx = self.replies_tx.clone();

        tokio::spawn(async move {
            let system_prompt = effective_system_prompt(&options.system_prompt).to_string();
            let partial_tx = tx.clone();
            let result = send_completion(client.as_ref(), &history, &system_prompt, &options, |partial| {
                let _ = partial_tx.send(Reply {
                    generation,
                    kind: ReplyKind::Partial(partial.to_string()),
                });
            })
            .await;
            let _ = tx.send(Reply {
                generation,
                kind: ReplyKind::Finished(result),
            });
        });
    }

    fn apply(&mut self, reply: Reply) -> Option<ChatUpdate> {
        let stale = reply.generation != self.generation;
        match reply.kind {
            ReplyKind::Partial(_) if stale => None,
            ReplyKind::Partial(text) => Some(ChatUpdate::Partial(text)),
            ReplyKind::Finished(result) => {
                self.in_flight = None;
                if stale {
                    tracing::debug!(
                        generation = reply.generation,
                        "dropping reply for a cleared conversation"
                    );
                    if self.state == ChatState::Sending {
                        self.state = ChatState::Idle;
                    }
                    return Some(ChatUpdate::Discarded);
                }

                match result {
                    Ok(text) => {
                        let message = Message::assistant(text);
                        self.store.append(message.clone());
                        self.state = ChatState::Idle;
                        Some(ChatUpdate::Replied(message))
                    }
                    Err(e) => {
                        tracing::error!("Error requesting completion: {}", e);
                        let message = e.to_string();
                        self.state = ChatState::Error {
                            message: message.clone(),
                            dismissible: !e.is_configuration(),
                        };
                        Some(ChatUpdate::Failed(message))
                    }
                }
            }
        }
    }

    fn show_not_configured(&mut self) {
        self.state = ChatState::Error {
            message: NOT_CONFIGURED.to_string(),
            dismissible: false,
        };
    }
}

/// `chat-history-<YYYY-MM-DD>.json`
pub fn export_file_name(date: NaiveDate) -> String {
    format!("chat-history-{}.json", date.format("%Y-%m-%d"))
}
