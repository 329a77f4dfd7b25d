//! Terminal chat client for an Azure OpenAI chat-completions deployment,
//! with a locally persisted conversation.

pub mod commands;
pub mod config;
pub mod controller;
pub mod error;
pub mod llm;
pub mod message;
pub mod prompts;
pub mod storage;
pub mod streaming;
pub mod ui;

#[cfg(test)]
mod test_utils;

pub use config::{ChatOptions, Config, Settings};
pub use controller::{ChatController, ChatState, ChatUpdate, SendOutcome};
pub use error::{CompletionError, ConfigError, StorageWarning, TransportError};
pub use llm::{AzureClient, CompletionService};
pub use message::{Message, Role};
pub use storage::{ConversationStore, FileSlot, SnapshotSlot};
