use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::error::StorageWarning;
use crate::message::Message;

/// File name of the persisted conversation inside the data directory
pub const HISTORY_SLOT: &str = "chat-history.json";

/// A single named storage slot holding the serialized conversation.
pub trait SnapshotSlot {
    /// Read the slot. `Ok(None)` means the slot is empty.
    fn read(&self) -> Result<Option<String>>;
    fn write(&mut self, snapshot: &str) -> Result<()>;
    /// Remove the slot. Removing an empty slot is not an error.
    fn remove(&mut self) -> Result<()>;
}

/// Slot backed by one JSON file on disk
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotSlot for FileSlot {
    fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("Failed to read chat history"),
        }
    }

    fn write(&mut self, snapshot: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create history directory")?;
        }
        fs::write(&self.path, snapshot).context("Failed to write chat history")
    }

    fn remove(&mut self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove chat history"),
        }
    }
}

/// In-memory ordered conversation mirrored to a [`SnapshotSlot`].
///
/// Every mutation persists the full snapshot before returning. Persistence is
/// best-effort: a failing slot never rolls back the in-memory change, it only
/// records a [`StorageWarning`].
pub struct ConversationStore {
    messages: Vec<Message>,
    slot: Box<dyn SnapshotSlot + Send>,
    last_warning: Option<StorageWarning>,
}

impl ConversationStore {
    /// Create an empty store without reading the slot.
    pub fn new(slot: Box<dyn SnapshotSlot + Send>) -> Self {
        Self {
            messages: Vec::new(),
            slot,
            last_warning: None,
        }
    }

    /// Create a store and restore whatever the slot holds.
    pub fn open(slot: Box<dyn SnapshotSlot + Send>) -> Self {
        let mut store = Self::new(slot);
        store.load();
        store
    }

    /// Restore the conversation from the slot. Malformed or unreadable data
    /// leaves the conversation empty.
    pub fn load(&mut self) {
        self.messages = match self.slot.read() {
            Ok(Some(content)) => match serde_json::from_str::<Vec<Message>>(&content) {
                Ok(messages) => {
                    tracing::debug!(count = messages.len(), "restored chat history");
                    messages
                }
                Err(e) => {
                    tracing::warn!("Failed to parse saved chat history, starting empty: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to load saved chat history, starting empty: {:#}", e);
                Vec::new()
            }
        };
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
        self.persist();
    }

    /// Overwrite the whole conversation.
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.persist();
    }

    /// Empty the conversation and remove the persisted snapshot.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.persist();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent persistence failure, if any. Taking it resets it.
    pub fn take_warning(&mut self) -> Option<StorageWarning> {
        self.last_warning.take()
    }

    /// Pretty-printed JSON array of the conversation
    pub fn to_pretty_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.messages).context("Failed to serialize chat history")
    }

    fn persist(&mut self) {
        let outcome = if self.messages.is_empty() {
            self.slot.remove()
        } else {
            serde_json::to_string(&self.messages)
                .context("Failed to serialize chat history")
                .and_then(|snapshot| self.slot.write(&snapshot))
        };

        if let Err(e) = outcome {
            let warning = StorageWarning(format!("{:#}", e));
            tracing::warn!("{}", warning);
            self.last_warning = Some(warning);
        }
    }
}
