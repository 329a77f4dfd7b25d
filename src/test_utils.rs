//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Notify;

use crate::config::Settings;
use crate::error::CompletionError;
use crate::llm::{CompletionRequest, CompletionService, DeltaStream};
use crate::storage::SnapshotSlot;

/// Slot kept in shared memory so tests can inspect it after the store is gone
#[derive(Clone, Default)]
pub(crate) struct MemorySlot {
    pub(crate) content: Arc<Mutex<Option<String>>>,
    pub(crate) fail_writes: bool,
}

impl SnapshotSlot for MemorySlot {
    fn read(&self) -> Result<Option<String>> {
        Ok(self.content.lock().unwrap().clone())
    }

    fn write(&mut self, snapshot: &str) -> Result<()> {
        if self.fail_writes {
            anyhow::bail!("disk full");
        }
        *self.content.lock().unwrap() = Some(snapshot.to_string());
        Ok(())
    }

    fn remove(&mut self) -> Result<()> {
        if self.fail_writes {
            anyhow::bail!("read-only storage");
        }
        *self.content.lock().unwrap() = None;
        Ok(())
    }
}

pub(crate) type Scripted = std::result::Result<Vec<&'static str>, CompletionError>;

/// Completion double that answers from a script and records requests
#[derive(Default)]
pub(crate) struct ScriptedClient {
    pub(crate) unconfigured: AtomicBool,
    pub(crate) replies: Mutex<VecDeque<Scripted>>,
    pub(crate) requests: Mutex<Vec<CompletionRequest>>,
    /// When set, every request waits for one `notify_one` before answering
    pub(crate) gate: Option<Arc<Notify>>,
}

impl ScriptedClient {
    pub(crate) fn answering(replies: Vec<Scripted>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    async fn next_reply(&self, request: &CompletionRequest) -> Scripted {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected completion request")
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionService for ScriptedClient {
    fn is_configured(&self) -> bool {
        !self.unconfigured.load(Ordering::SeqCst)
    }

    fn configure(&self, settings: Settings) {
        self.unconfigured.store(!settings.is_configured(), Ordering::SeqCst);
    }

    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, CompletionError> {
        self.next_reply(request).await.map(|parts| parts.concat())
    }

    async fn stream(&self, request: &CompletionRequest) -> std::result::Result<DeltaStream, CompletionError> {
        let parts = self.next_reply(request).await?;
        let deltas: Vec<std::result::Result<String, CompletionError>> =
            parts.into_iter().map(|p| Ok(p.to_string())).collect();
        Ok(futures::stream::iter(deltas).boxed())
    }
}
