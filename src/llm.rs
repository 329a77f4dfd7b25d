use std::collections::VecDeque;
use std::sync::RwLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::config::{ChatOptions, ResolvedSettings, Settings};
use crate::error::{CompletionError, TransportError};
use crate::message::Message;
use crate::streaming::{extract_error_message, SseDecoder, SseEvent};

pub const NO_RESPONSE: &str = "No response received from Azure OpenAI";

/// Lazy, finite sequence of text increments. Not restartable.
pub type DeltaStream = BoxStream<'static, std::result::Result<String, CompletionError>>;

/// Message as sent to the completion API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: String,
    pub content: String,
}

/// Request to send to the completion API
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ApiMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    /// System prompt first, then the user/assistant history in order.
    pub fn build(history: &[Message], system_prompt: &str, options: &ChatOptions) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ApiMessage {
            role: "system".to_string(),
            content: system_prompt.to_string(),
        });
        messages.extend(
            history
                .iter()
                .filter(|m| m.role.is_conversational())
                .map(|m| ApiMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                }),
        );

        Self {
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        }
    }
}

/// A hosted chat completion endpoint.
///
/// Implementations classify every failure into [`CompletionError`] before
/// returning; callers never see raw transport errors.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Whether required settings are present and not placeholders
    fn is_configured(&self) -> bool;

    /// Replace the settings used for subsequent requests. Idempotent.
    fn configure(&self, settings: Settings);

    /// Single request, whole reply.
    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, CompletionError>;

    /// Streaming request. The returned stream yields text deltas in arrival order.
    async fn stream(&self, request: &CompletionRequest) -> std::result::Result<DeltaStream, CompletionError>;
}

/// Send `history` with `system_prompt` and return the completion text.
///
/// When `options.stream` is set, deltas are folded into cumulative text and
/// `on_partial` sees the cumulative text after every increment.
pub async fn send_completion<C, F>(
    client: &C,
    history: &[Message],
    system_prompt: &str,
    options: &ChatOptions,
    mut on_partial: F,
) -> std::result::Result<String, CompletionError>
where
    C: CompletionService + ?Sized,
    F: FnMut(&str),
{
    let request = CompletionRequest::build(history, system_prompt, options);
    tracing::debug!(
        messages = request.messages.len(),
        stream = options.stream,
        "sending completion request"
    );

    let text = if options.stream {
        let mut deltas = client.stream(&request).await?;
        let mut text = String::new();
        while let Some(delta) = deltas.next().await {
            text.push_str(&delta?);
            on_partial(&text);
        }
        text
    } else {
        client.complete(&request).await?
    };

    if text.is_empty() {
        return Err(TransportError::Unknown(NO_RESPONSE.to_string()).into());
    }
    Ok(text)
}

#[derive(Serialize)]
struct ChatPayload<'a> {
    messages: &'a [ApiMessage],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Client for an Azure OpenAI chat completions deployment
pub struct AzureClient {
    http: reqwest::Client,
    settings: RwLock<Settings>,
}

impl AzureClient {
    pub fn new(settings: Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            settings: RwLock::new(settings),
        })
    }

    fn resolved(&self) -> std::result::Result<ResolvedSettings, CompletionError> {
        let settings = self.settings.read().unwrap_or_else(|e| e.into_inner());
        Ok(settings.validate()?)
    }

    fn chat_url(settings: &ResolvedSettings) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            settings.endpoint, settings.deployment, settings.api_version
        )
    }

    async fn post(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> std::result::Result<reqwest::Response, CompletionError> {
        let settings = self.resolved()?;
        let payload = ChatPayload {
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream,
        };

        let response = self
            .http
            .post(Self::chat_url(&settings))
            .header("api-key", &settings.api_key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await.unwrap_or_default();
        let error = classify_status(status, retry_after.as_deref(), &body);
        tracing::error!(status = status.as_u16(), "completion request failed: {}", error);
        Err(error.into())
    }
}

#[async_trait]
impl CompletionService for AzureClient {
    fn is_configured(&self) -> bool {
        self.resolved().is_ok()
    }

    fn configure(&self, settings: Settings) {
        let mut current = self.settings.write().unwrap_or_else(|e| e.into_inner());
        if *current != settings {
            tracing::debug!(
                endpoint = settings.endpoint.as_deref().unwrap_or("NOT SET"),
                deployment = settings.deployment.as_deref().unwrap_or("NOT SET"),
                "completion client reconfigured"
            );
            *current = settings;
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, CompletionError> {
        let response = self.post(request, false).await?;
        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| match classify_transport(&e) {
                TransportError::Network(message) => TransportError::Network(message),
                _ => TransportError::Unknown(format!("Malformed completion response: {}", e)),
            })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| TransportError::Unknown(NO_RESPONSE.to_string()).into())
    }

    async fn stream(&self, request: &CompletionRequest) -> std::result::Result<DeltaStream, CompletionError> {
        let response = self.post(request, true).await?;
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| classify_transport(&e)));
        Ok(decode_sse(body))
    }
}

/// Map an HTTP error status to a transport category.
pub fn classify_status(status: StatusCode, retry_after: Option<&str>, body: &str) -> TransportError {
    match status {
        StatusCode::UNAUTHORIZED => TransportError::Unauthorized,
        StatusCode::NOT_FOUND => TransportError::NotFound,
        StatusCode::TOO_MANY_REQUESTS => TransportError::RateLimited {
            retry_after: retry_after.and_then(|v| v.trim().parse().ok()),
        },
        _ => {
            let detail = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|value| extract_error_message(&value))
                .unwrap_or_else(|| body.trim().to_string());
            if detail.is_empty() {
                TransportError::Unknown(format!("Azure OpenAI returned {}", status))
            } else {
                TransportError::Unknown(format!("Azure OpenAI returned {}: {}", status, detail))
            }
        }
    }
}

/// Map a failure of the HTTP client itself to a transport category.
///
/// A connection lost while the body is still arriving counts as a network
/// failure, the same as one that never connected.
pub fn classify_transport(err: &reqwest::Error) -> TransportError {
    if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() || caused_by_io(err) {
        TransportError::Network(err.to_string())
    } else {
        TransportError::Unknown(err.to_string())
    }
}

fn caused_by_io(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if cause.is::<std::io::Error>() {
            return true;
        }
        source = cause.source();
    }
    false
}

struct SseState<S> {
    body: std::pin::Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<std::result::Result<String, CompletionError>>,
    done: bool,
}

impl<S> SseState<S> {
    fn queue(&mut self, events: Vec<SseEvent>) {
        for event in events {
            match event {
                SseEvent::Delta(text) => self.pending.push_back(Ok(text)),
                SseEvent::Error(message) => {
                    self.pending.push_back(Err(TransportError::Unknown(message).into()));
                    self.done = true;
                }
                SseEvent::Done => self.done = true,
            }
        }
    }
}

/// Turn a raw event-stream body into a stream of text deltas.
pub fn decode_sse<S, B>(body: S) -> DeltaStream
where
    S: Stream<Item = std::result::Result<B, TransportError>> + Send + 'static,
    B: AsRef<[u8]> + Send,
{
    let state = SseState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(chunk.as_ref());
                    state.queue(events);
                }
                Some(Err(e)) => {
                    state.done = true;
                    state.pending.push_back(Err(e.into()));
                }
                None => {
                    let events = state.decoder.finish();
                    state.queue(events);
                    state.done = true;
                }
            }
        }
    })
    .boxed()
}
