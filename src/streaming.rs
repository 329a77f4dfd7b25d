use serde::Deserialize;

/// A decoded server-sent event from a streaming chat completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Text increment for the assistant reply
    Delta(String),
    /// Provider reported an error mid-stream
    Error(String),
    /// `data: [DONE]`
    Done,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Incremental decoder for the `text/event-stream` body of a chat completion.
///
/// Bytes are buffered until a full line is available, so chunks may split
/// lines (and UTF-8 sequences) anywhere.
#[derive(Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the response body and collect the complete events in it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            self.decode_line(&line, &mut events);
        }
        events
    }

    /// Flush a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&line, &mut events);
        events
    }

    fn decode_line(&mut self, raw: &[u8], events: &mut Vec<SseEvent>) {
        if self.finished {
            return;
        }
        let line = String::from_utf8_lossy(raw);
        if let Some(event) = parse_line(line.trim()) {
            if event == SseEvent::Done {
                self.finished = true;
            }
            events.push(event);
        }
    }
}

fn parse_line(line: &str) -> Option<SseEvent> {
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(data) {
        if value.get("error").is_some() {
            return Some(SseEvent::Error(
                extract_error_message(&value).unwrap_or_else(|| data.to_string()),
            ));
        }
        if let Ok(chunk) = serde_json::from_value::<StreamChunk>(value) {
            // Azure sends content-filter chunks with no choices; skip them
            let content = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta)
                .and_then(|delta| delta.content)
                .filter(|content| !content.is_empty())?;
            return Some(SseEvent::Delta(content));
        }
    }

    tracing::debug!("ignoring unparseable stream line: {}", data);
    None
}

/// Pull a human-readable message out of a provider error body.
pub fn extract_error_message(value: &serde_json::Value) -> Option<String> {
    value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .or_else(|| value.get("error").and_then(|v| v.as_str()))
        .or_else(|| value.get("message").and_then(|v| v.as_str()))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
}
