//! Incremental decoder for the chat-completions event stream.
//!
//! Network chunks can split lines (and UTF-8 sequences) anywhere, so raw
//! bytes are buffered until a full line is available.

use serde::Deserialize;

use super::CompletionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Fragment(String),
    Done,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one network chunk and collect every complete event in it.
    /// Nothing is produced after `[DONE]`.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, CompletionError> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while !self.done {
            let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.decode_line(&line[..line.len() - 1], &mut events)?;
        }
        Ok(events)
    }

    /// Flush a final line that arrived without a trailing newline.
    pub fn finish(&mut self) -> Result<Vec<SseEvent>, CompletionError> {
        let mut events = Vec::new();
        if !self.done && !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.decode_line(&line, &mut events)?;
        }
        self.done = true;
        Ok(events)
    }

    fn decode_line(&mut self, raw: &[u8], events: &mut Vec<SseEvent>) -> Result<(), CompletionError> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| CompletionError::MalformedStream(format!("invalid UTF-8 in event line: {}", e)))?;
        let line = text.strip_suffix('\r').unwrap_or(text);

        if line.is_empty() || line.starts_with(':') {
            return Ok(());
        }
        let Some(data) = line.strip_prefix("data:") else {
            // event:, id:, retry: fields carry nothing we use
            tracing::debug!(line, "ignoring sse field");
            return Ok(());
        };
        let data = data.strip_prefix(' ').unwrap_or(data).trim_end();

        if data == "[DONE]" {
            self.done = true;
            events.push(SseEvent::Done);
            return Ok(());
        }

        let chunk: StreamChunk = serde_json::from_str(data)
            .map_err(|e| CompletionError::MalformedStream(e.to_string()))?;

        if let Some(error) = chunk.error {
            return Err(CompletionError::Api {
                status: 200,
                message: error.message,
            });
        }

        if let Some(text) = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|t| !t.is_empty())
        {
            events.push(SseEvent::Fragment(text));
        }
        Ok(())
    }
}
