use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use reqwest::Client;
use serde::Serialize;

use super::sse::{SseDecoder, SseEvent};
use super::{CompletionClient, CompletionError, CompletionRequest, FragmentStream};
use crate::config::DEFAULT_BASE_URL;
use crate::state::ChatMessage;

const ERROR_BODY_LIMIT: usize = 200;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest silence tolerated while waiting for headers or the next chunk.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    base_url: String,
    idle_timeout: Duration,
}

impl OpenAIClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Point the client at an OpenAI-compatible gateway.
    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn stream_chat(&self, request: &CompletionRequest) -> Result<FragmentStream, CompletionError> {
        let messages = request.to_messages();
        let body = OpenAIRequest {
            model: request.params.model.as_str(),
            messages: &messages,
            temperature: request.params.temperature,
            max_tokens: request.params.max_tokens,
            stream: true,
        };

        tracing::info!(
            model = body.model,
            messages = messages.len(),
            temperature = body.temperature,
            max_tokens = body.max_tokens,
            "opening completion stream"
        );

        let pending = self.client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send();

        let response = tokio::time::timeout(self.idle_timeout, pending)
            .await
            .map_err(|_| stalled(self.idle_timeout))?
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }

        Ok(fragments(response, self.idle_timeout))
    }
}

#[async_trait]
impl CompletionClient for OpenAIClient {
    async fn stream(&self, request: CompletionRequest) -> Result<FragmentStream, CompletionError> {
        self.stream_chat(&request).await
    }
}

struct StreamState {
    response: reqwest::Response,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    failure: Option<CompletionError>,
    finished: bool,
    idle_timeout: Duration,
}

impl StreamState {
    fn absorb(&mut self, events: Vec<SseEvent>) {
        for event in events {
            match event {
                SseEvent::Fragment(text) => self.pending.push_back(text),
                SseEvent::Done => self.finished = true,
            }
        }
    }

    /// Decode a chunk line by line so fragments ahead of a bad line are kept.
    fn feed(&mut self, bytes: &[u8]) -> Result<(), CompletionError> {
        for line in bytes.split_inclusive(|&b| b == b'\n') {
            let events = self.decoder.push(line)?;
            self.absorb(events);
        }
        Ok(())
    }
}

fn stalled(idle_timeout: Duration) -> CompletionError {
    CompletionError::Transport(format!(
        "no data from server for {:.1}s",
        idle_timeout.as_secs_f32()
    ))
}

/// Pull body chunks on demand and yield decoded fragments. The first error
/// ends the stream, and so does a chunk that takes longer than `idle_timeout`.
fn fragments(response: reqwest::Response, idle_timeout: Duration) -> FragmentStream {
    let state = StreamState {
        response,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        failure: None,
        finished: false,
        idle_timeout,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(fragment) = state.pending.pop_front() {
                return Some((Ok(fragment), state));
            }
            if let Some(e) = state.failure.take() {
                return Some((Err(e), state));
            }
            if state.finished {
                return None;
            }

            let next = tokio::time::timeout(state.idle_timeout, state.response.chunk()).await;
            let outcome = match next {
                Ok(Ok(Some(bytes))) => state.feed(&bytes),
                // End of body counts as end of stream even without [DONE]
                Ok(Ok(None)) => {
                    state.finished = true;
                    let tail = state.decoder.finish();
                    tail.map(|events| state.absorb(events))
                }
                Ok(Err(e)) => Err(CompletionError::Transport(e.to_string())),
                Err(_) => Err(stalled(state.idle_timeout)),
            };

            if let Err(e) = outcome {
                tracing::warn!(error = %e, "completion stream aborted");
                state.finished = true;
                state.failure = Some(e);
            }
        }
    }))
}

/// Pull the human-readable message out of an error body, falling back to a
/// truncated copy of the raw text.
fn api_error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(|m| m.as_str()).map(str::to_string));

    let message = parsed.unwrap_or_else(|| body.trim().to_string());
    if message.chars().count() > ERROR_BODY_LIMIT {
        let truncated: String = message.chars().take(ERROR_BODY_LIMIT).collect();
        format!("{}...", truncated)
    } else {
        message
    }
}
