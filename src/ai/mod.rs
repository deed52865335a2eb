//! Streaming text-completion clients.
//!
//! A client turns one [`CompletionRequest`] into a [`FragmentStream`]: a lazy,
//! finite, non-restartable sequence of text fragments whose in-order
//! concatenation is the assistant's reply.

pub mod openai;
pub mod sse;

pub use openai::OpenAIClient;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::config::ModelParams;
use crate::state::ChatMessage;

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    #[error("connection failed: {0}")]
    Transport(String),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("malformed stream: {0}")]
    MalformedStream(String),
}

/// Everything needed for one completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    /// Prior turns, oldest first. Does not include `user_message`.
    pub history: Vec<ChatMessage>,
    pub user_message: String,
    pub params: ModelParams,
}

impl CompletionRequest {
    /// Messages in wire order: system prompt, history, then the new user turn.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if !self.system_prompt.trim().is_empty() {
            messages.push(ChatMessage::system(self.system_prompt.clone()));
        }
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(self.user_message.clone()));
        messages
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Open a streaming completion. Errors before the first byte are returned
    /// here; errors mid-stream arrive as `Err` items.
    async fn stream(&self, request: CompletionRequest) -> Result<FragmentStream, CompletionError>;
}
