//! Ordered, append-only store of the messages exchanged in one session,
//! together with the running token estimate.

use crate::session::SessionError;
use crate::state::{ChatMessage, ChatRole};

/// Approximate the billing cost of `text` as its whitespace-delimited word
/// count.
///
/// This is not a tokenizer: real token counts are usually higher for English
/// and very different for languages that don't separate words with spaces.
/// The figure shown to the user is an estimate and is labelled as such.
pub fn estimate_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    token_estimate: u64,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message to the end of the transcript.
    ///
    /// User messages must carry some non-whitespace content; nothing else is
    /// validated.
    pub fn append(&mut self, message: ChatMessage) -> Result<(), SessionError> {
        if message.role == ChatRole::User && message.content.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        self.messages.push(message);
        Ok(())
    }

    /// Empty the transcript and reset the token estimate.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.token_estimate = 0;
    }

    pub fn add_tokens(&mut self, tokens: u64) {
        self.token_estimate = self.token_estimate.saturating_add(tokens);
    }

    pub fn token_estimate(&self) -> u64 {
        self.token_estimate
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Completed user/assistant round trips
    pub fn exchange_count(&self) -> usize {
        self.messages.len() / 2
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_counts_words() {
        assert_eq!(estimate_tokens("hello world"), 2);
        assert_eq!(estimate_tokens("hi there friend"), 3);
        assert_eq!(estimate_tokens("  spaced\tout\n words "), 3);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_append_preserves_order() {
        let mut conversation = Conversation::new();
        conversation.append(ChatMessage::user("one")).unwrap();
        conversation.append(ChatMessage::assistant("two")).unwrap();
        conversation.append(ChatMessage::user("three")).unwrap();

        let contents: Vec<&str> = conversation.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
        assert_eq!(conversation.exchange_count(), 1);
    }

    #[test]
    fn test_blank_user_message_rejected() {
        let mut conversation = Conversation::new();
        assert!(matches!(
            conversation.append(ChatMessage::user("   ")),
            Err(SessionError::EmptyMessage)
        ));
        assert!(conversation.is_empty());

        // Assistant replies may legitimately be empty
        conversation.append(ChatMessage::assistant("")).unwrap();
        assert_eq!(conversation.len(), 1);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut conversation = Conversation::new();
        conversation.append(ChatMessage::user("hi")).unwrap();
        conversation.add_tokens(7);

        conversation.clear();
        assert!(conversation.is_empty());
        assert_eq!(conversation.token_estimate(), 0);

        conversation.clear();
        assert!(conversation.is_empty());
        assert_eq!(conversation.token_estimate(), 0);
    }
}
