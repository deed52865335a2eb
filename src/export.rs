//! Transportable snapshot of a conversation.
//!
//! The document is `{timestamp, model, messages}` written as indented UTF-8
//! JSON to a file named `chat_history_<YYYYMMDD_HHMMSS>.json`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::state::ChatMessage;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatExport {
    pub timestamp: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

impl ChatExport {
    /// Build an export document, or `None` when there is nothing to save.
    pub fn new(messages: &[ChatMessage], model: &str, now: NaiveDateTime) -> Option<Self> {
        if messages.is_empty() {
            return None;
        }
        Some(Self {
            timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
            model: model.to_string(),
            messages: messages.to_vec(),
        })
    }

    pub fn file_name(&self) -> String {
        format!("chat_history_{}.json", self.timestamp)
    }

    pub fn to_pretty_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize chat history")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse chat history")
    }

    /// Write the document into `dir` and return the path of the new file.
    pub fn save_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Could not create export directory {}", dir.display()))?;

        let path = dir.join(self.file_name());
        fs::write(&path, self.to_pretty_json()?)
            .with_context(|| format!("Could not write {}", path.display()))?;

        tracing::info!(path = %path.display(), messages = self.messages.len(), "exported chat history");
        Ok(path)
    }
}
