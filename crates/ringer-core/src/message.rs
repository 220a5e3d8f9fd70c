//! In-call chat messages.

use serde::{Deserialize, Serialize};

/// One chat line exchanged during a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntry {
    /// Sender's number in international form
    pub sender: String,
    /// Sender's display name (may be empty)
    #[serde(default)]
    pub name: String,
    pub message: String,
}

impl MessageEntry {
    pub fn new(
        sender: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Ordered, append-only chat log for the current call.
///
/// Ephemeral: cleared when the call ends. Call history is kept elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageLog(Vec<MessageEntry>);

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: MessageEntry) {
        self.0.push(entry);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> &[MessageEntry] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageEntry> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&MessageEntry> {
        self.0.last()
    }
}
