//! Call history records written once per ring cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a ring cycle ended from the user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    /// Timed out or cancelled before the user reacted.
    Missed,

    /// The user saw the ring and answered or declined it.
    Received,
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missed => write!(f, "missed"),
            Self::Received => write!(f, "received"),
        }
    }
}

/// One entry in the call history log.
///
/// Serialized as `{"type": "missed", "data": {...}, "time": <epoch ms>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(rename = "type")]
    pub kind: HistoryKind,

    /// Raw incoming-call payload
    #[serde(rename = "data")]
    pub call_data: serde_json::Value,

    /// Unix epoch milliseconds
    #[serde(rename = "time")]
    pub timestamp: i64,
}

impl HistoryRecord {
    pub fn new(kind: HistoryKind, call_data: serde_json::Value) -> Self {
        Self::at(kind, call_data, Utc::now())
    }

    pub fn at(kind: HistoryKind, call_data: serde_json::Value, when: DateTime<Utc>) -> Self {
        Self {
            kind,
            call_data,
            timestamp: when.timestamp_millis(),
        }
    }

    pub fn missed(call_data: serde_json::Value) -> Self {
        Self::new(HistoryKind::Missed, call_data)
    }

    pub fn received(call_data: serde_json::Value) -> Self {
        Self::new(HistoryKind::Received, call_data)
    }
}
