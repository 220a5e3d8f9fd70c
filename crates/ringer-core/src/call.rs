//! Call session entities and value objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Opaque identifier for a call, assigned by the signaling channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    /// Creates a new CallId from a string.
    ///
    /// Note: the format is not validated. The signaling server owns it.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a shortened display form (first 8 characters).
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CallId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for CallId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Caller
// ============================================================================

/// The remote party of an incoming call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Caller {
    /// Display name shown on the ringer and in the notification body
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calling_code: Option<String>,
}

impl Caller {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Caller's number in international form, when both parts are known.
    pub fn e164(&self) -> Option<String> {
        match (&self.calling_code, &self.phone) {
            (Some(code), Some(phone)) => Some(format!("{code}{phone}")),
            _ => None,
        }
    }
}

// ============================================================================
// Call Status
// ============================================================================

/// Lifecycle status of a single call session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    #[default]
    Idle,

    /// Ringing, waiting for the user to accept or reject.
    Incoming,

    /// Answered and in progress.
    Live,

    /// Finished; the session is about to be discarded.
    Ended,
}

impl CallStatus {
    /// Returns the display label for this status.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Incoming => "incoming",
            Self::Live => "live",
            Self::Ended => "ended",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Call Session
// ============================================================================

/// One call, from the incoming-call event until it is discarded.
///
/// Created by the orchestrator when the signaling channel announces a call
/// and mutated only by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSession {
    pub id: CallId,
    pub caller: Caller,
    pub status: CallStatus,

    /// When the incoming-call event was received
    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answered_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// Raw incoming-call payload, passed through to notifications and history
    #[serde(default)]
    pub call_data: serde_json::Value,
}

impl CallSession {
    /// Creates a ringing session started now.
    pub fn incoming(id: CallId, caller: Caller, call_data: serde_json::Value) -> Self {
        Self {
            id,
            caller,
            status: CallStatus::Incoming,
            started_at: Utc::now(),
            answered_at: None,
            ended_at: None,
            call_data,
        }
    }

    /// Marks the session answered. No-op unless it is ringing.
    pub fn answer(&mut self) {
        if self.status == CallStatus::Incoming {
            self.status = CallStatus::Live;
            self.answered_at = Some(Utc::now());
        }
    }

    /// Marks the session ended. Repeated calls keep the first end time.
    pub fn end(&mut self) {
        if self.status != CallStatus::Ended {
            self.status = CallStatus::Ended;
            self.ended_at = Some(Utc::now());
        }
    }

    /// How long the call rang before being answered or ended.
    pub fn ring_duration(&self) -> Option<chrono::Duration> {
        self.answered_at
            .or(self.ended_at)
            .map(|t| t.signed_duration_since(self.started_at))
    }

    /// Talk time, if the call was answered and has ended.
    pub fn talk_duration(&self) -> Option<chrono::Duration> {
        match (self.answered_at, self.ended_at) {
            (Some(a), Some(e)) => Some(e.signed_duration_since(a)),
            _ => None,
        }
    }
}
