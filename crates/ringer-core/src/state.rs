//! Orchestrator state and the read-only snapshot handed to the UI.

use crate::{CallId, CallSession, MessageEntry, MessageLog, UserIdentity};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Call State
// ============================================================================

/// Where the device is in the call lifecycle.
///
/// One tagged variant instead of independent `incoming`/`live` flags, so
/// "ringing and live at once" cannot be represented. The session lives inside
/// the variant that needs it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CallState {
    /// No identity loaded yet; the signaling channel is not connected.
    #[default]
    Unauthenticated,

    /// Signed in and reachable, no call in progress.
    Idle,

    /// A call is ringing (boxed to keep the enum small).
    Incoming(Box<CallSession>),

    /// A call was answered and is in progress.
    Live(Box<CallSession>),
}

impl CallState {
    /// Returns the display label for this state.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Idle => "idle",
            Self::Incoming(_) => "incoming",
            Self::Live(_) => "live",
        }
    }

    pub fn session(&self) -> Option<&CallSession> {
        match self {
            Self::Incoming(s) | Self::Live(s) => Some(s),
            Self::Unauthenticated | Self::Idle => None,
        }
    }

    pub fn call_id(&self) -> Option<&CallId> {
        self.session().map(|s| &s.id)
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::Unauthenticated)
    }

    #[must_use]
    pub fn is_incoming(&self) -> bool {
        matches!(self, Self::Incoming(_))
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }

    /// True while a call occupies the device (ringing or live).
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.session().is_some()
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time copy of everything a UI needs to render the call screens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSnapshot {
    /// State label ("unauthenticated", "idle", "incoming", "live")
    pub state: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub call: Option<CallSession>,

    pub messages: Vec<MessageEntry>,

    /// Whether the remote party is typing
    pub peer_typing: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub e164: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub national: Option<String>,
}

impl CallSnapshot {
    pub fn capture(
        state: &CallState,
        identity: Option<&UserIdentity>,
        messages: &MessageLog,
        peer_typing: bool,
    ) -> Self {
        Self {
            state: state.label().to_string(),
            call: state.session().cloned(),
            messages: messages.entries().to_vec(),
            peer_typing,
            e164: identity.map(UserIdentity::e164),
            national: identity.map(UserIdentity::national),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Caller;
    use serde_json::json;

    fn ringing() -> CallState {
        CallState::Incoming(Box::new(CallSession::incoming(
            CallId::new("c1"),
            Caller::named("Alice"),
            json!({"name": "Alice"}),
        )))
    }

    #[test]
    fn test_default_is_unauthenticated() {
        let state = CallState::default();
        assert_eq!(state, CallState::Unauthenticated);
        assert!(!state.is_authenticated());
        assert!(!state.is_busy());
    }

    #[test]
    fn test_labels() {
        assert_eq!(CallState::Unauthenticated.label(), "unauthenticated");
        assert_eq!(CallState::Idle.label(), "idle");
        assert_eq!(ringing().label(), "incoming");
        assert_eq!(ringing().to_string(), "incoming");
    }

    #[test]
    fn test_session_accessors() {
        let state = ringing();
        assert!(state.is_incoming());
        assert!(!state.is_live());
        assert!(state.is_busy());
        assert_eq!(state.call_id().map(CallId::as_str), Some("c1"));
        assert!(CallState::Idle.session().is_none());
    }

    #[test]
    fn test_snapshot_capture() {
        let identity = UserIdentity::new("5551234", "+1").unwrap();
        let mut log = MessageLog::new();
        log.push(MessageEntry::new("+15550000", "Alice", "hi"));

        let snap = CallSnapshot::capture(&ringing(), Some(&identity), &log, true);
        assert_eq!(snap.state, "incoming");
        assert_eq!(snap.call.as_ref().map(|c| c.caller.name.as_str()), Some("Alice"));
        assert_eq!(snap.messages.len(), 1);
        assert!(snap.peer_typing);
        assert_eq!(snap.e164.as_deref(), Some("+15551234"));
        assert_eq!(snap.national.as_deref(), Some("05551234"));
    }

    #[test]
    fn test_snapshot_without_identity() {
        let snap = CallSnapshot::capture(
            &CallState::Unauthenticated,
            None,
            &MessageLog::new(),
            false,
        );
        assert_eq!(snap.state, "unauthenticated");
        assert!(snap.call.is_none());
        assert!(snap.e164.is_none());
    }
}
