//! Orchestrator commands, errors, and events.
//!
//! - `OrchestratorCommand`: requests sent to the actor (UI actions, keepalive ticks)
//! - `OrchestratorError`: failures surfaced through the handle
//! - `CallEvent`: state changes published to subscribers

use ringer_core::{CallId, CallSnapshot, DomainError, HistoryRecord, MessageEntry, UserIdentity};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::signaling::SignalingError;

/// Result of a command that may legitimately be a no-op.
pub type CommandResult = Result<Outcome, OrchestratorError>;

// ============================================================================
// Commands
// ============================================================================

/// Commands sent to the orchestrator actor.
///
/// Each carries a oneshot channel for its response.
#[derive(Debug)]
pub enum OrchestratorCommand {
    /// Load the stored identity and, if present, activate.
    Bootstrap {
        respond_to: oneshot::Sender<CommandResult>,
    },

    /// Sign in as `identity` (persisted under the `user` key).
    Authenticate {
        identity: UserIdentity,
        respond_to: oneshot::Sender<CommandResult>,
    },

    /// Answer the ringing call.
    Accept { respond_to: oneshot::Sender<Outcome> },

    /// Decline the ringing call.
    Reject { respond_to: oneshot::Sender<Outcome> },

    /// Hang up the live call.
    EndCall { respond_to: oneshot::Sender<Outcome> },

    /// Give up on the ringing call as if it timed out.
    FinishRing { respond_to: oneshot::Sender<Outcome> },

    /// Send a chat line during a live call.
    SendMessage {
        text: String,
        respond_to: oneshot::Sender<CommandResult>,
    },

    /// Send the local typing indicator during a live call.
    SetTyping {
        is_typing: bool,
        respond_to: oneshot::Sender<CommandResult>,
    },

    /// Re-establish the signaling connection and subscriptions.
    ///
    /// Sent by the keepalive task.
    Reconnect {
        respond_to: oneshot::Sender<Result<(), OrchestratorError>>,
    },

    GetSnapshot {
        respond_to: oneshot::Sender<CallSnapshot>,
    },
}

/// Whether a command changed anything.
///
/// Triggers that do not apply to the current state (accept while idle,
/// hang up with no call) are not errors; they report `Ignored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Ignored,
}

impl Outcome {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    /// The actor has shut down.
    #[error("response channel closed")]
    ChannelClosed,

    #[error("no signed-in user")]
    NotAuthenticated,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("signaling error: {0}")]
    Signaling(#[from] SignalingError),

    /// The stored identity could not be read.
    #[error("invalid identity: {0}")]
    Identity(#[from] DomainError),
}

impl OrchestratorError {
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        Self::Storage(err.to_string())
    }
}

// ============================================================================
// Events
// ============================================================================

/// Events published to every subscriber of the orchestrator.
#[derive(Debug, Clone)]
pub enum CallEvent {
    StateChanged {
        from: &'static str,
        to: &'static str,
        /// The call involved, if either side of the transition had one
        call_id: Option<CallId>,
    },

    MessageAppended { entry: MessageEntry },

    /// The remote party's typing indicator changed.
    TypingChanged { is_typing: bool },

    HistoryLogged { record: HistoryRecord },

    /// An incoming call was discarded without ringing.
    IncomingDropped { call_id: CallId, reason: DropReason },
}

/// Why an incoming call did not ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Another call is ringing or live.
    Busy,

    /// No identity is loaded yet.
    Unauthenticated,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Busy => write!(f, "another call in progress"),
            Self::Unauthenticated => write!(f, "not signed in"),
        }
    }
}
