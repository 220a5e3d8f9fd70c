//! Signaling events (inbound) and actions (outbound).

use ringer_core::{CallId, Caller, MessageEntry};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three subscription channels the signaling channel exposes.
///
/// At most one subscriber is active per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    IncomingCall,
    NewMessage,
    CallEnded,
}

impl EventKind {
    /// Every kind, in subscription order.
    pub const ALL: [EventKind; 3] = [Self::IncomingCall, Self::NewMessage, Self::CallEnded];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncomingCall => write!(f, "incoming_call"),
            Self::NewMessage => write!(f, "new_message"),
            Self::CallEnded => write!(f, "call_ended"),
        }
    }
}

/// A parsed incoming-call announcement.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingCall {
    pub id: CallId,
    pub caller: Caller,
    /// The payload exactly as received
    pub data: serde_json::Value,
}

/// Events delivered by the signaling channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    /// Someone is calling this device.
    IncomingCall(IncomingCall),

    /// A chat line arrived for the current call.
    NewMessage(MessageEntry),

    /// The remote party started or stopped typing.
    ///
    /// Delivered on the [`EventKind::NewMessage`] subscription.
    PeerTyping { is_typing: bool },

    /// The remote party hung up or cancelled.
    CallEnded,
}

impl SignalingEvent {
    /// The subscription this event is delivered on.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::IncomingCall(_) => EventKind::IncomingCall,
            Self::NewMessage(_) | Self::PeerTyping { .. } => EventKind::NewMessage,
            Self::CallEnded => EventKind::CallEnded,
        }
    }
}

/// Actions the client sends over the signaling channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundAction {
    /// Chat line for the other party
    Message { entry: MessageEntry },

    /// Local typing indicator
    Typing { is_typing: bool },

    AcceptCall,
    RejectCall,
    EndCall,
}

impl OutboundAction {
    /// Creates a chat message action.
    pub fn message(entry: MessageEntry) -> Self {
        Self::Message { entry }
    }

    /// Creates a typing indicator action.
    pub fn typing(is_typing: bool) -> Self {
        Self::Typing { is_typing }
    }
}
