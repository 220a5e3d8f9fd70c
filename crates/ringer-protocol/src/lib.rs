//! Ringer Protocol - Signaling event contract
//!
//! This crate provides the typed events the signaling channel emits, the
//! outbound actions it accepts, and parsing of the raw JSON payloads that
//! travel on it (plus the stored user blob).

pub mod event;
pub mod parse;

pub use event::{EventKind, IncomingCall, OutboundAction, SignalingEvent};
pub use parse::{
    parse_incoming_call, parse_message, parse_stored_user, stored_user_blob, RawIncomingCall,
    RawMessage, RawStoredUser, RawUserDetails,
};
