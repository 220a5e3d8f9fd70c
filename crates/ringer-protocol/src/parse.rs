//! Parsing the JSON payloads carried by the signaling channel and the
//! identity store.

use ringer_core::{CallId, Caller, DomainError, DomainResult, MessageEntry, UserIdentity};
use serde::{Deserialize, Serialize};

use crate::event::IncomingCall;

/// Raw incoming-call payload.
///
/// Only `name` is required. The call id may arrive as `id`, `room` or
/// `call_id`; unknown fields are kept in the raw value, not here.
#[derive(Debug, Clone, Deserialize)]
pub struct RawIncomingCall {
    #[serde(default, alias = "room", alias = "call_id")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub calling_code: Option<String>,
}

impl RawIncomingCall {
    pub fn to_caller(&self) -> Caller {
        Caller {
            name: self.name.clone(),
            phone: self.phone.clone(),
            calling_code: self.calling_code.clone(),
        }
    }

    /// The explicit id, or one derived from the caller when the server
    /// omitted it.
    pub fn call_id(&self) -> CallId {
        match self.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => CallId::new(id),
            None => {
                let who = self.to_caller().e164().unwrap_or_else(|| self.name.clone());
                CallId::new(format!("caller:{who}"))
            }
        }
    }
}

/// Parses an incoming-call payload, keeping the original JSON alongside.
pub fn parse_incoming_call(data: serde_json::Value) -> DomainResult<IncomingCall> {
    let raw: RawIncomingCall =
        serde_json::from_value(data.clone()).map_err(|e| DomainError::parse("incoming_call", e))?;

    Ok(IncomingCall {
        id: raw.call_id(),
        caller: raw.to_caller(),
        data,
    })
}

/// Raw chat line payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    pub sender: String,
    #[serde(default)]
    pub name: Option<String>,
    pub message: String,
}

/// Parses a chat line payload.
pub fn parse_message(data: serde_json::Value) -> DomainResult<MessageEntry> {
    let raw: RawMessage =
        serde_json::from_value(data).map_err(|e| DomainError::parse("message", e))?;
    Ok(MessageEntry::new(
        raw.sender,
        raw.name.unwrap_or_default(),
        raw.message,
    ))
}

/// The user blob persisted under the `user` key.
///
/// Shape: `{"phone": "5551234", "details": {"calling_code": "+1"}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStoredUser {
    pub phone: String,
    pub details: RawUserDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawUserDetails {
    pub calling_code: String,
}

impl RawStoredUser {
    pub fn to_identity(&self) -> DomainResult<UserIdentity> {
        UserIdentity::new(&self.phone, &self.details.calling_code)
    }
}

impl From<&UserIdentity> for RawStoredUser {
    fn from(identity: &UserIdentity) -> Self {
        Self {
            phone: identity.phone().to_string(),
            details: RawUserDetails {
                calling_code: identity.calling_code().to_string(),
            },
        }
    }
}

/// Parses the stored user blob into an identity.
pub fn parse_stored_user(blob: &[u8]) -> DomainResult<UserIdentity> {
    let raw: RawStoredUser =
        serde_json::from_slice(blob).map_err(|e| DomainError::parse("user", e))?;
    raw.to_identity()
}

/// Serializes an identity into the stored user blob.
pub fn stored_user_blob(identity: &UserIdentity) -> DomainResult<Vec<u8>> {
    serde_json::to_vec(&RawStoredUser::from(identity)).map_err(|e| DomainError::parse("user", e))
}
