//! Ringer Core - Shared domain types for call signaling
//!
//! This crate provides the core domain types shared between
//! the signaling contract (ringer-protocol) and the runtime (ringerd).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod call;
pub mod error;
pub mod history;
pub mod identity;
pub mod message;
pub mod state;

// Re-exports for convenience
pub use call::{CallId, CallSession, CallStatus, Caller};
pub use error::{DomainError, DomainResult};
pub use history::{HistoryKind, HistoryRecord};
pub use identity::UserIdentity;
pub use message::{MessageEntry, MessageLog};
pub use state::{CallSnapshot, CallState};
