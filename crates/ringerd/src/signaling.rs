//! Signaling channel adapter contract and an in-process loopback.
//!
//! The transport itself (socket protocol, server) is out of scope; the
//! orchestrator depends only on [`SignalingAdapter`]. Events are delivered
//! into bounded mpsc sinks, one per [`EventKind`], so every inbound event is
//! serialized through the orchestrator's queue.

use std::collections::HashMap;

use async_trait::async_trait;
use ringer_core::{MessageEntry, UserIdentity};
use ringer_protocol::{EventKind, OutboundAction, SignalingEvent};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Where the adapter delivers events of one kind.
pub type EventSink = mpsc::Sender<SignalingEvent>;

/// Failures reported by a signaling adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignalingError {
    #[error("signaling channel not connected")]
    NotConnected,

    #[error("failed to connect: {0}")]
    ConnectFailed(String),

    #[error("failed to send: {0}")]
    SendFailed(String),
}

/// Bidirectional real-time channel used for call control and chat.
#[async_trait]
pub trait SignalingAdapter: Send + Sync {
    /// Connects as `identity`. Idempotent: connecting while connected must
    /// not open a second session.
    async fn connect(&self, identity: &UserIdentity) -> Result<(), SignalingError>;

    async fn disconnect(&self);

    /// Routes events of `kind` to `sink`, replacing any previous subscriber.
    async fn subscribe(&self, kind: EventKind, sink: EventSink);

    async fn send(&self, action: OutboundAction) -> Result<(), SignalingError>;

    async fn is_connected(&self) -> bool;

    async fn send_message(&self, entry: MessageEntry) -> Result<(), SignalingError> {
        self.send(OutboundAction::message(entry)).await
    }

    async fn send_typing_state(&self, is_typing: bool) -> Result<(), SignalingError> {
        self.send(OutboundAction::typing(is_typing)).await
    }

    async fn accept_call(&self) -> Result<(), SignalingError> {
        self.send(OutboundAction::AcceptCall).await
    }

    async fn reject_call(&self) -> Result<(), SignalingError> {
        self.send(OutboundAction::RejectCall).await
    }

    async fn end_call(&self) -> Result<(), SignalingError> {
        self.send(OutboundAction::EndCall).await
    }
}

// ============================================================================
// Loopback
// ============================================================================

#[derive(Default)]
struct LoopbackState {
    /// e164 of the connected identity
    connected_as: Option<String>,
    /// Number of sessions actually opened
    sessions_opened: usize,
    subscribers: HashMap<EventKind, EventSink>,
    sent: Vec<OutboundAction>,
    fail_connect: bool,
}

/// In-process signaling channel.
///
/// Outbound actions are recorded; inbound events are injected with
/// [`LoopbackSignaling::emit`]. Used by the `ringerd` console and tests.
#[derive(Default)]
pub struct LoopbackSignaling {
    state: Mutex<LoopbackState>,
}

impl LoopbackSignaling {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `event` to the subscriber of its kind.
    ///
    /// Returns `false` if nobody is subscribed or the subscriber is gone.
    pub async fn emit(&self, event: SignalingEvent) -> bool {
        let kind = event.kind();
        let sink = self.state.lock().await.subscribers.get(&kind).cloned();

        match sink {
            Some(sink) => {
                if sink.send(event).await.is_err() {
                    debug!(kind = %kind, "Subscriber dropped, event discarded");
                    return false;
                }
                true
            }
            None => {
                debug!(kind = %kind, "No subscriber for event, discarded");
                false
            }
        }
    }

    /// Makes subsequent `connect` calls fail (simulates an unreachable server).
    pub async fn set_fail_connect(&self, fail: bool) {
        self.state.lock().await.fail_connect = fail;
    }

    /// Every outbound action sent so far, oldest first.
    pub async fn sent(&self) -> Vec<OutboundAction> {
        self.state.lock().await.sent.clone()
    }

    pub async fn sessions_opened(&self) -> usize {
        self.state.lock().await.sessions_opened
    }

    pub async fn connected_as(&self) -> Option<String> {
        self.state.lock().await.connected_as.clone()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.state.lock().await.subscribers.len()
    }
}

#[async_trait]
impl SignalingAdapter for LoopbackSignaling {
    async fn connect(&self, identity: &UserIdentity) -> Result<(), SignalingError> {
        let mut state = self.state.lock().await;
        let e164 = identity.e164();

        if state.fail_connect {
            warn!(user = %e164, "Loopback connect refused");
            return Err(SignalingError::ConnectFailed("server unreachable".to_string()));
        }

        if state.connected_as.as_deref() == Some(e164.as_str()) {
            debug!(user = %e164, "Already connected, reusing session");
            return Ok(());
        }

        state.connected_as = Some(e164.clone());
        state.sessions_opened += 1;
        info!(user = %e164, "Signaling connected");
        Ok(())
    }

    async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        if let Some(user) = state.connected_as.take() {
            info!(user = %user, "Signaling disconnected");
        }
    }

    async fn subscribe(&self, kind: EventKind, sink: EventSink) {
        let replaced = self.state.lock().await.subscribers.insert(kind, sink).is_some();
        debug!(kind = %kind, replaced, "Subscribed");
    }

    async fn send(&self, action: OutboundAction) -> Result<(), SignalingError> {
        let mut state = self.state.lock().await;
        if state.connected_as.is_none() {
            return Err(SignalingError::NotConnected);
        }
        debug!(action = ?action, "Outbound action");
        state.sent.push(action);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().await.connected_as.is_some()
    }
}
