//! Orchestrator actor - owns the call state and runs every transition.
//!
//! The actor drains three queues with one `select!`: commands from handles
//! and the keepalive task, events from the signaling channel, and ring timer
//! expiries. One message is handled at a time, so side effects of a
//! transition never interleave with another transition.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Collaborator failures are logged and the transition completes anyway
//! - Response send failures are ignored (the caller went away)

use std::sync::Arc;

use ringer_core::{
    CallSession, CallSnapshot, CallState, HistoryRecord, MessageEntry, MessageLog, UserIdentity,
};
use ringer_protocol::{parse_stored_user, stored_user_blob, EventKind, IncomingCall, SignalingEvent};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::commands::{
    CallEvent, CommandResult, DropReason, OrchestratorCommand, OrchestratorError, Outcome,
};
use crate::host::{BackgroundTask, HostServices, USER_KEY};
use crate::keepalive::{KeepaliveScheduler, KeepaliveSettings};
use crate::ring::{RingCoordinator, RingExpired, RingSettings};
use crate::signaling::{SignalingAdapter, SignalingError};

/// Capacity of the inbound signaling event queue.
pub const SIGNAL_BUFFER: usize = 64;

/// Capacity of the ring expiry queue.
const EXPIRY_BUFFER: usize = 4;

/// Tunables for the ring coordinator and keepalive scheduler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrchestratorSettings {
    pub ring: RingSettings,
    pub keepalive: KeepaliveSettings,
}

// ============================================================================
// Call Orchestrator
// ============================================================================

/// The orchestrator actor.
///
/// Owns the [`CallState`], the signed-in identity, the chat log of the
/// current call and the peer typing flag. The ring coordinator and the
/// keepalive scheduler are owned here too, so ringing and registration only
/// ever change as part of a transition.
pub struct CallOrchestrator {
    receiver: mpsc::Receiver<OrchestratorCommand>,

    /// Inbound signaling events; the sender half is handed to the adapter
    signals: mpsc::Receiver<SignalingEvent>,
    signal_sink: mpsc::Sender<SignalingEvent>,

    expiries: mpsc::Receiver<RingExpired>,

    event_publisher: broadcast::Sender<CallEvent>,

    host: HostServices,
    signaling: Arc<dyn SignalingAdapter>,
    ring: RingCoordinator,
    keepalive: KeepaliveScheduler,

    state: CallState,
    identity: Option<UserIdentity>,
    messages: MessageLog,
    peer_typing: bool,
}

impl CallOrchestrator {
    /// Creates an orchestrator in `Unauthenticated`.
    ///
    /// `keepalive_task` is what the host runs on every keepalive tick.
    pub fn new(
        receiver: mpsc::Receiver<OrchestratorCommand>,
        event_publisher: broadcast::Sender<CallEvent>,
        settings: OrchestratorSettings,
        host: HostServices,
        signaling: Arc<dyn SignalingAdapter>,
        keepalive_task: Arc<dyn BackgroundTask>,
    ) -> Self {
        let (signal_sink, signals) = mpsc::channel(SIGNAL_BUFFER);
        let (expiry_sink, expiries) = mpsc::channel(EXPIRY_BUFFER);

        let ring = RingCoordinator::new(
            Arc::clone(&host.audio),
            Arc::clone(&host.permissions),
            Arc::clone(&host.notifier),
            Arc::clone(&host.settings),
            settings.ring,
            expiry_sink,
        );
        let keepalive = KeepaliveScheduler::new(
            Arc::clone(&host.task_host),
            settings.keepalive,
            keepalive_task,
        );

        Self {
            receiver,
            signals,
            signal_sink,
            expiries,
            event_publisher,
            host,
            signaling,
            ring,
            keepalive,
            state: CallState::Unauthenticated,
            identity: None,
            messages: MessageLog::new(),
            peer_typing: false,
        }
    }

    /// Runs the event loop until every command sender is dropped.
    pub async fn run(mut self) {
        info!("Call orchestrator starting");

        loop {
            tokio::select! {
                biased;

                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },

                Some(event) = self.signals.recv() => {
                    self.handle_signal(event).await;
                }

                Some(expired) = self.expiries.recv() => {
                    self.handle_ring_expired(expired).await;
                }
            }
        }

        self.shutdown().await;
        info!(state = %self.state, "Call orchestrator stopped");
    }

    async fn shutdown(&mut self) {
        self.ring.stop().await;
        self.keepalive.disarm().await;
        self.signaling.disconnect().await;
    }

    /// Dispatches a command to its handler.
    async fn handle_command(&mut self, cmd: OrchestratorCommand) {
        match cmd {
            OrchestratorCommand::Bootstrap { respond_to } => {
                let result = self.handle_bootstrap().await;
                let _ = respond_to.send(result);
            }
            OrchestratorCommand::Authenticate {
                identity,
                respond_to,
            } => {
                let result = self.handle_authenticate(identity).await;
                let _ = respond_to.send(result);
            }
            OrchestratorCommand::Accept { respond_to } => {
                let result = self.handle_accept().await;
                let _ = respond_to.send(result);
            }
            OrchestratorCommand::Reject { respond_to } => {
                let result = self.handle_reject().await;
                let _ = respond_to.send(result);
            }
            OrchestratorCommand::EndCall { respond_to } => {
                let result = self.handle_end_call(false).await;
                let _ = respond_to.send(result);
            }
            OrchestratorCommand::FinishRing { respond_to } => {
                let result = self.handle_missed("finished").await;
                let _ = respond_to.send(result);
            }
            OrchestratorCommand::SendMessage { text, respond_to } => {
                let result = self.handle_send_message(text).await;
                let _ = respond_to.send(result);
            }
            OrchestratorCommand::SetTyping {
                is_typing,
                respond_to,
            } => {
                let result = self.handle_set_typing(is_typing).await;
                let _ = respond_to.send(result);
            }
            OrchestratorCommand::Reconnect { respond_to } => {
                let result = self.handle_reconnect().await;
                let _ = respond_to.send(result);
            }
            OrchestratorCommand::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }
    }

    /// Dispatches an inbound signaling event.
    async fn handle_signal(&mut self, event: SignalingEvent) {
        match event {
            SignalingEvent::IncomingCall(call) => self.handle_incoming_call(call).await,
            SignalingEvent::NewMessage(entry) => self.handle_new_message(entry),
            SignalingEvent::PeerTyping { is_typing } => self.handle_peer_typing(is_typing),
            SignalingEvent::CallEnded => self.handle_remote_end().await,
        }
    }

    /// A ring timer fired. Stale tokens (the ring already ended) are dropped.
    async fn handle_ring_expired(&mut self, expired: RingExpired) {
        if !self.ring.is_current(expired.token) {
            debug!(
                call_id = %expired.call_id,
                ring = expired.token.value(),
                "Stale ring expiry, ignoring"
            );
            return;
        }
        self.handle_missed("timed out").await;
    }

    // ========================================================================
    // Identity
    // ========================================================================

    async fn handle_bootstrap(&mut self) -> CommandResult {
        if self.state.is_authenticated() {
            debug!("Bootstrap while already signed in, ignoring");
            return Ok(Outcome::Ignored);
        }

        let blob = self
            .host
            .identity_store
            .get(USER_KEY)
            .await
            .map_err(OrchestratorError::storage)?;

        let Some(blob) = blob else {
            info!("No stored identity, waiting for sign-in");
            return Ok(Outcome::Ignored);
        };

        let identity = parse_stored_user(&blob).map_err(|e| {
            warn!(error = %e, "Stored identity is unreadable");
            OrchestratorError::Identity(e)
        })?;

        self.identity = Some(identity);
        self.activate().await;
        Ok(Outcome::Applied)
    }

    async fn handle_authenticate(&mut self, identity: UserIdentity) -> CommandResult {
        self.persist_identity(&identity).await;

        if !self.state.is_authenticated() {
            self.identity = Some(identity);
            self.activate().await;
            return Ok(Outcome::Applied);
        }

        if self.identity.as_ref() == Some(&identity) {
            debug!(user = %identity, "Already signed in as this user");
            return Ok(Outcome::Ignored);
        }

        info!(user = %identity, "Switching signed-in user");
        // Calls on the old user's channel end before the switch
        if self.state.is_incoming() {
            self.handle_missed("user switched").await;
        } else if self.state.is_live() {
            self.handle_end_call(false).await;
        }
        self.signaling.disconnect().await;
        if let Err(e) = self.connect_and_subscribe(&identity).await {
            warn!(user = %identity, error = %e, "Signaling connect failed");
        }
        self.identity = Some(identity);
        Ok(Outcome::Applied)
    }

    async fn persist_identity(&self, identity: &UserIdentity) {
        let blob = match stored_user_blob(identity) {
            Ok(blob) => blob,
            Err(e) => {
                warn!(error = %e, "Could not encode identity");
                return;
            }
        };
        if let Err(e) = self.host.identity_store.set(USER_KEY, blob).await {
            warn!(user = %identity, error = %e, "Failed to persist identity");
        }
    }

    /// Unauthenticated → Idle: connect, subscribe, arm the keepalive.
    async fn activate(&mut self) {
        let Some(identity) = self.identity.clone() else {
            return;
        };

        self.set_state(CallState::Idle);
        info!(user = %identity, national = %identity.national(), "Signed in");

        if let Err(e) = self.connect_and_subscribe(&identity).await {
            warn!(user = %identity, error = %e, "Signaling connect failed, keepalive will retry");
        }
        self.keepalive.arm().await;
    }

    /// Connects and subscribes every event kind. Subscriptions are made even
    /// if the connect fails so a later reconnect delivers events.
    async fn connect_and_subscribe(&self, identity: &UserIdentity) -> Result<(), SignalingError> {
        let result = self.signaling.connect(identity).await;
        for kind in EventKind::ALL {
            self.signaling.subscribe(kind, self.signal_sink.clone()).await;
        }
        result
    }

    async fn handle_reconnect(&mut self) -> Result<(), OrchestratorError> {
        let Some(identity) = self.identity.clone() else {
            debug!("Reconnect requested before sign-in");
            return Err(OrchestratorError::NotAuthenticated);
        };
        self.connect_and_subscribe(&identity).await?;
        debug!(user = %identity, "Signaling re-established");
        Ok(())
    }

    // ========================================================================
    // Ring Cycle
    // ========================================================================

    async fn handle_incoming_call(&mut self, call: IncomingCall) {
        let reason = match &self.state {
            CallState::Idle => None,
            CallState::Unauthenticated => Some(DropReason::Unauthenticated),
            CallState::Incoming(_) | CallState::Live(_) => Some(DropReason::Busy),
        };

        if let Some(reason) = reason {
            info!(
                call_id = %call.id,
                caller = %call.caller.name,
                state = %self.state,
                reason = %reason,
                "Incoming call dropped"
            );
            self.publish(CallEvent::IncomingDropped {
                call_id: call.id,
                reason,
            });
            return;
        }

        let session = CallSession::incoming(call.id, call.caller, call.data);
        self.messages.clear();
        self.set_peer_typing(false);

        self.ring.start(&session).await;
        self.set_state(CallState::Incoming(Box::new(session)));
    }

    /// The ringing session, if the state is `Incoming`.
    fn ringing_session(&self, action: &str) -> Option<CallSession> {
        match &self.state {
            CallState::Incoming(session) => Some(session.as_ref().clone()),
            other => {
                debug!(action, state = %other, "Not ringing, ignoring");
                None
            }
        }
    }

    /// Incoming → Live.
    async fn handle_accept(&mut self) -> Outcome {
        let Some(mut session) = self.ringing_session("accept") else {
            return Outcome::Ignored;
        };

        self.log_history(HistoryRecord::received(session.call_data.clone()))
            .await;
        self.ring.stop().await;
        self.keepalive.disarm().await;

        session.answer();
        info!(call_id = %session.id, caller = %session.caller.name, "Call accepted");
        self.set_state(CallState::Live(Box::new(session)));

        if let Err(e) = self.signaling.accept_call().await {
            warn!(error = %e, "Failed to send accept");
        }
        Outcome::Applied
    }

    /// Incoming → Idle, declined locally.
    async fn handle_reject(&mut self) -> Outcome {
        let Some(mut session) = self.ringing_session("reject") else {
            return Outcome::Ignored;
        };

        self.log_history(HistoryRecord::received(session.call_data.clone()))
            .await;
        self.ring.stop().await;
        self.keepalive.disarm().await;
        self.clear_conversation();

        session.end();
        info!(call_id = %session.id, caller = %session.caller.name, "Call rejected");
        self.set_state(CallState::Idle);

        if let Err(e) = self.signaling.reject_call().await {
            warn!(error = %e, "Failed to send reject");
        }
        self.keepalive.arm().await;
        Outcome::Applied
    }

    /// Incoming → Idle without an answer (timeout, explicit finish, or the
    /// caller hanging up first).
    async fn handle_missed(&mut self, how: &'static str) -> Outcome {
        let Some(mut session) = self.ringing_session(how) else {
            return Outcome::Ignored;
        };

        self.ring.stop().await;
        self.keepalive.disarm().await;
        self.log_history(HistoryRecord::missed(session.call_data.clone()))
            .await;
        self.clear_conversation();

        session.end();
        info!(
            call_id = %session.id,
            caller = %session.caller.name,
            ring_secs = session.ring_duration().map(|d| d.num_seconds()).unwrap_or(0),
            how,
            "Call missed"
        );
        self.set_state(CallState::Idle);
        self.keepalive.arm().await;
        Outcome::Applied
    }

    /// Live → Idle. `remote` is true when the other party hung up.
    async fn handle_end_call(&mut self, remote: bool) -> Outcome {
        let mut session = match &self.state {
            CallState::Live(session) => session.as_ref().clone(),
            other => {
                debug!(state = %other, "No live call to end, ignoring");
                return Outcome::Ignored;
            }
        };

        self.clear_conversation();
        session.end();
        info!(
            call_id = %session.id,
            talk_secs = session.talk_duration().map(|d| d.num_seconds()).unwrap_or(0),
            remote,
            "Call ended"
        );
        self.set_state(CallState::Idle);

        if let Err(e) = self.signaling.end_call().await {
            warn!(error = %e, "Failed to send end call");
        }
        self.keepalive.arm().await;
        Outcome::Applied
    }

    async fn handle_remote_end(&mut self) {
        match &self.state {
            CallState::Incoming(_) => {
                self.handle_missed("cancelled by caller").await;
            }
            CallState::Live(_) => {
                self.handle_end_call(true).await;
            }
            other => debug!(state = %other, "Call ended with no call in progress, ignoring"),
        }
    }

    async fn log_history(&self, record: HistoryRecord) {
        if let Err(e) = self.host.history.append(record.clone()).await {
            warn!(kind = ?record.kind, error = %e, "Failed to log call history");
        }
        self.publish(CallEvent::HistoryLogged { record });
    }

    // ========================================================================
    // Chat
    // ========================================================================

    fn handle_new_message(&mut self, entry: MessageEntry) {
        if !self.state.is_busy() {
            debug!(sender = %entry.sender, state = %self.state, "Message outside a call, discarding");
            return;
        }
        self.messages.push(entry.clone());
        debug!(sender = %entry.sender, count = self.messages.len(), "Message received");
        self.publish(CallEvent::MessageAppended { entry });
    }

    fn handle_peer_typing(&mut self, is_typing: bool) {
        if !self.state.is_live() {
            debug!(is_typing, state = %self.state, "Typing outside a live call, ignoring");
            return;
        }
        self.set_peer_typing(is_typing);
    }

    async fn handle_send_message(&mut self, text: String) -> CommandResult {
        let Some(identity) = &self.identity else {
            return Err(OrchestratorError::NotAuthenticated);
        };
        if !self.state.is_live() {
            debug!(state = %self.state, "Send outside a live call, ignoring");
            return Ok(Outcome::Ignored);
        }

        let entry = MessageEntry::new(identity.e164(), "", text);
        self.signaling.send_message(entry).await?;
        Ok(Outcome::Applied)
    }

    async fn handle_set_typing(&mut self, is_typing: bool) -> CommandResult {
        if self.identity.is_none() {
            return Err(OrchestratorError::NotAuthenticated);
        }
        if !self.state.is_live() {
            return Ok(Outcome::Ignored);
        }

        self.signaling.send_typing_state(is_typing).await?;
        Ok(Outcome::Applied)
    }

    fn clear_conversation(&mut self) {
        self.messages.clear();
        self.set_peer_typing(false);
    }

    fn set_peer_typing(&mut self, is_typing: bool) {
        if self.peer_typing != is_typing {
            self.peer_typing = is_typing;
            self.publish(CallEvent::TypingChanged { is_typing });
        }
    }

    // ========================================================================
    // State
    // ========================================================================

    fn set_state(&mut self, next: CallState) {
        let previous = std::mem::replace(&mut self.state, next);
        let call_id = self
            .state
            .call_id()
            .or_else(|| previous.call_id())
            .cloned();

        debug!(from = %previous, to = %self.state, "State changed");
        self.publish(CallEvent::StateChanged {
            from: previous.label(),
            to: self.state.label(),
            call_id,
        });
    }

    fn snapshot(&self) -> CallSnapshot {
        CallSnapshot::capture(
            &self.state,
            self.identity.as_ref(),
            &self.messages,
            self.peer_typing,
        )
    }

    fn publish(&self, event: CallEvent) {
        // No subscribers is fine
        let _ = self.event_publisher.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{IdentityStore, PermissionStatus, Ringtone, TaskResult};
    use crate::local::{
        HeadlessAudio, MemoryHistorySink, MemoryIdentityStore, RecordingNotifier,
        StaticPermissionGate, StaticSettings, TokioTaskHost,
    };
    use crate::signaling::LoopbackSignaling;
    use async_trait::async_trait;
    use ringer_core::{CallId, Caller, HistoryKind};
    use ringer_protocol::OutboundAction;
    use serde_json::json;

    struct NoopTask;

    #[async_trait]
    impl BackgroundTask for NoopTask {
        async fn run(&self) -> TaskResult {
            TaskResult::NoData
        }
    }

    struct Fixture {
        actor: CallOrchestrator,
        audio: Arc<HeadlessAudio>,
        history: Arc<MemoryHistorySink>,
        store: Arc<MemoryIdentityStore>,
        task_host: Arc<TokioTaskHost>,
        signaling: Arc<LoopbackSignaling>,
        events: broadcast::Receiver<CallEvent>,
        _commands: mpsc::Sender<OrchestratorCommand>,
    }

    fn fixture() -> Fixture {
        let audio = Arc::new(HeadlessAudio::new());
        let history = Arc::new(MemoryHistorySink::new());
        let store = Arc::new(MemoryIdentityStore::new());
        let task_host = Arc::new(TokioTaskHost::new());
        let signaling = Arc::new(LoopbackSignaling::new());

        let host = HostServices {
            identity_store: store.clone(),
            history: history.clone(),
            settings: Arc::new(StaticSettings::new(Ringtone::new("ring.mp3"))),
            permissions: Arc::new(StaticPermissionGate::new(PermissionStatus::Granted)),
            notifier: Arc::new(RecordingNotifier::new()),
            audio: audio.clone(),
            task_host: task_host.clone(),
        };

        let (tx, rx) = mpsc::channel(8);
        let (event_tx, events) = broadcast::channel(64);
        let actor = CallOrchestrator::new(
            rx,
            event_tx,
            OrchestratorSettings::default(),
            host,
            signaling.clone(),
            Arc::new(NoopTask),
        );

        Fixture {
            actor,
            audio,
            history,
            store,
            task_host,
            signaling,
            events,
            _commands: tx,
        }
    }

    fn identity() -> UserIdentity {
        UserIdentity::new("5551234", "+1").unwrap()
    }

    fn incoming(id: &str, name: &str) -> IncomingCall {
        IncomingCall {
            id: CallId::new(id),
            caller: Caller::named(name),
            data: json!({ "name": name }),
        }
    }

    async fn signed_in() -> Fixture {
        let mut f = fixture();
        f.actor.handle_authenticate(identity()).await.unwrap();
        f
    }

    async fn ringing() -> Fixture {
        let mut f = signed_in().await;
        f.actor.handle_incoming_call(incoming("c1", "Alice")).await;
        f
    }

    fn drain(events: &mut broadcast::Receiver<CallEvent>) -> Vec<CallEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_new_orchestrator_is_unauthenticated() {
        let f = fixture();
        assert_eq!(f.actor.state, CallState::Unauthenticated);
        assert_eq!(f.actor.snapshot().state, "unauthenticated");
    }

    #[tokio::test]
    async fn test_authenticate_activates_and_persists() {
        let mut f = fixture();
        let outcome = f.actor.handle_authenticate(identity()).await.unwrap();

        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(f.actor.state, CallState::Idle);
        assert_eq!(f.signaling.connected_as().await.as_deref(), Some("+15551234"));
        assert_eq!(f.signaling.subscriber_count().await, 3);
        assert!(f.actor.keepalive.is_armed());
        assert!(f.store.get(USER_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_authenticate_same_user_is_ignored() {
        let mut f = signed_in().await;
        let outcome = f.actor.handle_authenticate(identity()).await.unwrap();
        assert_eq!(outcome, Outcome::Ignored);
        assert_eq!(f.signaling.sessions_opened().await, 1);
    }

    #[tokio::test]
    async fn test_authenticate_other_user_reconnects() {
        let mut f = signed_in().await;
        let other = UserIdentity::new("7700900", "+44").unwrap();

        let outcome = f.actor.handle_authenticate(other).await.unwrap();
        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(f.signaling.connected_as().await.as_deref(), Some("+447700900"));
        assert_eq!(f.signaling.sessions_opened().await, 2);
        assert_eq!(f.actor.state, CallState::Idle);
    }

    #[tokio::test]
    async fn test_switching_user_while_ringing_misses_the_call() {
        let mut f = ringing().await;
        let other = UserIdentity::new("7700900", "+44").unwrap();

        assert_eq!(f.actor.handle_authenticate(other).await.unwrap(), Outcome::Applied);
        assert_eq!(f.actor.state, CallState::Idle);
        assert!(!f.actor.ring.is_ringing());
        assert!(!f.audio.is_playing().await);
        let records = f.history.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, HistoryKind::Missed);
        assert!(f.actor.keepalive.is_armed());
        assert_eq!(f.signaling.connected_as().await.as_deref(), Some("+447700900"));
    }

    #[tokio::test]
    async fn test_switching_user_while_live_ends_the_call() {
        let mut f = ringing().await;
        f.actor.handle_accept().await;
        f.actor
            .handle_new_message(MessageEntry::new("+15550000", "Alice", "hi"));
        let other = UserIdentity::new("7700900", "+44").unwrap();

        assert_eq!(f.actor.handle_authenticate(other).await.unwrap(), Outcome::Applied);
        assert_eq!(f.actor.state, CallState::Idle);
        assert!(f.actor.messages.is_empty());
        assert!(f.actor.keepalive.is_armed());
        // End goes out on the old session, before the disconnect
        assert_eq!(
            f.signaling.sent().await,
            vec![OutboundAction::AcceptCall, OutboundAction::EndCall]
        );
        assert_eq!(f.signaling.sessions_opened().await, 2);
    }

    #[tokio::test]
    async fn test_bootstrap_without_stored_identity() {
        let mut f = fixture();
        assert_eq!(f.actor.handle_bootstrap().await.unwrap(), Outcome::Ignored);
        assert_eq!(f.actor.state, CallState::Unauthenticated);
        assert!(!f.signaling.is_connected().await);
    }

    #[tokio::test]
    async fn test_bootstrap_rejects_corrupt_blob() {
        let mut f = fixture();
        f.store.set(USER_KEY, b"not json".to_vec()).await.unwrap();

        let err = f.actor.handle_bootstrap().await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Identity(_)));
        assert_eq!(f.actor.state, CallState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_incoming_call_rings() {
        let f = ringing().await;
        assert!(f.actor.state.is_incoming());
        assert!(f.actor.ring.is_ringing());
        assert!(f.audio.is_playing().await);
    }

    #[tokio::test]
    async fn test_incoming_while_unauthenticated_is_dropped() {
        let mut f = fixture();
        f.actor.handle_incoming_call(incoming("c1", "Alice")).await;

        assert_eq!(f.actor.state, CallState::Unauthenticated);
        assert!(!f.actor.ring.is_ringing());
        assert!(drain(&mut f.events).iter().any(|e| matches!(
            e,
            CallEvent::IncomingDropped {
                reason: DropReason::Unauthenticated,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_second_incoming_is_dropped_while_ringing() {
        let mut f = ringing().await;
        f.actor.handle_incoming_call(incoming("c2", "Bob")).await;

        assert_eq!(f.actor.state.call_id(), Some(&CallId::new("c1")));
        assert_eq!(f.audio.load_count().await, 1);
    }

    #[tokio::test]
    async fn test_accept_moves_to_live() {
        let mut f = ringing().await;
        assert_eq!(f.actor.handle_accept().await, Outcome::Applied);

        assert!(f.actor.state.is_live());
        assert!(!f.actor.ring.is_ringing());
        assert!(!f.actor.keepalive.is_armed());
        assert_eq!(f.history.records().await.len(), 1);
        assert_eq!(f.history.records().await[0].kind, HistoryKind::Received);
        assert_eq!(f.signaling.sent().await, vec![OutboundAction::AcceptCall]);
    }

    #[tokio::test]
    async fn test_accept_and_reject_ignored_when_idle() {
        let mut f = signed_in().await;
        drain(&mut f.events);

        assert_eq!(f.actor.handle_accept().await, Outcome::Ignored);
        assert_eq!(f.actor.handle_reject().await, Outcome::Ignored);

        assert_eq!(f.actor.state, CallState::Idle);
        assert!(f.history.records().await.is_empty());
        assert!(f.signaling.sent().await.is_empty());
        assert!(drain(&mut f.events).is_empty());
    }

    #[tokio::test]
    async fn test_accept_and_reject_ignored_while_live() {
        let mut f = ringing().await;
        assert_eq!(f.actor.handle_accept().await, Outcome::Applied);
        drain(&mut f.events);

        assert_eq!(f.actor.handle_accept().await, Outcome::Ignored);
        assert_eq!(f.actor.handle_reject().await, Outcome::Ignored);

        assert!(f.actor.state.is_live());
        assert_eq!(f.history.records().await.len(), 1);
        assert_eq!(f.signaling.sent().await, vec![OutboundAction::AcceptCall]);
        assert!(!f.actor.keepalive.is_armed());
        assert!(drain(&mut f.events).is_empty());
    }

    #[tokio::test]
    async fn test_accept_and_reject_ignored_when_unauthenticated() {
        let mut f = fixture();

        assert_eq!(f.actor.handle_accept().await, Outcome::Ignored);
        assert_eq!(f.actor.handle_reject().await, Outcome::Ignored);

        assert_eq!(f.actor.state, CallState::Unauthenticated);
        assert!(f.history.records().await.is_empty());
        assert!(f.signaling.sent().await.is_empty());
        assert_eq!(f.task_host.total_registrations().await, 0);
        assert!(drain(&mut f.events).is_empty());
    }

    #[tokio::test]
    async fn test_reject_returns_to_idle() {
        let mut f = ringing().await;
        f.actor
            .handle_new_message(MessageEntry::new("+15550000", "Alice", "hi"));

        assert_eq!(f.actor.handle_reject().await, Outcome::Applied);
        assert_eq!(f.actor.state, CallState::Idle);
        assert!(f.actor.messages.is_empty());
        assert_eq!(f.audio.loaded().await, None);
        assert!(f.actor.keepalive.is_armed());
        assert_eq!(f.signaling.sent().await, vec![OutboundAction::RejectCall]);
    }

    #[tokio::test]
    async fn test_finish_ring_logs_missed() {
        let mut f = ringing().await;
        assert_eq!(f.actor.handle_missed("finished").await, Outcome::Applied);

        let records = f.history.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, HistoryKind::Missed);
        assert_eq!(f.actor.state, CallState::Idle);
        assert!(!f.actor.ring.is_ringing());
        // Missed calls send nothing to the other side
        assert!(f.signaling.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_remote_end_while_ringing_is_missed() {
        let mut f = ringing().await;
        f.actor.handle_remote_end().await;

        assert_eq!(f.actor.state, CallState::Idle);
        assert_eq!(f.history.records().await[0].kind, HistoryKind::Missed);
    }

    #[tokio::test]
    async fn test_end_call_clears_conversation() {
        let mut f = ringing().await;
        f.actor.handle_accept().await;
        f.actor
            .handle_new_message(MessageEntry::new("+15550000", "Alice", "hi"));
        f.actor.handle_peer_typing(true);
        assert!(f.actor.peer_typing);

        assert_eq!(f.actor.handle_end_call(false).await, Outcome::Applied);
        assert_eq!(f.actor.state, CallState::Idle);
        assert!(f.actor.messages.is_empty());
        assert!(!f.actor.peer_typing);
        assert_eq!(
            f.signaling.sent().await,
            vec![OutboundAction::AcceptCall, OutboundAction::EndCall]
        );
        // Only the accept produced a history record
        assert_eq!(f.history.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_end_call_ignored_when_not_live() {
        let mut f = ringing().await;
        assert_eq!(f.actor.handle_end_call(false).await, Outcome::Ignored);
        assert!(f.actor.state.is_incoming());
    }

    #[tokio::test]
    async fn test_messages_outside_call_are_discarded() {
        let mut f = signed_in().await;
        f.actor
            .handle_new_message(MessageEntry::new("+15550000", "", "late"));
        assert!(f.actor.messages.is_empty());
    }

    #[tokio::test]
    async fn test_peer_typing_only_while_live() {
        let mut f = ringing().await;
        f.actor.handle_peer_typing(true);
        assert!(!f.actor.peer_typing);
    }

    #[tokio::test]
    async fn test_send_message_requires_live_call() {
        let mut f = fixture();
        assert!(matches!(
            f.actor.handle_send_message("hi".to_string()).await,
            Err(OrchestratorError::NotAuthenticated)
        ));

        let mut f = ringing().await;
        assert_eq!(
            f.actor.handle_send_message("hi".to_string()).await.unwrap(),
            Outcome::Ignored
        );

        f.actor.handle_accept().await;
        assert_eq!(
            f.actor.handle_send_message("hi".to_string()).await.unwrap(),
            Outcome::Applied
        );
        assert_eq!(
            f.signaling.sent().await.last(),
            Some(&OutboundAction::message(MessageEntry::new(
                "+15551234",
                "",
                "hi"
            )))
        );
    }

    #[tokio::test]
    async fn test_send_failure_is_reported() {
        let mut f = ringing().await;
        f.actor.handle_accept().await;
        f.signaling.disconnect().await;

        let err = f.actor.handle_set_typing(true).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Signaling(SignalingError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_reconnect_requires_identity() {
        let mut f = fixture();
        assert!(matches!(
            f.actor.handle_reconnect().await,
            Err(OrchestratorError::NotAuthenticated)
        ));

        let mut f = signed_in().await;
        f.signaling.disconnect().await;
        f.actor.handle_reconnect().await.unwrap();
        assert!(f.signaling.is_connected().await);
    }

    #[tokio::test]
    async fn test_stale_expiry_is_ignored() {
        let mut f = ringing().await;
        let stale = f.actor.ring.current_token().unwrap();
        f.actor.handle_reject().await;
        f.actor.handle_incoming_call(incoming("c2", "Bob")).await;

        f.actor
            .handle_ring_expired(RingExpired {
                token: stale,
                call_id: CallId::new("c1"),
            })
            .await;

        assert!(f.actor.state.is_incoming());
        assert_eq!(f.history.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_state_changes_are_published() {
        let mut f = signed_in().await;
        drain(&mut f.events);

        f.actor.handle_incoming_call(incoming("c1", "Alice")).await;
        let events = drain(&mut f.events);

        assert!(events.iter().any(|e| matches!(
            e,
            CallEvent::StateChanged {
                from: "idle",
                to: "incoming",
                call_id: Some(_),
            }
        )));
    }

    #[tokio::test]
    async fn test_keepalive_registered_once_across_cycles() {
        let mut f = ringing().await;
        f.actor.handle_reject().await;
        f.actor.handle_incoming_call(incoming("c2", "Bob")).await;
        f.actor.handle_missed("finished").await;

        assert_eq!(f.task_host.active_registrations().await, 1);
    }
}
