//! Client interface for the orchestrator actor.
//!
//! # Panic-Free Guarantees
//!
//! Channel errors are mapped to `OrchestratorError::ChannelClosed`.

use ringer_core::{CallSnapshot, UserIdentity};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::{CallEvent, CommandResult, OrchestratorCommand, OrchestratorError};

// ============================================================================
// Orchestrator Handle
// ============================================================================

/// Cheap-to-clone handle to the orchestrator.
///
/// ```ignore
/// handle.bootstrap().await?;
/// let mut events = handle.subscribe();
/// while let Ok(event) = events.recv().await {
///     if let CallEvent::StateChanged { to: "incoming", .. } = event {
///         handle.accept().await?;
///     }
/// }
/// ```
#[derive(Clone)]
pub struct OrchestratorHandle {
    sender: mpsc::Sender<OrchestratorCommand>,
    event_sender: broadcast::Sender<CallEvent>,
}

impl OrchestratorHandle {
    pub fn new(
        sender: mpsc::Sender<OrchestratorCommand>,
        event_sender: broadcast::Sender<CallEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Sends a command and waits for its reply.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> OrchestratorCommand,
    ) -> Result<T, OrchestratorError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(build(tx))
            .await
            .map_err(|_| OrchestratorError::ChannelClosed)?;

        rx.await.map_err(|_| OrchestratorError::ChannelClosed)
    }

    /// Loads the stored identity and activates if one is found.
    ///
    /// Returns `Ignored` when nothing is stored or already signed in.
    ///
    /// # Errors
    ///
    /// - `OrchestratorError::Storage` if the identity store failed
    /// - `OrchestratorError::Identity` if the stored blob is unreadable
    pub async fn bootstrap(&self) -> CommandResult {
        self.request(|respond_to| OrchestratorCommand::Bootstrap { respond_to })
            .await?
    }

    /// Signs in as `identity` and persists it.
    pub async fn authenticate(&self, identity: UserIdentity) -> CommandResult {
        self.request(|respond_to| OrchestratorCommand::Authenticate {
            identity,
            respond_to,
        })
        .await?
    }

    /// Answers the ringing call. `Ignored` if nothing is ringing.
    pub async fn accept(&self) -> CommandResult {
        self.request(|respond_to| OrchestratorCommand::Accept { respond_to })
            .await
    }

    /// Declines the ringing call. `Ignored` if nothing is ringing.
    pub async fn reject(&self) -> CommandResult {
        self.request(|respond_to| OrchestratorCommand::Reject { respond_to })
            .await
    }

    /// Hangs up the live call. `Ignored` if no call is live.
    pub async fn end_call(&self) -> CommandResult {
        self.request(|respond_to| OrchestratorCommand::EndCall { respond_to })
            .await
    }

    /// Stops ringing and records the call as missed.
    pub async fn finish_ring(&self) -> CommandResult {
        self.request(|respond_to| OrchestratorCommand::FinishRing { respond_to })
            .await
    }

    /// # Errors
    ///
    /// - `OrchestratorError::NotAuthenticated` before sign-in
    /// - `OrchestratorError::Signaling` if the channel refused the message
    pub async fn send_message(&self, text: impl Into<String>) -> CommandResult {
        let text = text.into();
        self.request(|respond_to| OrchestratorCommand::SendMessage { text, respond_to })
            .await?
    }

    pub async fn set_typing(&self, is_typing: bool) -> CommandResult {
        self.request(|respond_to| OrchestratorCommand::SetTyping {
            is_typing,
            respond_to,
        })
        .await?
    }

    /// Reconnects and re-subscribes the signaling channel.
    pub async fn reconnect(&self) -> Result<(), OrchestratorError> {
        self.request(|respond_to| OrchestratorCommand::Reconnect { respond_to })
            .await?
    }

    /// Current state, or `None` if the actor has stopped.
    pub async fn snapshot(&self) -> Option<CallSnapshot> {
        self.request(|respond_to| OrchestratorCommand::GetSnapshot { respond_to })
            .await
            .ok()
    }

    /// Subscribes to call events.
    ///
    /// Synchronous; does not talk to the actor.
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.event_sender.subscribe()
    }

    /// Returns `true` while the command channel is open.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::Outcome;

    fn create_test_handle() -> (OrchestratorHandle, mpsc::Receiver<OrchestratorCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, _event_rx) = broadcast::channel(16);
        (OrchestratorHandle::new(cmd_tx, event_tx), cmd_rx)
    }

    #[tokio::test]
    async fn test_handle_is_clone() {
        let (handle, _rx) = create_test_handle();
        let _cloned = handle.clone();
    }

    #[tokio::test]
    async fn test_accept_sends_command() {
        let (handle, mut rx) = create_test_handle();

        let responder = tokio::spawn(async move {
            if let Some(OrchestratorCommand::Accept { respond_to }) = rx.recv().await {
                let _ = respond_to.send(Outcome::Applied);
                return true;
            }
            false
        });

        assert_eq!(handle.accept().await.unwrap(), Outcome::Applied);
        assert!(responder.await.unwrap());
    }

    #[tokio::test]
    async fn test_send_message_carries_text() {
        let (handle, mut rx) = create_test_handle();

        let responder = tokio::spawn(async move {
            if let Some(OrchestratorCommand::SendMessage { text, respond_to }) = rx.recv().await {
                let _ = respond_to.send(Ok(Outcome::Applied));
                return text;
            }
            String::new()
        });

        handle.send_message("hello").await.unwrap();
        assert_eq!(responder.await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_actor_error_is_passed_through() {
        let (handle, mut rx) = create_test_handle();

        tokio::spawn(async move {
            if let Some(OrchestratorCommand::Bootstrap { respond_to }) = rx.recv().await {
                let _ = respond_to.send(Err(OrchestratorError::storage("locked")));
            }
        });

        let err = handle.bootstrap().await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Storage(_)));
    }

    #[tokio::test]
    async fn test_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        assert!(matches!(
            handle.reject().await,
            Err(OrchestratorError::ChannelClosed)
        ));
        assert!(matches!(
            handle.reconnect().await,
            Err(OrchestratorError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_snapshot_returns_none_on_channel_close() {
        let (handle, rx) = create_test_handle();
        drop(rx);
        assert!(handle.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_reply_is_channel_closed() {
        let (handle, mut rx) = create_test_handle();

        tokio::spawn(async move {
            // Receive and drop without replying
            let _ = rx.recv().await;
        });

        assert!(matches!(
            handle.end_call().await,
            Err(OrchestratorError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_is_connected() {
        let (handle, rx) = create_test_handle();
        assert!(handle.is_connected());
        drop(rx);
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn test_subscribe_returns_receiver() {
        let (handle, _rx) = create_test_handle();
        let mut events = handle.subscribe();
        assert!(events.try_recv().is_err());
    }
}
