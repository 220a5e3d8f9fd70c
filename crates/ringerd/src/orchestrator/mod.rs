//! Call session orchestrator using the actor pattern.
//!
//! The orchestrator owns the call state machine and is the only place
//! where calls ring, are answered, end, and are written to history.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  OrchestratorCommand  ┌──────────────────┐  CallEvent   ┌─────────────┐
//! │ UI / keepalive  │──────(mpsc)──────────▶│ CallOrchestrator │──(broadcast)▶│ subscribers │
//! └─────────────────┘                       └──────────────────┘              └─────────────┘
//!                                             ▲              ▲
//!                          SignalingEvent     │              │  RingExpired
//!                          (mpsc, per kind)   │              │  (mpsc)
//!                                   ┌─────────┴───┐   ┌──────┴──────────┐
//!                                   │  signaling  │   │ ring timer task │
//!                                   └─────────────┘   └─────────────────┘
//! ```
//!
//! ```text
//! Unauthenticated ──sign-in──▶ Idle ──incoming──▶ Incoming ──accept──▶ Live
//!                               ▲                   │                   │
//!                               └──reject/timeout───┘                   │
//!                               └──────────────end / remote end─────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::host::HostServices;
use crate::keepalive::KeepaliveTask;
use crate::signaling::SignalingAdapter;

mod actor;
mod commands;
mod handle;

pub use actor::{CallOrchestrator, OrchestratorSettings, SIGNAL_BUFFER};
pub use commands::{
    CallEvent, CommandResult, DropReason, OrchestratorCommand, OrchestratorError, Outcome,
};
pub use handle::OrchestratorHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 100;

/// Spawns the orchestrator and returns a handle to it.
///
/// The orchestrator starts `Unauthenticated`; call
/// [`OrchestratorHandle::bootstrap`] or [`OrchestratorHandle::authenticate`]
/// to sign in. It stops once every handle is dropped.
///
/// ```no_run
/// use std::sync::Arc;
/// use ringerd::orchestrator::{spawn_orchestrator, OrchestratorSettings};
/// use ringerd::signaling::LoopbackSignaling;
/// # async fn run(host: ringerd::host::HostServices) {
/// let handle = spawn_orchestrator(
///     OrchestratorSettings::default(),
///     host,
///     Arc::new(LoopbackSignaling::new()),
/// );
/// handle.bootstrap().await.ok();
/// # }
/// ```
pub fn spawn_orchestrator(
    settings: OrchestratorSettings,
    host: HostServices,
    signaling: Arc<dyn SignalingAdapter>,
) -> OrchestratorHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let keepalive_task = Arc::new(KeepaliveTask::new(cmd_tx.downgrade()));
    let actor = CallOrchestrator::new(
        cmd_rx,
        event_tx.clone(),
        settings,
        host,
        signaling,
        keepalive_task,
    );
    tokio::spawn(actor.run());

    OrchestratorHandle::new(cmd_tx, event_tx)
}
