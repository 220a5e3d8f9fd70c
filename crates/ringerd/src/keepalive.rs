//! Keepalive scheduler.
//!
//! Registers a periodic background task with the host so the signaling
//! channel is re-established while the app is suspended. Each run asks the
//! orchestrator to reconnect and re-subscribe and reports a coarse result;
//! retry and backoff are left to the host.
//!
//! # Panic-Free Guarantees
//!
//! Host failures are logged. An unavailable host is informational, not an
//! error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::host::{BackgroundTask, BackgroundTaskHost, TaskHostStatus, TaskOptions, TaskResult};
use crate::orchestrator::OrchestratorCommand;

/// Host task identifier for the keepalive.
pub const KEEPALIVE_TASK_ID: &str = "background-phone-call";

/// Interval asked for when none is configured.
pub const DEFAULT_REQUESTED_INTERVAL: Duration = Duration::from_secs(10);

/// Floor applied to any requested interval (host rate limit).
pub const MINIMUM_INTERVAL_FLOOR: Duration = Duration::from_secs(60);

/// Registration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepaliveSettings {
    pub task_id: String,
    pub requested_interval: Duration,
    pub minimum_interval: Duration,
    pub persist_across_restart: bool,
    pub run_on_boot: bool,
}

impl Default for KeepaliveSettings {
    fn default() -> Self {
        Self {
            task_id: KEEPALIVE_TASK_ID.to_string(),
            requested_interval: DEFAULT_REQUESTED_INTERVAL,
            minimum_interval: MINIMUM_INTERVAL_FLOOR,
            persist_across_restart: true,
            run_on_boot: false,
        }
    }
}

impl KeepaliveSettings {
    /// The requested interval clamped up to the floor.
    #[must_use]
    pub fn effective_interval(&self) -> Duration {
        self.requested_interval.max(self.minimum_interval)
    }

    pub fn task_options(&self) -> TaskOptions {
        TaskOptions {
            minimum_interval: self.effective_interval(),
            persist_across_restart: self.persist_across_restart,
            run_on_boot: self.run_on_boot,
        }
    }
}

/// Result of [`KeepaliveScheduler::arm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    Registered,
    /// Already registered; nothing was done.
    AlreadyArmed,
    /// The host cannot run background tasks; registration skipped.
    Unavailable(TaskHostStatus),
    /// The host refused the registration.
    Failed,
}

/// Owns the (single) keepalive registration.
pub struct KeepaliveScheduler {
    host: Arc<dyn BackgroundTaskHost>,
    settings: KeepaliveSettings,
    task: Arc<dyn BackgroundTask>,
    armed: bool,
}

impl KeepaliveScheduler {
    pub fn new(
        host: Arc<dyn BackgroundTaskHost>,
        settings: KeepaliveSettings,
        task: Arc<dyn BackgroundTask>,
    ) -> Self {
        Self {
            host,
            settings,
            task,
            armed: false,
        }
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Registers the keepalive if the host allows it. Idempotent.
    pub async fn arm(&mut self) -> ArmOutcome {
        let task_id = self.settings.task_id.as_str();

        if self.armed && self.host.is_registered(task_id).await {
            debug!(task_id, "Keepalive already armed");
            return ArmOutcome::AlreadyArmed;
        }

        let status = self.host.status().await;
        let outcome = if status == TaskHostStatus::Available {
            let options = self.settings.task_options();
            match self
                .host
                .register(task_id, options, Arc::clone(&self.task))
                .await
            {
                Ok(()) => {
                    self.armed = true;
                    info!(
                        task_id,
                        interval_secs = options.minimum_interval.as_secs(),
                        "Keepalive armed"
                    );
                    ArmOutcome::Registered
                }
                Err(e) => {
                    warn!(task_id, error = %e, "Keepalive registration failed");
                    ArmOutcome::Failed
                }
            }
        } else {
            info!(task_id, status = ?status, "Background tasks unavailable, keepalive skipped");
            ArmOutcome::Unavailable(status)
        };

        if let Err(e) = self
            .host
            .set_minimum_interval(self.settings.minimum_interval)
            .await
        {
            debug!(error = %e, "Could not set host minimum interval");
        }

        outcome
    }

    /// Removes the registration. Returns `false` if it was not armed.
    pub async fn disarm(&mut self) -> bool {
        if !self.armed {
            return false;
        }
        self.armed = false;

        let task_id = self.settings.task_id.as_str();
        match self.host.unregister(task_id).await {
            Ok(()) => info!(task_id, "Keepalive disarmed"),
            Err(e) => warn!(task_id, error = %e, "Keepalive unregistration failed"),
        }
        true
    }
}

// ============================================================================
// Task Body
// ============================================================================

/// The periodic task body: asks the orchestrator to reconnect.
///
/// Holds a weak sender so a registered task never keeps a stopped
/// orchestrator alive.
pub struct KeepaliveTask {
    orchestrator: mpsc::WeakSender<OrchestratorCommand>,
}

impl KeepaliveTask {
    pub fn new(orchestrator: mpsc::WeakSender<OrchestratorCommand>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl BackgroundTask for KeepaliveTask {
    async fn run(&self) -> TaskResult {
        let Some(sender) = self.orchestrator.upgrade() else {
            debug!("Keepalive tick after orchestrator shutdown");
            return TaskResult::Failed;
        };

        let (tx, rx) = oneshot::channel();
        if sender
            .send(OrchestratorCommand::Reconnect { respond_to: tx })
            .await
            .is_err()
        {
            return TaskResult::Failed;
        }
        drop(sender);

        match rx.await {
            Ok(Ok(())) => {
                debug!("Keepalive reconnect succeeded");
                TaskResult::NewData
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Keepalive reconnect failed");
                TaskResult::Failed
            }
            Err(_) => TaskResult::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::TokioTaskHost;
    use crate::orchestrator::OrchestratorError;

    struct NoopTask;

    #[async_trait]
    impl BackgroundTask for NoopTask {
        async fn run(&self) -> TaskResult {
            TaskResult::NoData
        }
    }

    fn scheduler(host: Arc<TokioTaskHost>, settings: KeepaliveSettings) -> KeepaliveScheduler {
        KeepaliveScheduler::new(host, settings, Arc::new(NoopTask))
    }

    #[test]
    fn test_interval_is_clamped_to_floor() {
        let settings = KeepaliveSettings::default();
        assert_eq!(settings.requested_interval, Duration::from_secs(10));
        assert_eq!(settings.effective_interval(), Duration::from_secs(60));

        let relaxed = KeepaliveSettings {
            requested_interval: Duration::from_secs(900),
            ..KeepaliveSettings::default()
        };
        assert_eq!(relaxed.effective_interval(), Duration::from_secs(900));
    }

    #[test]
    fn test_task_options_follow_settings() {
        let options = KeepaliveSettings::default().task_options();
        assert_eq!(options.minimum_interval, MINIMUM_INTERVAL_FLOOR);
        assert!(options.persist_across_restart);
        assert!(!options.run_on_boot);
    }

    #[tokio::test]
    async fn test_arm_registers_once() {
        let host = Arc::new(TokioTaskHost::new());
        let mut keepalive = scheduler(host.clone(), KeepaliveSettings::default());

        assert_eq!(keepalive.arm().await, ArmOutcome::Registered);
        assert_eq!(keepalive.arm().await, ArmOutcome::AlreadyArmed);

        assert!(keepalive.is_armed());
        assert_eq!(host.active_registrations().await, 1);
        assert_eq!(host.total_registrations().await, 1);
        assert_eq!(
            host.options(KEEPALIVE_TASK_ID).await.map(|o| o.minimum_interval),
            Some(Duration::from_secs(60))
        );
        assert_eq!(host.minimum_interval().await, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_arm_skips_when_unavailable() {
        let host = Arc::new(TokioTaskHost::with_status(TaskHostStatus::Restricted));
        let mut keepalive = scheduler(host.clone(), KeepaliveSettings::default());

        assert_eq!(
            keepalive.arm().await,
            ArmOutcome::Unavailable(TaskHostStatus::Restricted)
        );
        assert!(!keepalive.is_armed());
        assert_eq!(host.active_registrations().await, 0);
        // The floor is still pushed to the host
        assert_eq!(host.minimum_interval().await, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_disarm_unregisters() {
        let host = Arc::new(TokioTaskHost::new());
        let mut keepalive = scheduler(host.clone(), KeepaliveSettings::default());

        assert!(!keepalive.disarm().await);
        keepalive.arm().await;
        assert!(keepalive.disarm().await);
        assert!(!keepalive.is_armed());
        assert!(!host.is_registered(KEEPALIVE_TASK_ID).await);

        // Re-arming after a disarm registers again
        assert_eq!(keepalive.arm().await, ArmOutcome::Registered);
        assert_eq!(host.active_registrations().await, 1);
    }

    #[tokio::test]
    async fn test_task_reports_success() {
        let (tx, mut rx) = mpsc::channel(1);
        let task = KeepaliveTask::new(tx.downgrade());

        let responder = tokio::spawn(async move {
            if let Some(OrchestratorCommand::Reconnect { respond_to }) = rx.recv().await {
                let _ = respond_to.send(Ok(()));
            }
        });

        assert_eq!(task.run().await, TaskResult::NewData);
        responder.await.unwrap();
        drop(tx);
    }

    #[tokio::test]
    async fn test_task_reports_failure() {
        let (tx, mut rx) = mpsc::channel(1);
        let task = KeepaliveTask::new(tx.downgrade());

        let responder = tokio::spawn(async move {
            if let Some(OrchestratorCommand::Reconnect { respond_to }) = rx.recv().await {
                let _ = respond_to.send(Err(OrchestratorError::NotAuthenticated));
            }
        });

        assert_eq!(task.run().await, TaskResult::Failed);
        responder.await.unwrap();
        drop(tx);
    }

    #[tokio::test]
    async fn test_task_fails_after_shutdown() {
        let (tx, rx) = mpsc::channel::<OrchestratorCommand>(1);
        let task = KeepaliveTask::new(tx.downgrade());
        drop(tx);
        drop(rx);

        assert_eq!(task.run().await, TaskResult::Failed);
    }
}
