//! Ringtone & notification coordinator.
//!
//! Owns the device's single ringtone playback and the one-shot ring timer.
//! The orchestrator calls [`RingCoordinator::start`] on entering `Incoming`
//! and [`RingCoordinator::stop`] on leaving it by any path, which keeps
//! "ringtone active" and "state is Incoming" in lockstep.
//!
//! # Panic-Free Guarantees
//!
//! Audio, permission and notification failures are logged and degrade to
//! "no side effect". `stop` is safe to call any number of times.

use std::sync::Arc;
use std::time::Duration;

use ringer_core::{CallId, CallSession};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::host::{
    deadline_after, AudioMode, AudioOutput, LocalNotification, NotificationPresenter, Permission,
    PermissionGate, PermissionStatus, SettingsProvider,
};

/// How long a call rings before it is treated as missed.
pub const DEFAULT_RING_TIMEOUT: Duration = Duration::from_secs(30);

/// Title of the incoming-call notification.
pub const NOTIFICATION_TITLE: &str = "Incoming Call";

/// Identifies one ring. Increases monotonically for the coordinator's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RingToken(u64);

impl RingToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Sent by the ring timer when a ring was not stopped in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingExpired {
    pub token: RingToken,
    pub call_id: CallId,
}

/// Ring behaviour knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct RingSettings {
    pub timeout: Duration,
    pub audio_mode: AudioMode,
    pub notification_icon: Option<String>,
}

impl Default for RingSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RING_TIMEOUT,
            audio_mode: AudioMode::default(),
            notification_icon: None,
        }
    }
}

struct ActiveRing {
    token: RingToken,
    call_id: CallId,
    /// Whether the ringtone resource was loaded and needs releasing
    loaded: bool,
    timer: CancellationToken,
}

/// Drives audio, notification and the auto-timeout for one ring at a time.
pub struct RingCoordinator {
    audio: Arc<dyn AudioOutput>,
    permissions: Arc<dyn PermissionGate>,
    notifier: Arc<dyn NotificationPresenter>,
    settings_provider: Arc<dyn SettingsProvider>,
    settings: RingSettings,
    expiry_sink: mpsc::Sender<RingExpired>,
    active: Option<ActiveRing>,
    next_token: u64,
}

impl RingCoordinator {
    /// Creates a coordinator. Expired rings are reported on `expiry_sink`.
    pub fn new(
        audio: Arc<dyn AudioOutput>,
        permissions: Arc<dyn PermissionGate>,
        notifier: Arc<dyn NotificationPresenter>,
        settings_provider: Arc<dyn SettingsProvider>,
        settings: RingSettings,
        expiry_sink: mpsc::Sender<RingExpired>,
    ) -> Self {
        Self {
            audio,
            permissions,
            notifier,
            settings_provider,
            settings,
            expiry_sink,
            active: None,
            next_token: 1,
        }
    }

    #[must_use]
    pub fn is_ringing(&self) -> bool {
        self.active.is_some()
    }

    pub fn current_token(&self) -> Option<RingToken> {
        self.active.as_ref().map(|r| r.token)
    }

    /// True if `token` names the ring in progress.
    #[must_use]
    pub fn is_current(&self, token: RingToken) -> bool {
        self.current_token() == Some(token)
    }

    /// Starts ringing for `session`.
    ///
    /// Any ring already in progress is stopped and released first. The
    /// timer is armed even if the ringtone cannot be played, so a broken
    /// audio path never leaves a call ringing forever.
    pub async fn start(&mut self, session: &CallSession) -> RingToken {
        if self.active.is_some() {
            debug!("Previous ring still active, releasing it first");
            self.stop().await;
        }

        let token = RingToken(self.next_token);
        self.next_token += 1;

        if let Err(e) = self.audio.set_mode(&self.settings.audio_mode).await {
            warn!(error = %e, "Failed to configure audio mode");
        }

        self.present_notification(session).await;
        let loaded = self.play_ringtone(&session.id).await;
        let timer = self.arm_timer(token, session.id.clone());

        self.active = Some(ActiveRing {
            token,
            call_id: session.id.clone(),
            loaded,
            timer,
        });

        info!(
            call_id = %session.id,
            caller = %session.caller.name,
            ring = token.value(),
            timeout_secs = self.settings.timeout.as_secs(),
            "Ringing"
        );

        token
    }

    /// Stops the current ring: cancels the timer, stops playback and
    /// releases the ringtone.
    ///
    /// Returns `false` (and touches nothing) if nothing was ringing.
    pub async fn stop(&mut self) -> bool {
        let Some(ring) = self.active.take() else {
            debug!("Stop requested while not ringing, ignoring");
            return false;
        };

        // Cancelling after the timer fired is a no-op
        ring.timer.cancel();

        if ring.loaded {
            if let Err(e) = self.audio.stop().await {
                debug!(error = %e, "Ringtone stop failed (tolerated)");
            }
            if let Err(e) = self.audio.unload().await {
                debug!(error = %e, "Ringtone unload failed (tolerated)");
            }
        }

        info!(call_id = %ring.call_id, ring = ring.token.value(), "Ringing stopped");
        true
    }

    async fn present_notification(&self, session: &CallSession) {
        let status = match self.permissions.request(Permission::Notifications).await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Notification permission request failed");
                return;
            }
        };

        if status != PermissionStatus::Granted {
            debug!(status = ?status, "Notifications not granted, ringing without one");
            return;
        }

        let notification = LocalNotification {
            title: NOTIFICATION_TITLE.to_string(),
            body: session.caller.name.clone(),
            data: session.call_data.clone(),
            icon: self.settings.notification_icon.clone(),
            sticky: false,
        };

        if let Err(e) = self.notifier.present(notification).await {
            warn!(error = %e, "Failed to present incoming-call notification");
        }
    }

    /// Loads and plays the configured ringtone. Returns whether a resource
    /// was loaded (and so must be released).
    async fn play_ringtone(&self, call_id: &CallId) -> bool {
        let ringtone = match self.settings_provider.ringtone().await {
            Ok(ringtone) => ringtone,
            Err(e) => {
                warn!(call_id = %call_id, error = %e, "Could not resolve ringtone");
                return false;
            }
        };

        if let Err(e) = self.audio.load(&ringtone).await {
            warn!(call_id = %call_id, file = %ringtone.file, error = %e, "Failed to load ringtone");
            return false;
        }

        if let Err(e) = self.audio.play().await {
            warn!(call_id = %call_id, file = %ringtone.file, error = %e, "Failed to play ringtone");
        }

        true
    }

    fn arm_timer(&self, token: RingToken, call_id: CallId) -> CancellationToken {
        let timer = CancellationToken::new();
        let cancelled = timer.clone();
        let sink = self.expiry_sink.clone();
        let deadline = deadline_after(self.settings.timeout);

        tokio::spawn(async move {
            tokio::select! {
                biased;

                _ = cancelled.cancelled() => {
                    debug!(ring = token.value(), "Ring timer cancelled");
                }

                _ = tokio::time::sleep_until(deadline) => {
                    debug!(call_id = %call_id, ring = token.value(), "Ring timer expired");
                    // Receiver gone means the orchestrator shut down
                    let _ = sink.send(RingExpired { token, call_id }).await;
                }
            }
        });

        timer
    }
}

impl Drop for RingCoordinator {
    fn drop(&mut self) {
        if let Some(ring) = &self.active {
            ring.timer.cancel();
        }
    }
}
