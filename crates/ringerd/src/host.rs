//! Host collaborator contracts.
//!
//! Everything the orchestrator needs from the device but does not own:
//! key-value identity storage, the call history sink, ringtone settings,
//! permission prompts, local notifications, audio output and the OS
//! background task scheduler. Each is an object-safe async trait so the
//! orchestrator can be driven by real platform bindings, by the local
//! implementations in [`crate::local`], or by test doubles.
//!
//! # Panic-Free Guarantees
//!
//! Implementations report failures through [`HostError`]; the orchestrator
//! only ever logs them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ringer_core::HistoryRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

/// Identity store key holding the signed-in user blob.
pub const USER_KEY: &str = "user";

// ============================================================================
// Errors
// ============================================================================

/// Failure reported by a host collaborator.
#[derive(Debug, Clone, Error)]
pub enum HostError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("audio error: {0}")]
    Audio(String),

    #[error("permission request failed: {0}")]
    Permission(String),

    #[error("notification failed: {0}")]
    Notification(String),

    #[error("background task host error: {0}")]
    TaskHost(String),
}

impl HostError {
    /// Creates a storage error from any error type.
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type HostResult<T> = Result<T, HostError>;

// ============================================================================
// Storage
// ============================================================================

/// Key-value blob storage for credentials.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get(&self, key: &str) -> HostResult<Option<Vec<u8>>>;
    async fn set(&self, key: &str, blob: Vec<u8>) -> HostResult<()>;
}

/// Append-only call history. The orchestrator never reads it back.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn append(&self, record: HistoryRecord) -> HostResult<()>;
}

// ============================================================================
// Settings
// ============================================================================

/// The user's configured ringtone asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ringtone {
    pub file: String,
}

impl Ringtone {
    pub fn new(file: impl Into<String>) -> Self {
        Self { file: file.into() }
    }
}

/// User settings, resolved once per incoming call.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn ringtone(&self) -> HostResult<Ringtone>;
}

// ============================================================================
// Permissions & Notifications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Notifications,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

/// Prompts for (or reports) a runtime permission.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn request(&self, permission: Permission) -> HostResult<PermissionStatus>;
}

/// A local (on-device) notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalNotification {
    pub title: String,
    pub body: String,
    /// Raw call payload for the tap handler
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub sticky: bool,
}

#[async_trait]
pub trait NotificationPresenter: Send + Sync {
    async fn present(&self, notification: LocalNotification) -> HostResult<()>;
}

// ============================================================================
// Audio
// ============================================================================

/// How the ringtone competes with other audio on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionMode {
    /// Interrupt other audio
    #[default]
    DoNotMix,
    /// Lower other audio while ringing
    DuckOthers,
    MixWithOthers,
}

/// Audio session configuration applied before the ringtone plays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioMode {
    pub plays_in_silent_mode: bool,
    /// Route to the earpiece instead of the loudspeaker
    pub play_through_earpiece: bool,
    pub stays_active_in_background: bool,
    pub duck_others: bool,
    pub interruption: InterruptionMode,
}

impl Default for AudioMode {
    fn default() -> Self {
        Self {
            plays_in_silent_mode: true,
            play_through_earpiece: false,
            stays_active_in_background: true,
            duck_others: true,
            interruption: InterruptionMode::DoNotMix,
        }
    }
}

/// The device's single ringtone playback resource.
///
/// `stop` and `unload` must tolerate being called on an idle or already
/// released resource.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    async fn set_mode(&self, mode: &AudioMode) -> HostResult<()>;
    async fn load(&self, ringtone: &Ringtone) -> HostResult<()>;
    async fn play(&self) -> HostResult<()>;
    async fn stop(&self) -> HostResult<()>;
    async fn unload(&self) -> HostResult<()>;
}

// ============================================================================
// Background Tasks
// ============================================================================

/// Availability of the OS background scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskHostStatus {
    Available,
    /// Disabled by system policy (e.g. parental controls)
    Restricted,
    /// Disabled by the user
    Denied,
}

/// Coarse result a background task reports so the host can apply its own
/// backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResult {
    NewData,
    NoData,
    Failed,
}

/// Options for registering a periodic background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOptions {
    pub minimum_interval: Duration,
    /// Keep running after the app is terminated
    pub persist_across_restart: bool,
    pub run_on_boot: bool,
}

/// Body of a periodic background task.
#[async_trait]
pub trait BackgroundTask: Send + Sync {
    async fn run(&self) -> TaskResult;
}

/// OS facility that runs periodic tasks while the app is suspended.
#[async_trait]
pub trait BackgroundTaskHost: Send + Sync {
    async fn status(&self) -> TaskHostStatus;

    /// Registers `task` under `task_id`. Registering an id that is already
    /// registered must not create a second timer.
    async fn register(
        &self,
        task_id: &str,
        options: TaskOptions,
        task: Arc<dyn BackgroundTask>,
    ) -> HostResult<()>;

    async fn unregister(&self, task_id: &str) -> HostResult<()>;

    async fn set_minimum_interval(&self, interval: Duration) -> HostResult<()>;

    async fn is_registered(&self, task_id: &str) -> bool;
}

// ============================================================================
// Timers
// ============================================================================

/// Stand-in deadline for delays too large to add to `Instant::now()`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `Instant::now() + after`, saturating at a far-future deadline.
///
/// Timeouts and intervals come from configuration and may be arbitrarily
/// large.
pub fn deadline_after(after: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(after.min(FAR_FUTURE)).unwrap_or(now)
}

// ============================================================================
// Bundle
// ============================================================================

/// Every host collaborator the orchestrator is built from.
#[derive(Clone)]
pub struct HostServices {
    pub identity_store: Arc<dyn IdentityStore>,
    pub history: Arc<dyn HistorySink>,
    pub settings: Arc<dyn SettingsProvider>,
    pub permissions: Arc<dyn PermissionGate>,
    pub notifier: Arc<dyn NotificationPresenter>,
    pub audio: Arc<dyn AudioOutput>,
    pub task_host: Arc<dyn BackgroundTaskHost>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_after_saturates() {
        let now = Instant::now();
        assert_eq!(deadline_after(Duration::from_secs(30)), now + Duration::from_secs(30));
        assert_eq!(deadline_after(Duration::MAX), now + FAR_FUTURE);
        assert_eq!(
            deadline_after(Duration::from_secs(i64::MAX as u64)),
            now + FAR_FUTURE
        );
    }

    #[test]
    fn test_audio_mode_defaults() {
        let mode = AudioMode::default();
        assert!(mode.plays_in_silent_mode);
        assert!(!mode.play_through_earpiece);
        assert!(mode.stays_active_in_background);
        assert!(mode.duck_others);
        assert_eq!(mode.interruption, InterruptionMode::DoNotMix);
    }

    #[test]
    fn test_host_error_display() {
        assert_eq!(
            HostError::storage("disk full").to_string(),
            "storage error: disk full"
        );
        assert_eq!(
            HostError::Audio("no device".to_string()).to_string(),
            "audio error: no device"
        );
    }

    #[test]
    fn test_notification_serialization_skips_missing_icon() {
        let n = LocalNotification {
            title: "Incoming Call".to_string(),
            body: "Alice".to_string(),
            data: serde_json::json!({"name": "Alice"}),
            icon: None,
            sticky: false,
        };
        let json = serde_json::to_string(&n).unwrap();
        assert!(!json.contains("icon"));
    }
}
