//! Settings, permissions, notifications and audio without a device.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::host::{
    AudioMode, AudioOutput, HostError, HostResult, LocalNotification, NotificationPresenter,
    Permission, PermissionGate, PermissionStatus, Ringtone, SettingsProvider,
};

// ============================================================================
// Settings
// ============================================================================

/// Always answers with the same ringtone.
pub struct StaticSettings {
    ringtone: Mutex<Ringtone>,
}

impl StaticSettings {
    pub fn new(ringtone: Ringtone) -> Self {
        Self {
            ringtone: Mutex::new(ringtone),
        }
    }

    pub async fn set_ringtone(&self, ringtone: Ringtone) {
        *self.ringtone.lock().await = ringtone;
    }
}

#[async_trait]
impl SettingsProvider for StaticSettings {
    async fn ringtone(&self) -> HostResult<Ringtone> {
        Ok(self.ringtone.lock().await.clone())
    }
}

// ============================================================================
// Permissions
// ============================================================================

/// Answers every permission request with a fixed status.
pub struct StaticPermissionGate {
    status: Mutex<PermissionStatus>,
    requests: Mutex<usize>,
}

impl StaticPermissionGate {
    pub fn new(status: PermissionStatus) -> Self {
        Self {
            status: Mutex::new(status),
            requests: Mutex::new(0),
        }
    }

    pub fn granted() -> Self {
        Self::new(PermissionStatus::Granted)
    }

    pub async fn set_status(&self, status: PermissionStatus) {
        *self.status.lock().await = status;
    }

    pub async fn request_count(&self) -> usize {
        *self.requests.lock().await
    }
}

#[async_trait]
impl PermissionGate for StaticPermissionGate {
    async fn request(&self, permission: Permission) -> HostResult<PermissionStatus> {
        *self.requests.lock().await += 1;
        let status = *self.status.lock().await;
        debug!(permission = ?permission, status = ?status, "Permission requested");
        Ok(status)
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// Logs notifications instead of showing them, and keeps a copy.
#[derive(Default)]
pub struct RecordingNotifier {
    presented: Mutex<Vec<LocalNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn presented(&self) -> Vec<LocalNotification> {
        self.presented.lock().await.clone()
    }
}

#[async_trait]
impl NotificationPresenter for RecordingNotifier {
    async fn present(&self, notification: LocalNotification) -> HostResult<()> {
        info!(
            title = %notification.title,
            body = %notification.body,
            "Notification"
        );
        self.presented.lock().await.push(notification);
        Ok(())
    }
}

// ============================================================================
// Audio
// ============================================================================

#[derive(Default)]
struct AudioState {
    mode: Option<AudioMode>,
    loaded: Option<String>,
    playing: bool,
    fail_load: bool,
    loads: usize,
    stops: usize,
    unloads: usize,
    overlapping_loads: usize,
}

/// Audio output with no speaker: tracks the resource lifecycle and logs it.
///
/// Like a real player, loading while a resource is already loaded fails;
/// stopping or unloading an idle player succeeds.
#[derive(Default)]
pub struct HeadlessAudio {
    state: Mutex<AudioState>,
}

impl HeadlessAudio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent loads fail (simulates a missing asset).
    pub async fn set_fail_load(&self, fail: bool) {
        self.state.lock().await.fail_load = fail;
    }

    pub async fn mode(&self) -> Option<AudioMode> {
        self.state.lock().await.mode.clone()
    }

    /// The currently loaded ringtone file.
    pub async fn loaded(&self) -> Option<String> {
        self.state.lock().await.loaded.clone()
    }

    pub async fn is_playing(&self) -> bool {
        self.state.lock().await.playing
    }

    pub async fn load_count(&self) -> usize {
        self.state.lock().await.loads
    }

    pub async fn stop_count(&self) -> usize {
        self.state.lock().await.stops
    }

    pub async fn unload_count(&self) -> usize {
        self.state.lock().await.unloads
    }

    /// Loads attempted while another resource was still loaded.
    pub async fn overlapping_loads(&self) -> usize {
        self.state.lock().await.overlapping_loads
    }
}

#[async_trait]
impl AudioOutput for HeadlessAudio {
    async fn set_mode(&self, mode: &AudioMode) -> HostResult<()> {
        self.state.lock().await.mode = Some(mode.clone());
        Ok(())
    }

    async fn load(&self, ringtone: &Ringtone) -> HostResult<()> {
        let mut state = self.state.lock().await;
        if state.fail_load {
            return Err(HostError::Audio(format!("cannot open {}", ringtone.file)));
        }
        if let Some(current) = &state.loaded {
            let err = HostError::Audio(format!("{current} is already loaded"));
            state.overlapping_loads += 1;
            return Err(err);
        }
        state.loaded = Some(ringtone.file.clone());
        state.loads += 1;
        debug!(file = %ringtone.file, "Ringtone loaded");
        Ok(())
    }

    async fn play(&self) -> HostResult<()> {
        let mut state = self.state.lock().await;
        if state.loaded.is_none() {
            return Err(HostError::Audio("nothing loaded".to_string()));
        }
        state.playing = true;
        info!(file = ?state.loaded, "Ringtone playing");
        Ok(())
    }

    async fn stop(&self) -> HostResult<()> {
        let mut state = self.state.lock().await;
        state.stops += 1;
        state.playing = false;
        Ok(())
    }

    async fn unload(&self) -> HostResult<()> {
        let mut state = self.state.lock().await;
        state.unloads += 1;
        state.playing = false;
        if let Some(file) = state.loaded.take() {
            debug!(file = %file, "Ringtone released");
        }
        Ok(())
    }
}
