//! Runtime configuration.
//!
//! Loaded from TOML. Every field has a default, so a missing file or a
//! partial file is fine; only malformed TOML is an error.
//!
//! ```toml
//! [ring]
//! timeout_secs = 30
//! ringtone_file = "ringtone.mp3"
//!
//! [keepalive]
//! requested_interval_secs = 10
//! minimum_interval_secs = 60
//!
//! [storage]
//! state_dir = "/var/lib/ringer"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::host::AudioMode;
use crate::keepalive::{KeepaliveSettings, KEEPALIVE_TASK_ID};
use crate::orchestrator::OrchestratorSettings;
use crate::ring::RingSettings;

/// Environment variable overriding the state directory.
pub const STATE_DIR_ENV: &str = "RINGER_STATE_DIR";

/// Ringtone used when none is configured.
pub const DEFAULT_RINGTONE: &str = "ringtone.mp3";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingSection {
    pub timeout_secs: u64,
    pub ringtone_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_icon: Option<String>,
}

impl Default for RingSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            ringtone_file: DEFAULT_RINGTONE.to_string(),
            notification_icon: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaliveSection {
    pub task_id: String,
    pub requested_interval_secs: u64,
    pub minimum_interval_secs: u64,
    pub persist_across_restart: bool,
    pub run_on_boot: bool,
}

impl Default for KeepaliveSection {
    fn default() -> Self {
        Self {
            task_id: KEEPALIVE_TASK_ID.to_string(),
            requested_interval_secs: 10,
            minimum_interval_secs: 60,
            persist_across_restart: true,
            run_on_boot: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Where the identity blob and call history live
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingerConfig {
    pub ring: RingSection,
    pub audio: AudioMode,
    pub keepalive: KeepaliveSection,
    pub storage: StorageSection,
}

impl RingerConfig {
    /// Loads `path`, or the default location when `None`.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_path() {
                Some(p) => p,
                None => {
                    debug!("No config directory on this platform, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), "Loaded config");
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// State directory: `RINGER_STATE_DIR`, then `[storage] state_dir`, then
    /// the platform state directory.
    pub fn state_dir(&self) -> PathBuf {
        self.resolve_state_dir(std::env::var_os(STATE_DIR_ENV).map(PathBuf::from))
    }

    fn resolve_state_dir(&self, env_override: Option<PathBuf>) -> PathBuf {
        env_override
            .or_else(|| self.storage.state_dir.clone())
            .unwrap_or_else(|| {
                dirs::state_dir()
                    .or_else(dirs::data_local_dir)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join("ringer")
            })
    }

    pub fn ring_settings(&self) -> RingSettings {
        RingSettings {
            timeout: Duration::from_secs(self.ring.timeout_secs),
            audio_mode: self.audio.clone(),
            notification_icon: self.ring.notification_icon.clone(),
        }
    }

    pub fn keepalive_settings(&self) -> KeepaliveSettings {
        KeepaliveSettings {
            task_id: self.keepalive.task_id.clone(),
            requested_interval: Duration::from_secs(self.keepalive.requested_interval_secs),
            minimum_interval: Duration::from_secs(self.keepalive.minimum_interval_secs),
            persist_across_restart: self.keepalive.persist_across_restart,
            run_on_boot: self.keepalive.run_on_boot,
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            ring: self.ring_settings(),
            keepalive: self.keepalive_settings(),
        }
    }
}

/// `<config dir>/ringer/config.toml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ringer").join("config.toml"))
}
