//! # Configuration Management Module
//!
//! Two layers of configuration with different lifetimes:
//!
//! - `RecordingConfig`: per-session parameters created by the external
//!   command layer, validated once on `configure()` and immutable while a
//!   session is active.
//! - `Settings`: persistent engine settings stored in a
//!   platform-appropriate location (storage root, buffer sizing, status
//!   queue depth, index pacing).
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/vitalrec/settings.toml
//! - Linux: ~/.config/vitalrec/settings.toml
//! - Windows: %APPDATA%\vitalrec\settings.toml
//!
//! ## Why TOML
//! Human-readable format allows manual editing if needed. Serde provides
//! automatic serialization/deserialization.

use crate::error::{ConfigError, SettingsError};
use crate::signal::SignalMask;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Longest permitted session, in seconds.
pub const MAX_DURATION_S: u16 = 3600;

/// Parameters for one recording session.
///
/// Created by the external command layer, validated and stored once by
/// `configure()`. The engine's buffering and flush contracts are
/// decimation-agnostic; the factor is carried for downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingConfig {
    /// Session length in seconds, [1, 3600]
    pub duration_s: u16,
    /// Signal kinds to record
    pub signal_mask: SignalMask,
    /// Sub-sampling factor; 0 is treated as 1
    pub sample_decimation: u8,
}

impl RecordingConfig {
    pub fn new(duration_s: u16, signal_mask: SignalMask, sample_decimation: u8) -> Self {
        Self {
            duration_s,
            signal_mask,
            sample_decimation,
        }
    }

    /// Rejects out-of-range durations and empty or unknown signal masks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.duration_s == 0 || self.duration_s > MAX_DURATION_S {
            return Err(ConfigError::InvalidDuration(self.duration_s));
        }
        self.signal_mask.validate()?;
        Ok(())
    }

    /// Effective decimation factor, with 0 normalized to 1.
    pub fn decimation(&self) -> u8 {
        self.sample_decimation.max(1)
    }
}

/// Persistent engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory holding one subdirectory per recorded session
    pub storage_dir: PathBuf,
    /// Capacity of each signal buffer half, in bytes
    pub buffer_half_bytes: usize,
    /// Bound of the outbound status/event queue
    pub status_queue_depth: usize,
    /// Pause between emitted session index records, in milliseconds
    pub index_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            storage_dir: data_dir.join("vitalrec").join("sessions"),
            buffer_half_bytes: 4096,
            status_queue_depth: 8,
            index_delay_ms: 20,
        }
    }
}

impl Settings {
    /// Get the path to the settings file
    fn settings_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("vitalrec").join("settings.toml")
    }

    /// Load settings from file, or create defaults if it doesn't exist
    pub fn load() -> Result<Self, SettingsError> {
        let path = Self::settings_path();

        match fs::read_to_string(&path) {
            Ok(contents) => {
                let settings = toml::from_str(&contents).map_err(SettingsError::ParseFailed)?;
                Ok(settings)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, create default
                let settings = Self::default();
                settings.save()?;
                Ok(settings)
            }
            Err(e) => Err(SettingsError::ReadFailed(e)),
        }
    }

    /// Save settings to file
    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::settings_path();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(SettingsError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(SettingsError::SerializeFailed)?;
        fs::write(&path, toml_string).map_err(SettingsError::WriteFailed)?;

        Ok(())
    }
}
