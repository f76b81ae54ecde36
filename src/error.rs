//! # Error Types Module
//!
//! Centralized error handling for the recording engine.
//! Every control-API failure maps to one of these small stable enums so the
//! external command layer can relay a status code without string parsing.
//!
//! ## Error Types
//! - `ConfigError`: invalid recording configuration, or configure at the
//!   wrong time
//! - `StartError`: lifecycle-sequencing and storage failures on `start()`
//! - `StopError`: stop when nothing is recording, or finalize failures
//! - `StorageError`: filesystem-level faults (directory/file/header I/O)
//! - `SettingsError`: persisted engine settings I/O and parsing
//!
//! ## Propagation Policy
//! Control-API errors are returned synchronously to the caller. Mid-session
//! faults are absorbed into the ERROR session state instead of unwinding the
//! writer or timer threads; producer-side overflow is never an error, only a
//! counter.

use std::fmt;
use std::io;

/// Errors rejected synchronously by `configure()`. No state change occurs.
#[derive(Debug)]
pub enum ConfigError {
    /// Duration is zero or exceeds the maximum session length
    InvalidDuration(u16),
    /// Signal mask selects no signals
    EmptySignalMask,
    /// Signal mask contains bits outside the known kinds
    UnknownSignalBits(u8),
    /// A session is recording or finalizing; configuration is immutable
    RecordingActive,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidDuration(d) => {
                write!(f, "Invalid recording duration: {} s", d)
            }
            ConfigError::EmptySignalMask => {
                write!(f, "Signal mask selects no signals")
            }
            ConfigError::UnknownSignalBits(bits) => {
                write!(f, "Signal mask contains unknown bits: {:#04x}", bits)
            }
            ConfigError::RecordingActive => {
                write!(f, "Cannot reconfigure while a recording is active")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors returned by `start()`.
#[derive(Debug)]
pub enum StartError {
    /// No validated configuration staged; `configure()` must run first
    NotConfigured,
    /// A session is already recording or finalizing
    AlreadyRecording,
    /// Session directory, file, or header creation failed
    Storage(StorageError),
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::NotConfigured => {
                write!(f, "No recording configured; call configure() first")
            }
            StartError::AlreadyRecording => {
                write!(f, "A recording session is already active")
            }
            StartError::Storage(e) => {
                write!(f, "Failed to start recording: {}", e)
            }
        }
    }
}

impl std::error::Error for StartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors returned by `stop()`.
#[derive(Debug)]
pub enum StopError {
    /// No session is in the RECORDING state
    NotRecording,
    /// Finalization failed; the session is left in the ERROR state
    Storage(StorageError),
}

impl fmt::Display for StopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopError::NotRecording => {
                write!(f, "No recording session is active")
            }
            StopError::Storage(e) => {
                write!(f, "Failed to finalize recording: {}", e)
            }
        }
    }
}

impl std::error::Error for StopError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StopError::Storage(e) => Some(e),
            StopError::NotRecording => None,
        }
    }
}

/// Filesystem-level faults from session storage.
#[derive(Debug)]
pub enum StorageError {
    /// Failed to create the session directory
    DirCreate(io::Error),
    /// Failed to create or open a per-signal file
    FileCreate(io::Error),
    /// Failed to write sample data or a header
    FileWrite(io::Error),
    /// Failed to seek-and-rewrite a header's sample count at finalize
    HeaderRewrite(io::Error),
    /// No session directory exists for the given timestamp
    SessionNotFound(i64),
    /// Failed to remove a session file or directory
    Remove(io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::DirCreate(e) => {
                write!(f, "Failed to create session directory: {}", e)
            }
            StorageError::FileCreate(e) => {
                write!(f, "Failed to create signal file: {}", e)
            }
            StorageError::FileWrite(e) => {
                write!(f, "Failed to write signal data: {}", e)
            }
            StorageError::HeaderRewrite(e) => {
                write!(f, "Failed to rewrite file header: {}", e)
            }
            StorageError::SessionNotFound(ts) => {
                write!(f, "No session found with timestamp {}", ts)
            }
            StorageError::Remove(e) => {
                write!(f, "Failed to delete session data: {}", e)
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::DirCreate(e)
            | StorageError::FileCreate(e)
            | StorageError::FileWrite(e)
            | StorageError::HeaderRewrite(e)
            | StorageError::Remove(e) => Some(e),
            StorageError::SessionNotFound(_) => None,
        }
    }
}

/// Errors from loading or saving persisted engine settings.
#[derive(Debug)]
pub enum SettingsError {
    /// Failed to read settings file
    ReadFailed(io::Error),
    /// Failed to write settings file
    WriteFailed(io::Error),
    /// Failed to parse settings file
    ParseFailed(toml::de::Error),
    /// Failed to serialize settings
    SerializeFailed(toml::ser::Error),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::ReadFailed(e) => {
                write!(f, "Failed to read settings file: {}", e)
            }
            SettingsError::WriteFailed(e) => {
                write!(f, "Failed to write settings file: {}", e)
            }
            SettingsError::ParseFailed(e) => {
                write!(f, "Failed to parse settings file: {}", e)
            }
            SettingsError::SerializeFailed(e) => {
                write!(f, "Failed to serialize settings: {}", e)
            }
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SettingsError::ReadFailed(e) => Some(e),
            SettingsError::WriteFailed(e) => Some(e),
            SettingsError::ParseFailed(e) => Some(e),
            SettingsError::SerializeFailed(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidDuration(0);
        assert!(err.to_string().contains("duration"));
        let err = ConfigError::UnknownSignalBits(0b10_0000);
        assert!(err.to_string().contains("0x20"));
    }

    #[test]
    fn test_storage_error_chain() {
        use std::error::Error;
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err = StorageError::FileCreate(io_err);
        assert!(err.source().is_some());
        assert!(StorageError::SessionNotFound(42).source().is_none());
    }

    #[test]
    fn test_start_error_chain() {
        use std::error::Error;
        let io_err = io::Error::new(io::ErrorKind::Other, "disk full");
        let err = StartError::Storage(StorageError::FileWrite(io_err));
        assert!(err.source().is_some());
        assert!(StartError::NotConfigured.source().is_none());
    }
}
