// Session error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Session error code constants
///
/// Error code range: 4001-4004
pub struct SessionErrorCodes {}

impl SessionErrorCodes {
    /// Sample buffer mutex was poisoned
    pub const BUFFER_POISONED: i32 = 4001;

    /// No calibration profile available for the session
    pub const NO_PROFILE: i32 = 4002;

    /// Sensor feed failed to start
    pub const SENSOR_START: i32 = 4003;

    /// Session loop is already running
    pub const ALREADY_RUNNING: i32 = 4004;
}

/// Log a session error with structured context
pub fn log_session_error(err: &SessionError, context: &str) {
    error!(
        "Session error in {}: code={}, component=ConvergenceLoop, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Aggregation session errors
///
/// Error code range: 4001-4004
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Sample buffer mutex was poisoned by a panicking ingest task
    BufferPoisoned,

    /// No calibration profile is active
    NoProfile,

    /// Sensor refused to start
    SensorStart { reason: String },

    /// A scheduler loop is already running
    AlreadyRunning,
}

impl ErrorCode for SessionError {
    fn code(&self) -> i32 {
        match self {
            SessionError::BufferPoisoned => SessionErrorCodes::BUFFER_POISONED,
            SessionError::NoProfile => SessionErrorCodes::NO_PROFILE,
            SessionError::SensorStart { .. } => SessionErrorCodes::SENSOR_START,
            SessionError::AlreadyRunning => SessionErrorCodes::ALREADY_RUNNING,
        }
    }

    fn message(&self) -> String {
        match self {
            SessionError::BufferPoisoned => "Sample buffer lock poisoned".to_string(),
            SessionError::NoProfile => "No calibration profile active".to_string(),
            SessionError::SensorStart { reason } => {
                format!("Failed to start sensor feed: {}", reason)
            }
            SessionError::AlreadyRunning => "Scheduler already running".to_string(),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SessionError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for SessionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_codes() {
        assert_eq!(
            SessionError::BufferPoisoned.code(),
            SessionErrorCodes::BUFFER_POISONED
        );
        assert_eq!(SessionError::NoProfile.code(), SessionErrorCodes::NO_PROFILE);
        assert_eq!(
            SessionError::SensorStart {
                reason: "busy".to_string()
            }
            .code(),
            SessionErrorCodes::SENSOR_START
        );
        assert_eq!(
            SessionError::AlreadyRunning.code(),
            SessionErrorCodes::ALREADY_RUNNING
        );
    }

    #[test]
    fn test_session_error_messages() {
        let err = SessionError::SensorStart {
            reason: "device busy".to_string(),
        };
        assert_eq!(err.message(), "Failed to start sensor feed: device busy");
        assert!(SessionError::BufferPoisoned.message().contains("poisoned"));
    }
}
