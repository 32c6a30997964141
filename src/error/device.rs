// Device error types and constants
//
// Covers the sensor and actuator collaborators: lifecycle misuse and
// sysfs access failures.

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Device error code constants
///
/// Error code range: 5001-5005
pub struct DeviceErrorCodes {}

impl DeviceErrorCodes {
    /// Device is already started
    pub const ALREADY_RUNNING: i32 = 5001;

    /// Device is not started
    pub const NOT_RUNNING: i32 = 5002;

    /// Reading or writing the device failed
    pub const IO: i32 = 5003;

    /// Device node does not exist
    pub const NOT_FOUND: i32 = 5004;

    /// Device reported a value that could not be parsed
    pub const INVALID_VALUE: i32 = 5005;
}

/// Log a device error with structured context
pub fn log_device_error(err: &DeviceError, context: &str) {
    error!(
        "Device error in {}: code={}, component=Device, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Sensor and actuator errors
///
/// Error code range: 5001-5005
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// Device already started
    AlreadyRunning,

    /// Device not started
    NotRunning,

    /// I/O failure talking to the device
    Io { details: String },

    /// Device path missing
    NotFound { path: String },

    /// Unparseable device value
    InvalidValue { path: String, value: String },
}

impl ErrorCode for DeviceError {
    fn code(&self) -> i32 {
        match self {
            DeviceError::AlreadyRunning => DeviceErrorCodes::ALREADY_RUNNING,
            DeviceError::NotRunning => DeviceErrorCodes::NOT_RUNNING,
            DeviceError::Io { .. } => DeviceErrorCodes::IO,
            DeviceError::NotFound { .. } => DeviceErrorCodes::NOT_FOUND,
            DeviceError::InvalidValue { .. } => DeviceErrorCodes::INVALID_VALUE,
        }
    }

    fn message(&self) -> String {
        match self {
            DeviceError::AlreadyRunning => {
                "Device already running. Call stop() first.".to_string()
            }
            DeviceError::NotRunning => "Device not running. Call start() first.".to_string(),
            DeviceError::Io { details } => format!("Device I/O error: {}", details),
            DeviceError::NotFound { path } => format!("Device not found: {}", path),
            DeviceError::InvalidValue { path, value } => {
                format!("Invalid value '{}' read from {}", value, path)
            }
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DeviceError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for DeviceError {}

/// Convert from std::io::Error to DeviceError
impl From<std::io::Error> for DeviceError {
    fn from(err: std::io::Error) -> Self {
        DeviceError::Io {
            details: err.to_string(),
        }
    }
}
