// Error types for the ambient brightness engine
//
// This module defines custom error types for profile, session and device
// operations, providing structured error handling with stable error codes
// suitable for CLI exit reporting and diagnostics.

mod device;
mod profile;
mod session;

pub use device::{log_device_error, DeviceError, DeviceErrorCodes};
pub use profile::{log_profile_error, ProfileError, ProfileErrorCodes};
pub use session::{log_session_error, SessionError, SessionErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the library and its binaries.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
