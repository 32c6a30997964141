// Profile error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Profile error code constants
///
/// Error code range: 3001-3006
pub struct ProfileErrorCodes {}

impl ProfileErrorCodes {
    /// Profile file could not be read or written
    pub const IO: i32 = 3001;

    /// Profile contained no valid calibration point
    pub const EMPTY: i32 = 3002;

    /// Named profile does not exist in the store
    pub const NOT_FOUND: i32 = 3003;

    /// Profile name is not a plain file name
    pub const INVALID_NAME: i32 = 3004;

    /// No profile has been activated
    pub const NO_ACTIVE_PROFILE: i32 = 3005;

    /// Active profile lock was poisoned
    pub const STATE_POISONED: i32 = 3006;
}

/// Log a profile error with structured context
pub fn log_profile_error(err: &ProfileError, context: &str) {
    error!(
        "Profile error in {}: code={}, component=ProfileStore, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Profile loading and storage errors
///
/// Error code range: 3001-3006
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileError {
    /// Reading or writing a profile file failed
    Io { path: String, details: String },

    /// Every line of the profile was malformed
    Empty { name: String, skipped: usize },

    /// No profile with this name in the store
    NotFound { name: String },

    /// Name contains path separators or is otherwise unusable as a file name
    InvalidName { name: String },

    /// Session requested before any profile was activated
    NoActiveProfile,

    /// Active profile lock poisoned by a panicking holder
    StatePoisoned,
}

impl ErrorCode for ProfileError {
    fn code(&self) -> i32 {
        match self {
            ProfileError::Io { .. } => ProfileErrorCodes::IO,
            ProfileError::Empty { .. } => ProfileErrorCodes::EMPTY,
            ProfileError::NotFound { .. } => ProfileErrorCodes::NOT_FOUND,
            ProfileError::InvalidName { .. } => ProfileErrorCodes::INVALID_NAME,
            ProfileError::NoActiveProfile => ProfileErrorCodes::NO_ACTIVE_PROFILE,
            ProfileError::StatePoisoned => ProfileErrorCodes::STATE_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            ProfileError::Io { path, details } => {
                format!("Profile I/O failed for {}: {}", path, details)
            }
            ProfileError::Empty { name, skipped } => {
                format!(
                    "Profile '{}' has no valid points ({} lines skipped)",
                    name, skipped
                )
            }
            ProfileError::NotFound { name } => format!("Profile '{}' not found", name),
            ProfileError::InvalidName { name } => {
                format!("Invalid profile name '{}'", name)
            }
            ProfileError::NoActiveProfile => "No active profile".to_string(),
            ProfileError::StatePoisoned => "Active profile state poisoned".to_string(),
        }
    }
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProfileError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ProfileError {}
