//! Failure categories of a runtime launch.
//!
//! A runtime that starts and returns a non-zero code is not an error here;
//! that code is passed back unchanged as an `ExitStatus`.

use std::path::PathBuf;

use thiserror::Error;

// The sentinels share the integer space with runtime exit codes. A runtime
// returning one of these values is indistinguishable from the failure once
// collapsed by `entry::status_code`.

/// Status returned to the managed caller when the argument buffer could not be allocated.
pub const ALLOCATION_FAILED: i32 = -1;
/// An argument was rejected before marshaling.
pub const INVALID_ARGUMENT: i32 = -2;
/// The runtime was already started by this process.
pub const ALREADY_STARTED: i32 = -3;
/// The host bridge could not read its inputs.
pub const HOST_BRIDGE_FAILED: i32 = -4;
/// The project directory has no entry script.
pub const MISSING_ENTRY_SCRIPT: i32 = -5;
/// The configuration JSON was rejected.
pub const INVALID_CONFIG: i32 = -6;
/// The configuration was set after it had already been read or set.
pub const ALREADY_CONFIGURED: i32 = -7;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to allocate {requested} bytes for the arguments buffer")]
    Allocation { requested: usize },

    #[error("argument {index} contains an interior NUL byte")]
    InvalidArgument { index: usize },

    #[error("{count} arguments do not fit a native argument count")]
    TooManyArguments { count: usize },

    #[error("the embedded runtime has already been started in this process")]
    AlreadyStarted,

    #[error("JNI error: {0}")]
    Jni(String),

    #[error("entry script not found: {}", .0.display())]
    MissingEntryScript(PathBuf),

    #[error("invalid bridge configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("bridge configuration is already in use")]
    AlreadyConfigured,
}

impl LaunchError {
    /// The integer status handed back across the native call boundary.
    pub fn sentinel(&self) -> i32 {
        match self {
            LaunchError::Allocation { .. } => ALLOCATION_FAILED,
            LaunchError::InvalidArgument { .. } | LaunchError::TooManyArguments { .. } => {
                INVALID_ARGUMENT
            }
            LaunchError::AlreadyStarted => ALREADY_STARTED,
            LaunchError::Jni(_) => HOST_BRIDGE_FAILED,
            LaunchError::MissingEntryScript(_) => MISSING_ENTRY_SCRIPT,
            LaunchError::Config(_) => INVALID_CONFIG,
            LaunchError::AlreadyConfigured => ALREADY_CONFIGURED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_distinct_and_negative() {
        let errors = [
            LaunchError::Allocation { requested: 8 },
            LaunchError::InvalidArgument { index: 0 },
            LaunchError::AlreadyStarted,
            LaunchError::Jni("boom".to_string()),
            LaunchError::MissingEntryScript(PathBuf::from("main.js")),
            LaunchError::AlreadyConfigured,
        ];
        let mut codes: Vec<i32> = errors.iter().map(LaunchError::sentinel).collect();
        assert!(codes.iter().all(|&c| c < 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_allocation_keeps_legacy_sentinel() {
        assert_eq!(LaunchError::Allocation { requested: 1 }.sentinel(), -1);
    }

    #[test]
    fn test_too_many_arguments_maps_to_invalid_argument() {
        assert_eq!(
            LaunchError::TooManyArguments { count: usize::MAX }.sentinel(),
            INVALID_ARGUMENT
        );
    }
}
