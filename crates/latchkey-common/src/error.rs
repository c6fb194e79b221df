//! Error types and error codes for Latchkey
//!
//! This module defines:
//! - `LockError`: quorum-level failures returned to callers of the lock service
//! - `ErrorCode`: structured error codes for API responses

use serde::{Deserialize, Serialize};

/// Caller-facing lock errors.
///
/// Node-level transient faults never appear here; they only influence the
/// vote of the attempt in which they occurred.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("resource '{resource}' is locked (gave up after {attempts} attempts)")]
    ResourceLocked { resource: String, attempts: u32 },

    #[error("lock on '{resource}' is not held")]
    LockNotHeld { resource: String },

    #[error("failed to extend lock on '{resource}', lock is lost")]
    ExtensionFailed { resource: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("lock service is shutting down")]
    ShuttingDown,
}

impl LockError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        LockError::InvalidArgument(message.into())
    }

    pub fn not_held(resource: impl Into<String>) -> Self {
        LockError::LockNotHeld {
            resource: resource.into(),
        }
    }

    /// Structured code for API responses
    pub fn error_code(&self) -> ErrorCode<'static> {
        match self {
            LockError::InvalidArgument(_) => PARAMETER_VALIDATE_ERROR,
            LockError::ResourceLocked { .. } => RESOURCE_LOCKED,
            LockError::LockNotHeld { .. } => LOCK_NOT_HELD,
            LockError::ExtensionFailed { .. } => LOCK_EXTENSION_FAILED,
            LockError::Config(_) => SERVER_ERROR,
            LockError::ShuttingDown => SERVICE_UNAVAILABLE,
        }
    }

    /// HTTP status the request layer should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            LockError::InvalidArgument(_) => 400,
            LockError::ResourceLocked { .. } => 409,
            LockError::LockNotHeld { .. } => 404,
            LockError::ExtensionFailed { .. } => 409,
            LockError::Config(_) => 500,
            LockError::ShuttingDown => 503,
        }
    }
}

/// Error code structure for API responses
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

pub const PARAMETER_MISSING: ErrorCode<'static> = ErrorCode {
    code: 10000,
    message: "parameter missing",
};

pub const PARAMETER_VALIDATE_ERROR: ErrorCode<'static> = ErrorCode {
    code: 20002,
    message: "parameter validate error",
};

pub const SERVER_ERROR: ErrorCode<'static> = ErrorCode {
    code: 30000,
    message: "server error",
};

pub const SERVICE_UNAVAILABLE: ErrorCode<'static> = ErrorCode {
    code: 30001,
    message: "service unavailable",
};

// Lock errors
pub const RESOURCE_LOCKED: ErrorCode<'static> = ErrorCode {
    code: 40001,
    message: "Resource locked",
};

pub const LOCK_NOT_HELD: ErrorCode<'static> = ErrorCode {
    code: 40002,
    message: "lock not held",
};

pub const LOCK_EXTENSION_FAILED: ErrorCode<'static> = ErrorCode {
    code: 40003,
    message: "lock extension failed",
};
