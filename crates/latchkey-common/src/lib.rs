//! Latchkey Common - Shared error taxonomy and helpers
//!
//! This crate provides the foundational types used across all Latchkey components:
//! - `LockError`: the caller-facing error taxonomy
//! - `ErrorCode`: structured error codes for API responses
//! - Argument validation for resources, tokens and TTLs

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::{ErrorCode, LockError};
pub use utils::{millis, validate_resource, validate_token, validate_ttl};
