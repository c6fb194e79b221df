//! Argument validation shared by the lock service and the request layer.

use std::time::Duration;

use crate::error::LockError;

/// A resource must be a non-blank key.
///
/// # Examples
///
/// ```
/// use latchkey_common::validate_resource;
///
/// assert!(validate_resource("job:42").is_ok());
/// assert!(validate_resource("  ").is_err());
/// ```
pub fn validate_resource(resource: &str) -> Result<(), LockError> {
    if resource.trim().is_empty() {
        return Err(LockError::invalid_argument("resource must not be empty"));
    }
    Ok(())
}

/// Tokens are opaque; only emptiness is rejected.
pub fn validate_token(token: &str) -> Result<(), LockError> {
    if token.is_empty() {
        return Err(LockError::invalid_argument("token must not be empty"));
    }
    Ok(())
}

/// TTL must be positive. Sub-millisecond TTLs cannot be expressed on the
/// storage nodes, so they are rejected as well.
pub fn validate_ttl(ttl: Duration) -> Result<(), LockError> {
    if ttl.as_millis() == 0 {
        return Err(LockError::invalid_argument("ttl must be greater than zero"));
    }
    Ok(())
}

/// Whole milliseconds of a duration, saturating at `u64::MAX`
pub fn millis(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}
