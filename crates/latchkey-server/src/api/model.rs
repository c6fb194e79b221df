//! Request and response bodies of the lock API

use latchkey_core::{LockHandle, LockState};
use serde::{Deserialize, Serialize};

/// `POST /locks`. Both fields are required; they are optional here so a
/// missing field yields the API's own 400 body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcquireRequest {
    pub resource: Option<String>,
    /// Milliseconds
    pub ttl: Option<u64>,
}

/// `DELETE /locks` and `POST /locks/extend`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockTokenRequest {
    pub resource: Option<String>,
    /// Token returned by the acquire call
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockResponse {
    pub status: String,
    pub resource: String,
    pub value: String,
    /// Validity deadline as Unix epoch milliseconds
    pub expiration: i64,
    pub state: LockState,
    pub extensions: u32,
}

impl LockResponse {
    pub fn from_handle(status: &str, handle: &LockHandle) -> Self {
        let snapshot = handle.snapshot();
        LockResponse {
            status: status.to_string(),
            resource: snapshot.resource,
            value: snapshot.token,
            expiration: snapshot.validity_deadline,
            state: snapshot.state,
            extensions: snapshot.extensions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub nodes: usize,
    pub quorum: usize,
    #[serde(rename = "activeLocks")]
    pub active_locks: usize,
}
