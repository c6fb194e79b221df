//! Client-side record of an acquired lock.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::coordinator::Grant;

/// Lifecycle of a lock handle.
///
/// A handle only exists once quorum was reached, so it starts `Held`.
/// `Expired` and `Released` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// Lock is held and the deadline is not near
    Held,
    /// Renewal is in progress
    Expiring,
    /// Deadline passed or renewal failed
    Expired,
    /// Released by its holder
    Released,
}

impl LockState {
    pub fn is_active(self) -> bool {
        matches!(self, LockState::Held | LockState::Expiring)
    }
}

#[derive(Debug)]
struct HandleStatus {
    state: LockState,
    deadline: Instant,
    extensions: u32,
}

#[derive(Debug)]
struct HandleInner {
    resource: String,
    token: String,
    ttl: Duration,
    acquired_at: Instant,
    status: Mutex<HandleStatus>,
}

/// Shared view of one acquisition.
///
/// Clones observe the same state. The deadline and state are advanced by the
/// handle's extender and by explicit extend/release calls.
#[derive(Debug, Clone)]
pub struct LockHandle {
    inner: Arc<HandleInner>,
}

/// Serializable view of a handle for the boundary API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockSnapshot {
    pub resource: String,
    pub token: String,
    /// Validity deadline as Unix epoch milliseconds
    pub validity_deadline: i64,
    pub state: LockState,
    pub extensions: u32,
}

impl LockHandle {
    pub(crate) fn new(resource: &str, token: String, ttl: Duration, grant: &Grant) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                resource: resource.to_string(),
                token,
                ttl,
                acquired_at: grant.decided_at,
                status: Mutex::new(HandleStatus {
                    state: LockState::Held,
                    deadline: grant.deadline(),
                    extensions: 0,
                }),
            }),
        }
    }

    pub fn resource(&self) -> &str {
        &self.inner.resource
    }

    pub fn token(&self) -> &str {
        &self.inner.token
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub fn acquired_at(&self) -> Instant {
        self.inner.acquired_at
    }

    pub fn validity_deadline(&self) -> Instant {
        self.inner.status.lock().deadline
    }

    pub fn extensions(&self) -> u32 {
        self.inner.status.lock().extensions
    }

    /// Current state. An active handle whose deadline has passed is moved to
    /// `Expired` here.
    pub fn state(&self) -> LockState {
        let mut status = self.inner.status.lock();
        Self::expire_if_lapsed(&mut status);
        status.state
    }

    /// Held or expiring, and before the deadline
    pub fn is_usable(&self) -> bool {
        self.state().is_active()
    }

    /// Time left before the deadline
    pub fn remaining(&self) -> Duration {
        self.validity_deadline()
            .saturating_duration_since(Instant::now())
    }

    /// Wall-clock projection of the validity deadline
    pub fn expires_at(&self) -> DateTime<Utc> {
        let remaining =
            chrono::Duration::from_std(self.remaining()).unwrap_or(chrono::Duration::zero());
        Utc::now() + remaining
    }

    pub fn snapshot(&self) -> LockSnapshot {
        let (state, extensions) = {
            let mut status = self.inner.status.lock();
            Self::expire_if_lapsed(&mut status);
            (status.state, status.extensions)
        };
        LockSnapshot {
            resource: self.inner.resource.clone(),
            token: self.inner.token.clone(),
            validity_deadline: self.expires_at().timestamp_millis(),
            state,
            extensions,
        }
    }

    /// `Held -> Expiring` ahead of a renewal. False when the handle is no
    /// longer usable.
    pub(crate) fn mark_expiring(&self) -> bool {
        let mut status = self.inner.status.lock();
        Self::expire_if_lapsed(&mut status);
        if !status.state.is_active() {
            return false;
        }
        status.state = LockState::Expiring;
        true
    }

    /// Apply a successful extension. Terminal handles stay terminal.
    pub(crate) fn renewed(&self, grant: &Grant) -> bool {
        let mut status = self.inner.status.lock();
        if !status.state.is_active() {
            return false;
        }
        status.state = LockState::Held;
        status.deadline = grant.deadline();
        status.extensions += 1;
        true
    }

    pub(crate) fn mark_expired(&self) {
        let mut status = self.inner.status.lock();
        if status.state.is_active() {
            status.state = LockState::Expired;
        }
    }

    /// Returns the state the handle was in before release.
    pub(crate) fn mark_released(&self) -> LockState {
        let mut status = self.inner.status.lock();
        Self::expire_if_lapsed(&mut status);
        let previous = status.state;
        if previous.is_active() {
            status.state = LockState::Released;
        }
        previous
    }

    fn expire_if_lapsed(status: &mut HandleStatus) {
        if status.state.is_active() && Instant::now() >= status.deadline {
            status.state = LockState::Expired;
        }
    }
}
