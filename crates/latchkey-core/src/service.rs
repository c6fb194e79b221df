//! Lock service
//!
//! Boundary API over the quorum coordinator. Acquired handles are kept in a
//! registry keyed by token together with their auto-extender, so a release
//! or extension that only carries `(resource, token)` can reach them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use latchkey_common::{LockError, millis, validate_resource, validate_token, validate_ttl};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::LockConfig;
use crate::coordinator::{QuorumCoordinator, Votes};
use crate::extender::{AutoExtender, ExtenderSettings};
use crate::handle::LockHandle;
use crate::metrics;
use crate::node::SharedNode;
use crate::retry::RetryPolicy;

/// Result of a release. Every variant counts as success for the caller;
/// token fencing keeps leftover records harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Every node confirmed the deletion
    Released,
    /// No node held the token (already released, expired or never owned)
    NotHeld,
    /// Some nodes did not confirm; their records expire through the TTL
    PartialFailure {
        confirmed: usize,
        unavailable: usize,
        total: usize,
    },
}

impl ReleaseOutcome {
    fn from_votes(votes: &Votes) -> Self {
        let total = votes.total();
        if votes.yes == total {
            ReleaseOutcome::Released
        } else if votes.yes == 0 && votes.unavailable == 0 {
            ReleaseOutcome::NotHeld
        } else {
            ReleaseOutcome::PartialFailure {
                confirmed: votes.yes,
                unavailable: votes.unavailable,
                total,
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseOutcome::Released => "released",
            ReleaseOutcome::NotHeld => "not_held",
            ReleaseOutcome::PartialFailure { .. } => "partial",
        }
    }
}

struct ActiveLock {
    handle: LockHandle,
    extender: Option<AutoExtender>,
}

type Registry = DashMap<String, ActiveLock>;

pub struct LockService {
    coordinator: Arc<QuorumCoordinator>,
    retry: RetryPolicy,
    extender: ExtenderSettings,
    active: Arc<Registry>,
    closing: AtomicBool,
}

impl LockService {
    pub fn new(nodes: Vec<SharedNode>, config: LockConfig) -> Result<Self, LockError> {
        let coordinator = QuorumCoordinator::new(nodes, &config)?;
        Ok(Self {
            coordinator: Arc::new(coordinator),
            retry: RetryPolicy::from_config(&config),
            extender: ExtenderSettings::from_config(&config),
            active: Arc::new(DashMap::new()),
            closing: AtomicBool::new(false),
        })
    }

    pub fn quorum(&self) -> usize {
        self.coordinator.quorum()
    }

    pub fn node_count(&self) -> usize {
        self.coordinator.node_count()
    }

    pub fn node_names(&self) -> Vec<String> {
        self.coordinator.node_names()
    }

    /// Locks currently registered by this service
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Active handle for `token`
    pub fn handle(&self, token: &str) -> Option<LockHandle> {
        self.active.get(token).map(|entry| entry.handle.clone())
    }

    /// Acquire `resource` for `ttl`, retrying with backoff while other
    /// holders keep it.
    pub async fn acquire(&self, resource: &str, ttl: Duration) -> Result<LockHandle, LockError> {
        validate_resource(resource)?;
        validate_ttl(ttl)?;
        if self.closing.load(Ordering::SeqCst) {
            return Err(LockError::ShuttingDown);
        }

        let start = Instant::now();
        let coordinator = &self.coordinator;
        let result = self
            .retry
            .run(resource, |token| async move {
                coordinator.acquire(resource, &token, ttl).await
            })
            .await;

        match result {
            Ok((token, grant)) => {
                metrics::record_acquire("acquired", start.elapsed());
                let handle = LockHandle::new(resource, token, ttl, &grant);
                info!(
                    resource = %resource,
                    ttl_ms = millis(ttl),
                    validity_ms = millis(grant.validity),
                    votes = grant.votes.yes,
                    "Lock acquired"
                );
                self.register(handle.clone());
                // Lost a race with shutdown, which may not have seen this lock
                if self.closing.load(Ordering::SeqCst) {
                    self.release(resource, handle.token()).await?;
                    return Err(LockError::ShuttingDown);
                }
                Ok(handle)
            }
            Err(e) => {
                metrics::record_acquire("locked", start.elapsed());
                info!(resource = %resource, error = %e, "Lock not acquired");
                Err(e)
            }
        }
    }

    /// Release the lock held with `token`.
    ///
    /// The auto-extender is stopped before the delete is sent. Releasing a
    /// lock that is gone, or that another token holds, is a no-op.
    pub async fn release(&self, resource: &str, token: &str) -> Result<ReleaseOutcome, LockError> {
        validate_resource(resource)?;
        validate_token(token)?;

        if let Some(active) = self.deregister(token, Some(resource)) {
            if let Some(extender) = active.extender {
                extender.cancel().await;
            }
            active.handle.mark_released();
        }

        let votes = self.coordinator.release(resource, token).await;
        let outcome = ReleaseOutcome::from_votes(&votes);
        metrics::record_release(outcome.as_str());

        match outcome {
            ReleaseOutcome::Released => info!(resource = %resource, "Lock released"),
            ReleaseOutcome::NotHeld => {
                debug!(resource = %resource, "Release was a no-op, token not held")
            }
            ReleaseOutcome::PartialFailure {
                confirmed,
                unavailable,
                total,
            } => warn!(
                resource = %resource,
                confirmed,
                unavailable,
                total,
                "Lock partially released, remaining records expire by TTL"
            ),
        }
        Ok(outcome)
    }

    /// Renew `handle` now, outside the extender schedule.
    ///
    /// On failure the handle is `Expired` and leaves the registry.
    pub async fn extend(&self, handle: &LockHandle) -> Result<(), LockError> {
        if !handle.is_usable() {
            return Err(LockError::not_held(handle.resource()));
        }

        match self
            .coordinator
            .extend(handle.resource(), handle.token(), handle.ttl())
            .await
        {
            Ok(grant) => {
                if !handle.renewed(&grant) {
                    return Err(LockError::not_held(handle.resource()));
                }
                metrics::record_extend("extended");
                info!(
                    resource = %handle.resource(),
                    validity_ms = millis(grant.validity),
                    extensions = handle.extensions(),
                    "Lock extended"
                );
                Ok(())
            }
            Err(e) => {
                handle.mark_expired();
                metrics::record_extend("failed");
                warn!(resource = %handle.resource(), error = %e, "Lock extension failed, lock is lost");
                if let Some(active) = self.deregister(handle.token(), None)
                    && let Some(extender) = active.extender
                {
                    extender.cancel().await;
                }
                Err(LockError::ExtensionFailed {
                    resource: handle.resource().to_string(),
                })
            }
        }
    }

    /// Extend the registered lock holding `token`.
    pub async fn extend_token(&self, resource: &str, token: &str) -> Result<LockHandle, LockError> {
        validate_resource(resource)?;
        validate_token(token)?;

        let handle = self
            .handle(token)
            .filter(|handle| handle.resource() == resource)
            .ok_or_else(|| LockError::not_held(resource))?;
        self.extend(&handle).await?;
        Ok(handle)
    }

    /// Refuse new acquisitions and release every lock still registered.
    pub async fn shutdown(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let held: Vec<(String, String)> = self
            .active
            .iter()
            .map(|entry| (entry.handle.resource().to_string(), entry.key().clone()))
            .collect();
        if held.is_empty() {
            return;
        }

        info!(count = held.len(), "Releasing active locks");
        let releases = held
            .iter()
            .map(|(resource, token)| self.release(resource, token));
        for (result, (resource, _)) in join_all(releases).await.into_iter().zip(&held) {
            if let Err(e) = result {
                warn!(resource = %resource, error = %e, "Failed to release lock on shutdown");
            }
        }
    }

    fn register(&self, handle: LockHandle) {
        let token = handle.token().to_string();
        self.active.insert(
            token.clone(),
            ActiveLock {
                handle: handle.clone(),
                extender: None,
            },
        );
        metrics::lock_activated();

        let registry: Weak<Registry> = Arc::downgrade(&self.active);
        let exit_token = token.clone();
        let extender = AutoExtender::spawn(
            self.coordinator.clone(),
            handle,
            self.extender,
            move || {
                if let Some(registry) = registry.upgrade()
                    && registry.remove(&exit_token).is_some()
                {
                    metrics::lock_deactivated();
                    debug!(token = %exit_token, "Lock left the registry");
                }
            },
        );

        // The task may already have ended and removed the entry.
        if let Some(mut entry) = self.active.get_mut(&token) {
            entry.extender = Some(extender);
        }
    }

    fn deregister(&self, token: &str, resource: Option<&str>) -> Option<ActiveLock> {
        let (_, active) = self.active.remove_if(token, |_, active| {
            resource.is_none_or(|resource| active.handle.resource() == resource)
        })?;
        metrics::lock_deactivated();
        Some(active)
    }
}
