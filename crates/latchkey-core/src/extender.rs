//! Background renewal bound to one lock handle.
//!
//! The task sleeps until `deadline - threshold`, extends the lock through the
//! coordinator and reschedules. The lead never exceeds half of the time left,
//! so a TTL shorter than the threshold still renews at a bounded rate. A
//! renewal that still fails after its retries is rolled back and is
//! fail-stop: the handle is marked `Expired` and the task ends. When renewal
//! is disabled or its budget is spent, the task waits for the deadline,
//! expires the handle and ends, so every handle reaches a terminal state.

use std::sync::Arc;
use std::time::Duration;

use latchkey_common::millis;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::config::LockConfig;
use crate::coordinator::QuorumCoordinator;
use crate::handle::{LockHandle, LockState};
use crate::metrics;

/// Renewal settings taken from [`LockConfig`]
#[derive(Debug, Clone, Copy)]
pub struct ExtenderSettings {
    pub enabled: bool,
    pub threshold: Duration,
    /// 0 = unlimited
    pub max_extensions: u32,
    /// Extra attempts before a renewal counts as failed
    pub retries: u32,
}

impl ExtenderSettings {
    pub fn from_config(config: &LockConfig) -> Self {
        Self {
            enabled: config.auto_extend,
            threshold: config.extension_threshold(),
            max_extensions: config.max_extensions,
            retries: config.extension_retries,
        }
    }

    fn may_renew(&self, extensions: u32) -> bool {
        self.enabled && (self.max_extensions == 0 || extensions < self.max_extensions)
    }
}

/// Running renewal task of one handle.
pub struct AutoExtender {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl AutoExtender {
    /// Spawn the renewal task. `on_exit` runs once when the task ends for
    /// any reason other than cancellation.
    pub fn spawn<F>(
        coordinator: Arc<QuorumCoordinator>,
        handle: LockHandle,
        settings: ExtenderSettings,
        on_exit: F,
    ) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            if run(coordinator, handle, settings, stop_rx).await {
                on_exit();
            }
        });
        Self {
            stop_tx: Some(stop_tx),
            task,
        }
    }

    /// Stop scheduling and wait for the task to end. A renewal already in
    /// flight completes first, so no renewal can land after this returns.
    pub async fn cancel(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        let _ = (&mut self.task).await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Returns false when stopped through the cancel channel.
async fn run(
    coordinator: Arc<QuorumCoordinator>,
    handle: LockHandle,
    settings: ExtenderSettings,
    mut stop_rx: oneshot::Receiver<()>,
) -> bool {
    loop {
        if !handle.is_usable() {
            return true;
        }

        let renew = settings.may_renew(handle.extensions());
        let deadline = handle.validity_deadline();
        let wake_at = if renew {
            let now = Instant::now();
            let lead = settings
                .threshold
                .min(deadline.saturating_duration_since(now) / 2);
            deadline.checked_sub(lead).unwrap_or(now)
        } else {
            deadline
        };

        tokio::select! {
            _ = &mut stop_rx => {
                debug!(resource = %handle.resource(), "Auto-extension cancelled");
                return false;
            }
            _ = sleep_until(wake_at) => {}
        }

        if !renew {
            // Only reached at the deadline: let the handle lapse.
            if handle.state() == LockState::Expired {
                debug!(resource = %handle.resource(), "Lock lapsed without renewal");
            }
            continue;
        }

        if !handle.mark_expiring() {
            return true;
        }

        if !renew_once(&coordinator, &handle, settings.retries).await {
            handle.mark_expired();
            metrics::record_extend("failed");
            warn!(
                resource = %handle.resource(),
                extensions = handle.extensions(),
                "Lock renewal failed, lock is lost"
            );
            return true;
        }
    }
}

/// Failed rounds keep the records so the next attempt can still extend them;
/// once the attempts are spent the lock is rolled back on every node.
async fn renew_once(coordinator: &QuorumCoordinator, handle: &LockHandle, retries: u32) -> bool {
    for attempt in 0..=retries {
        match coordinator
            .try_extend(handle.resource(), handle.token(), handle.ttl())
            .await
        {
            Ok(grant) => {
                if !handle.renewed(&grant) {
                    return false;
                }
                metrics::record_extend("renewed");
                info!(
                    resource = %handle.resource(),
                    validity_ms = millis(grant.validity),
                    extensions = handle.extensions(),
                    "Lock renewed"
                );
                return true;
            }
            Err(e) => {
                debug!(resource = %handle.resource(), attempt, error = %e, "Renewal attempt failed");
                if Instant::now() >= handle.validity_deadline() {
                    break;
                }
            }
        }
    }

    let deleted = coordinator.release(handle.resource(), handle.token()).await;
    debug!(
        resource = %handle.resource(),
        deleted = deleted.yes,
        "Rolled back failed renewal"
    );
    false
}
