//! Quorum coordination over independent storage nodes.
//!
//! Every operation fans the same primitive out to all nodes in parallel,
//! waits for each node to answer or time out, and decides on the tally.
//! Acquire and extend additionally compute the validity window left after
//! subtracting the time spent and the allowed clock drift; a failed acquire
//! or extend is rolled back on every node with the attempt's token.
//! `try_extend` skips the rollback so a renewal can be retried in place.

use std::time::Duration;

use futures::future::join_all;
use latchkey_common::{LockError, millis};
use tokio::time::Instant;
use tracing::debug;

use crate::config::{FIXED_DRIFT, LockConfig};
use crate::metrics;
use crate::node::{NodeOp, SharedNode};

/// Per-attempt tally of node answers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Votes {
    pub yes: usize,
    pub no: usize,
    pub unavailable: usize,
}

impl Votes {
    pub fn total(&self) -> usize {
        self.yes + self.no + self.unavailable
    }
}

/// A successful acquire or extend round.
#[derive(Debug, Clone, Copy)]
pub struct Grant {
    /// Instant the quorum decision was made
    pub decided_at: Instant,
    /// Time left on the lock, measured from `decided_at`
    pub validity: Duration,
    pub votes: Votes,
}

impl Grant {
    pub fn deadline(&self) -> Instant {
        self.decided_at + self.validity
    }
}

/// A round that did not reach quorum within the validity window. Already
/// rolled back when returned, except from `try_extend`.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error(
    "lock not acquired: {} of {} nodes agreed (quorum {}), {}ms elapsed",
    .votes.yes,
    .votes.total(),
    .quorum,
    .elapsed.as_millis()
)]
pub struct LockNotAcquired {
    pub votes: Votes,
    pub quorum: usize,
    pub elapsed: Duration,
}

/// Time a lock remains safely usable after a round that took `elapsed`.
///
/// `W = ttl - elapsed - ttl * drift_factor - FIXED_DRIFT`; `None` when the
/// window is not positive.
pub fn validity_window(ttl: Duration, elapsed: Duration, drift_factor: f64) -> Option<Duration> {
    let drift = ttl.mul_f64(drift_factor.clamp(0.0, 1.0)) + FIXED_DRIFT;
    ttl.checked_sub(elapsed)?
        .checked_sub(drift)
        .filter(|window| !window.is_zero())
}

/// Majority of `nodes`
pub fn quorum_of(nodes: usize) -> usize {
    nodes / 2 + 1
}

pub struct QuorumCoordinator {
    nodes: Vec<SharedNode>,
    quorum: usize,
    drift_factor: f64,
    node_timeout: Duration,
}

impl QuorumCoordinator {
    pub fn new(nodes: Vec<SharedNode>, config: &LockConfig) -> Result<Self, LockError> {
        config.validate()?;
        if nodes.is_empty() {
            return Err(LockError::Config(
                "at least one storage node is required".to_string(),
            ));
        }
        Ok(Self {
            quorum: quorum_of(nodes.len()),
            nodes,
            drift_factor: config.drift_factor,
            node_timeout: config.node_timeout(),
        })
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_names(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.name().to_string()).collect()
    }

    /// One acquisition attempt with the given token.
    pub async fn acquire(
        &self,
        resource: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<Grant, LockNotAcquired> {
        self.attempt(NodeOp::Set, resource, token, ttl, true).await
    }

    /// Refresh the TTL of records holding `token`.
    pub async fn extend(
        &self,
        resource: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<Grant, LockNotAcquired> {
        self.attempt(NodeOp::Extend, resource, token, ttl, true).await
    }

    /// One extension round that leaves the records in place when it fails.
    /// The caller rolls back with [`release`](Self::release) once it stops
    /// retrying.
    pub async fn try_extend(
        &self,
        resource: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<Grant, LockNotAcquired> {
        self.attempt(NodeOp::Extend, resource, token, ttl, false).await
    }

    /// Delete records holding `token`. The tally reports how many nodes
    /// confirmed a deletion.
    pub async fn release(&self, resource: &str, token: &str) -> Votes {
        self.fan_out(NodeOp::Delete, resource, token, Duration::ZERO)
            .await
    }

    async fn attempt(
        &self,
        op: NodeOp,
        resource: &str,
        token: &str,
        ttl: Duration,
        rollback: bool,
    ) -> Result<Grant, LockNotAcquired> {
        let start = Instant::now();
        let votes = self.fan_out(op, resource, token, ttl).await;
        let decided_at = Instant::now();
        let elapsed = decided_at - start;

        let window = validity_window(ttl, elapsed, self.drift_factor);
        debug!(
            op = %op,
            resource = %resource,
            yes = votes.yes,
            no = votes.no,
            unavailable = votes.unavailable,
            elapsed_ms = millis(elapsed),
            validity_ms = window.map(millis).unwrap_or(0),
            "Quorum round finished"
        );

        if let Some(validity) = window
            && votes.yes >= self.quorum
        {
            return Ok(Grant {
                decided_at,
                validity,
                votes,
            });
        }

        if rollback {
            // Roll back on every node, whichever subset said yes.
            let deleted = self.release(resource, token).await;
            debug!(
                op = %op,
                resource = %resource,
                deleted = deleted.yes,
                "Rolled back failed quorum round"
            );
        }

        Err(LockNotAcquired {
            votes,
            quorum: self.quorum,
            elapsed,
        })
    }

    async fn fan_out(&self, op: NodeOp, resource: &str, token: &str, ttl: Duration) -> Votes {
        let calls = self.nodes.iter().map(|node| async move {
            let outcome =
                tokio::time::timeout(self.node_timeout, op.invoke(node.as_ref(), resource, token, ttl))
                    .await;
            match outcome {
                Ok(Ok(vote)) => Some(vote),
                Ok(Err(e)) => {
                    debug!(op = %op, node = node.name(), error = %e, "Node call failed");
                    None
                }
                Err(_) => {
                    debug!(
                        op = %op,
                        node = node.name(),
                        timeout_ms = millis(self.node_timeout),
                        "Node call timed out"
                    );
                    None
                }
            }
        });

        let mut votes = Votes::default();
        for outcome in join_all(calls).await {
            match outcome {
                Some(true) => votes.yes += 1,
                Some(false) => votes.no += 1,
                None => votes.unavailable += 1,
            }
        }
        metrics::record_votes(op, &votes);
        votes
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;
    use crate::node::{MemoryNode, StorageNode};
    use crate::testing::ScriptedNode;

    const TTL: Duration = Duration::from_secs(10);

    fn memory_nodes(n: usize) -> Vec<Arc<MemoryNode>> {
        (0..n)
            .map(|i| Arc::new(MemoryNode::new(format!("n{}", i))))
            .collect()
    }

    fn shared(nodes: &[Arc<MemoryNode>]) -> Vec<SharedNode> {
        nodes.iter().map(|n| n.clone() as SharedNode).collect()
    }

    #[test]
    fn test_quorum_of() {
        assert_eq!(quorum_of(1), 1);
        assert_eq!(quorum_of(2), 2);
        assert_eq!(quorum_of(3), 2);
        assert_eq!(quorum_of(4), 3);
        assert_eq!(quorum_of(5), 3);
    }

    #[test]
    fn test_validity_window() {
        // 10000 - 100 - 100 - 2
        assert_eq!(
            validity_window(TTL, Duration::from_millis(100), 0.01),
            Some(Duration::from_millis(9798))
        );
        assert_eq!(
            validity_window(Duration::from_millis(100), Duration::from_millis(97), 0.01),
            None
        );
        assert_eq!(validity_window(TTL, TTL, 0.0), None);
        assert_eq!(validity_window(TTL, TTL * 2, 0.0), None);
    }

    proptest! {
        #[test]
        fn prop_window_never_exceeds_ttl_minus_elapsed(
            ttl_ms in 1u64..1_000_000,
            elapsed_ms in 0u64..1_000_000,
            drift in 0.0f64..0.5,
        ) {
            let ttl = Duration::from_millis(ttl_ms);
            let elapsed = Duration::from_millis(elapsed_ms);
            if let Some(window) = validity_window(ttl, elapsed, drift) {
                prop_assert!(elapsed < ttl);
                prop_assert!(window <= ttl - elapsed);
                prop_assert!(!window.is_zero());
            }
        }

        #[test]
        fn prop_window_closes_near_ttl(ttl_ms in 1u64..1_000_000, drift in 0.0f64..0.5) {
            let ttl = Duration::from_millis(ttl_ms);
            let almost = ttl.saturating_sub(FIXED_DRIFT);
            prop_assert_eq!(validity_window(ttl, almost, drift), None);
        }
    }

    #[test]
    fn test_new_requires_nodes() {
        assert!(matches!(
            QuorumCoordinator::new(Vec::new(), &LockConfig::default()),
            Err(LockError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_acquire_all_nodes() {
        let nodes = memory_nodes(5);
        let coordinator = QuorumCoordinator::new(shared(&nodes), &LockConfig::default()).unwrap();
        assert_eq!(coordinator.quorum(), 3);

        let grant = coordinator.acquire("job:1", "t1", TTL).await.unwrap();
        assert_eq!(grant.votes.yes, 5);
        assert!(grant.validity <= TTL);
        for node in &nodes {
            assert_eq!(node.holder("job:1"), Some("t1".to_string()));
        }

        // A second holder is rejected everywhere and leaves no trace
        let err = coordinator.acquire("job:1", "t2", TTL).await.unwrap_err();
        assert_eq!(err.votes.yes, 0);
        assert_eq!(err.votes.no, 5);
        for node in &nodes {
            assert_eq!(node.holder("job:1"), Some("t1".to_string()));
        }
    }

    #[tokio::test]
    async fn test_rollback_below_quorum() {
        let nodes = memory_nodes(5);
        // Three nodes already hold the resource for someone else
        for node in &nodes[2..] {
            node.force_set("job:7", "other", TTL);
        }
        let coordinator = QuorumCoordinator::new(shared(&nodes), &LockConfig::default()).unwrap();

        let err = coordinator.acquire("job:7", "mine", TTL).await.unwrap_err();
        assert_eq!(err.votes.yes, 2);
        assert_eq!(err.votes.no, 3);
        assert_eq!(err.quorum, 3);

        // Both successful records were deleted before returning
        assert!(nodes[0].holder("job:7").is_none());
        assert!(nodes[1].holder("job:7").is_none());
        // Foreign records are untouched
        for node in &nodes[2..] {
            assert_eq!(node.holder("job:7"), Some("other".to_string()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_fast_two_timeouts() {
        let mut nodes: Vec<SharedNode> = Vec::new();
        for i in 0..3 {
            nodes.push(Arc::new(
                ScriptedNode::new(format!("fast{}", i)).with_delay(Duration::from_millis(50)),
            ));
        }
        for i in 0..2 {
            nodes.push(Arc::new(
                ScriptedNode::new(format!("slow{}", i)).with_delay(Duration::from_secs(5)),
            ));
        }
        let config = LockConfig {
            node_timeout_ms: 100,
            drift_factor: 0.01,
            ..Default::default()
        };
        let coordinator = QuorumCoordinator::new(nodes, &config).unwrap();

        let start = Instant::now();
        let grant = coordinator.acquire("job:a", "t", TTL).await.unwrap();

        assert_eq!(grant.votes.yes, 3);
        assert_eq!(grant.votes.unavailable, 2);
        assert_eq!(grant.decided_at - start, Duration::from_millis(100));
        assert_eq!(grant.validity, Duration::from_millis(9798));
        let lifetime = grant.deadline() - start;
        assert!(lifetime <= Duration::from_millis(9900));
        assert!(lifetime >= Duration::from_millis(9800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_exhausted_is_failure() {
        // Quorum is reached, but only after the TTL has been consumed
        let nodes: Vec<SharedNode> = (0..3)
            .map(|i| {
                Arc::new(
                    ScriptedNode::new(format!("n{}", i)).with_delay(Duration::from_millis(90)),
                ) as SharedNode
            })
            .collect();
        let coordinator =
            QuorumCoordinator::new(nodes.clone(), &LockConfig::default()).unwrap();

        let err = coordinator
            .acquire("r", "t", Duration::from_millis(90))
            .await
            .unwrap_err();
        assert_eq!(err.votes.yes, 3);
        // Rolled back everywhere
        for node in nodes {
            assert_eq!(node.compare_delete("r", "t").await, Ok(false));
        }
    }

    #[tokio::test]
    async fn test_unavailable_nodes_count_as_no() {
        let mut nodes: Vec<SharedNode> = memory_nodes(3)
            .into_iter()
            .map(|n| n as SharedNode)
            .collect();
        nodes.push(Arc::new(ScriptedNode::new("down1").unavailable()));
        nodes.push(Arc::new(ScriptedNode::new("down2").unavailable()));
        let coordinator = QuorumCoordinator::new(nodes, &LockConfig::default()).unwrap();

        let grant = coordinator.acquire("r", "t", TTL).await.unwrap();
        assert_eq!(grant.votes.yes, 3);
        assert_eq!(grant.votes.unavailable, 2);
    }

    #[tokio::test]
    async fn test_too_many_unavailable_nodes() {
        let healthy = memory_nodes(2);
        let mut nodes = shared(&healthy);
        for i in 0..3 {
            nodes.push(Arc::new(ScriptedNode::new(format!("down{}", i)).unavailable()));
        }
        let coordinator = QuorumCoordinator::new(nodes, &LockConfig::default()).unwrap();

        let err = coordinator.acquire("r", "t", TTL).await.unwrap_err();
        assert_eq!(err.votes.yes, 2);
        assert_eq!(err.votes.unavailable, 3);
        for node in &healthy {
            assert!(node.is_empty());
        }
    }

    #[tokio::test]
    async fn test_extend_and_release() {
        let nodes = memory_nodes(3);
        let coordinator = QuorumCoordinator::new(shared(&nodes), &LockConfig::default()).unwrap();
        coordinator.acquire("r", "t", TTL).await.unwrap();

        let grant = coordinator.extend("r", "t", TTL * 6).await.unwrap();
        assert_eq!(grant.votes.yes, 3);
        assert!(nodes[0].remaining_ttl("r").unwrap() > TTL);

        // Extending with a stranger's token fails and does not disturb the holder
        let err = coordinator.extend("r", "intruder", TTL).await.unwrap_err();
        assert_eq!(err.votes.yes, 0);
        assert_eq!(nodes[1].holder("r"), Some("t".to_string()));

        let votes = coordinator.release("r", "t").await;
        assert_eq!(votes.yes, 3);
        assert!(nodes.iter().all(|n| n.is_empty()));

        let votes = coordinator.release("r", "t").await;
        assert_eq!(votes.yes, 0);
        assert_eq!(votes.no, 3);
    }

    #[tokio::test]
    async fn test_try_extend_keeps_records_on_failure() {
        let nodes: Vec<Arc<ScriptedNode>> = (0..3)
            .map(|i| Arc::new(ScriptedNode::new(format!("n{}", i))))
            .collect();
        let shared: Vec<SharedNode> = nodes.iter().map(|n| n.clone() as SharedNode).collect();
        let coordinator = QuorumCoordinator::new(shared, &LockConfig::default()).unwrap();
        coordinator.acquire("r", "t", TTL).await.unwrap();

        nodes[0].fail_next_extends(1);
        nodes[1].fail_next_extends(1);
        let err = coordinator.try_extend("r", "t", TTL).await.unwrap_err();
        assert_eq!(err.votes.yes, 1);
        assert_eq!(err.votes.unavailable, 2);
        for node in &nodes {
            assert_eq!(node.memory().holder("r"), Some("t".to_string()));
        }

        // The next round finds every record and succeeds
        let grant = coordinator.try_extend("r", "t", TTL).await.unwrap();
        assert_eq!(grant.votes.yes, 3);
    }
}
