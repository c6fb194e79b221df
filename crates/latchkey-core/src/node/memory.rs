// In-process storage node
// Holds lock records in a mutex-guarded map and expires them lazily
// Writes also sweep the whole map for expired records at most once per SWEEP_INTERVAL

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{NodeResult, StorageNode};

const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

struct LockRecord {
    token: String,
    expires_at: Instant,
}

impl LockRecord {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Storage node living in the current process.
///
/// Every primitive runs under a single mutex, which makes it atomic with
/// respect to other callers. Expired records are dropped when touched, and
/// `try_set` periodically sweeps the ones nobody touches again.
pub struct MemoryNode {
    name: String,
    records: Mutex<HashMap<String, LockRecord>>,
    next_sweep: Mutex<Instant>,
}

impl MemoryNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Mutex::new(HashMap::new()),
            next_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Token currently stored for `resource`, if the record is live
    pub fn holder(&self, resource: &str) -> Option<String> {
        let records = self.records.lock();
        records
            .get(resource)
            .filter(|r| !r.is_expired(Instant::now()))
            .map(|r| r.token.clone())
    }

    /// Time left before the record for `resource` expires
    pub fn remaining_ttl(&self, resource: &str) -> Option<Duration> {
        let now = Instant::now();
        let records = self.records.lock();
        records
            .get(resource)
            .filter(|r| !r.is_expired(now))
            .map(|r| r.expires_at - now)
    }

    /// Write a record unconditionally, replacing any holder
    pub fn force_set(&self, resource: &str, token: &str, ttl: Duration) {
        self.records.lock().insert(
            resource.to_string(),
            LockRecord {
                token: token.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Drop every expired record and return how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut records = self.records.lock();
        *self.next_sweep.lock() = now + SWEEP_INTERVAL;
        self.purge(&mut records, now)
    }

    fn purge(&self, records: &mut HashMap<String, LockRecord>, now: Instant) -> usize {
        let before = records.len();
        records.retain(|_, r| !r.is_expired(now));
        let purged = before - records.len();
        if purged > 0 {
            debug!(node = %self.name, count = purged, "Purged expired lock records");
        }
        purged
    }

    fn sweep_if_due(&self, records: &mut HashMap<String, LockRecord>, now: Instant) {
        let mut next_sweep = self.next_sweep.lock();
        if now < *next_sweep {
            return;
        }
        *next_sweep = now + SWEEP_INTERVAL;
        drop(next_sweep);
        self.purge(records, now);
    }

    /// Records in the map, expired ones included
    #[cfg(test)]
    fn stored(&self) -> usize {
        self.records.lock().len()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.records
            .lock()
            .values()
            .filter(|r| !r.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageNode for MemoryNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn try_set(&self, resource: &str, token: &str, ttl: Duration) -> NodeResult {
        let now = Instant::now();
        let mut records = self.records.lock();
        self.sweep_if_due(&mut records, now);
        if let Some(existing) = records.get(resource)
            && !existing.is_expired(now)
        {
            return Ok(false);
        }
        records.insert(
            resource.to_string(),
            LockRecord {
                token: token.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn try_extend(&self, resource: &str, token: &str, ttl: Duration) -> NodeResult {
        let now = Instant::now();
        let mut records = self.records.lock();
        match records.get_mut(resource) {
            Some(record) if record.token == token && !record.is_expired(now) => {
                record.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn compare_delete(&self, resource: &str, token: &str) -> NodeResult {
        let now = Instant::now();
        let mut records = self.records.lock();
        match records.get(resource) {
            Some(record) if record.token == token && !record.is_expired(now) => {
                records.remove(resource);
                Ok(true)
            }
            Some(record) if record.is_expired(now) => {
                records.remove(resource);
                Ok(false)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_set_if_absent() {
        let node = MemoryNode::new("n1");
        assert_eq!(node.try_set("job:1", "a", TTL).await, Ok(true));
        assert_eq!(node.try_set("job:1", "b", TTL).await, Ok(false));
        assert_eq!(node.holder("job:1"), Some("a".to_string()));
        // Other resources are independent
        assert_eq!(node.try_set("job:2", "b", TTL).await, Ok(true));
        assert_eq!(node.len(), 2);
    }

    #[tokio::test]
    async fn test_compare_delete_requires_matching_token() {
        let node = MemoryNode::new("n1");
        node.force_set("job:42", "xyz", TTL);

        assert_eq!(node.compare_delete("job:42", "abc").await, Ok(false));
        assert_eq!(node.holder("job:42"), Some("xyz".to_string()));

        assert_eq!(node.compare_delete("job:42", "xyz").await, Ok(true));
        assert!(node.holder("job:42").is_none());
        assert_eq!(node.compare_delete("job:42", "xyz").await, Ok(false));
    }

    #[tokio::test]
    async fn test_extend_requires_matching_token() {
        let node = MemoryNode::new("n1");
        assert_eq!(node.try_set("r", "t1", TTL).await, Ok(true));
        assert_eq!(node.try_extend("r", "t2", TTL).await, Ok(false));
        assert_eq!(node.try_extend("missing", "t1", TTL).await, Ok(false));
        assert_eq!(
            node.try_extend("r", "t1", Duration::from_secs(60)).await,
            Ok(true)
        );
        assert!(node.remaining_ttl("r").unwrap() > TTL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_expire() {
        let node = MemoryNode::new("n1");
        assert_eq!(
            node.try_set("r", "t1", Duration::from_millis(100)).await,
            Ok(true)
        );

        tokio::time::advance(Duration::from_millis(100)).await;

        assert!(node.holder("r").is_none());
        assert_eq!(node.try_extend("r", "t1", TTL).await, Ok(false));
        assert_eq!(node.try_set("r", "t2", TTL).await, Ok(true));
        assert_eq!(node.holder("r"), Some("t2".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let node = MemoryNode::new("n1");
        node.force_set("a", "t", Duration::from_millis(10));
        node.force_set("b", "t", TTL);

        tokio::time::advance(Duration::from_millis(20)).await;

        assert_eq!(node.purge_expired(), 1);
        assert_eq!(node.len(), 1);
        assert!(!node.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_sweep_abandoned_records() {
        let node = MemoryNode::new("n1");
        for i in 0..10_000 {
            let resource = format!("job:{}", i);
            assert_eq!(
                node.try_set(&resource, "t", Duration::from_millis(10)).await,
                Ok(true)
            );
        }
        assert_eq!(node.stored(), 10_000);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(node.try_set("job:next", "t", TTL).await, Ok(true));
        assert_eq!(node.stored(), 1);
        assert_eq!(node.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_runs_at_most_once_per_interval() {
        let node = MemoryNode::new("n1");
        assert_eq!(node.try_set("a", "t", TTL).await, Ok(true));
        node.force_set("b", "t", Duration::from_millis(10));

        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(node.try_set("c", "t", TTL).await, Ok(true));
        // The expired record waits for the next sweep
        assert_eq!(node.stored(), 3);

        tokio::time::advance(SWEEP_INTERVAL).await;
        assert_eq!(node.try_set("d", "t", TTL).await, Ok(true));
        assert_eq!(node.stored(), 3);
        assert!(node.holder("b").is_none());
    }
}
