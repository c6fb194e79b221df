// Scripted storage nodes for tests
// Wraps a MemoryNode with configurable latency and failure behaviour

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::node::{MemoryNode, NodeResult, NodeUnavailable, StorageNode};

pub struct ScriptedNode {
    inner: MemoryNode,
    delay: Duration,
    unavailable: AtomicBool,
    refuse_extend: AtomicBool,
    failing_extends: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: MemoryNode::new(name),
            delay: Duration::ZERO,
            unavailable: AtomicBool::new(false),
            refuse_extend: AtomicBool::new(false),
            failing_extends: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call sleeps this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn unavailable(self) -> Self {
        self.set_unavailable(true);
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Answer "no" to every extension
    pub fn set_refuse_extend(&self, refuse: bool) {
        self.refuse_extend.store(refuse, Ordering::SeqCst);
    }

    /// The next `count` extensions fail as if the connection dropped
    pub fn fail_next_extends(&self, count: usize) {
        self.failing_extends.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn memory(&self) -> &MemoryNode {
        &self.inner
    }

    async fn enter(&self) -> Result<(), NodeUnavailable> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(NodeUnavailable::new(self.inner.name(), "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageNode for ScriptedNode {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn try_set(&self, resource: &str, token: &str, ttl: Duration) -> NodeResult {
        self.enter().await?;
        self.inner.try_set(resource, token, ttl).await
    }

    async fn try_extend(&self, resource: &str, token: &str, ttl: Duration) -> NodeResult {
        self.enter().await?;
        if self
            .failing_extends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(NodeUnavailable::new(self.inner.name(), "connection reset"));
        }
        if self.refuse_extend.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.inner.try_extend(resource, token, ttl).await
    }

    async fn compare_delete(&self, resource: &str, token: &str) -> NodeResult {
        self.enter().await?;
        self.inner.compare_delete(resource, token).await
    }
}
