//! Storage node abstraction.
//!
//! A storage node is one independent key-value backend holding at most one
//! lock record per resource. The coordinator only relies on the three atomic
//! conditional primitives below; replication and persistence of a node are
//! not its concern.

mod memory;
mod redis;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use memory::MemoryNode;
pub use self::redis::RedisNode;

/// The node could not give an answer (connection, protocol or timeout
/// failure). Distinct from an atomic "no" decided by the node itself.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("storage node '{node}' unavailable: {reason}")]
pub struct NodeUnavailable {
    pub node: String,
    pub reason: String,
}

impl NodeUnavailable {
    pub fn new(node: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            node: node.into(),
            reason: reason.to_string(),
        }
    }
}

pub type NodeResult = Result<bool, NodeUnavailable>;

/// Atomic lock primitives exposed by one storage node.
#[async_trait]
pub trait StorageNode: Send + Sync {
    /// Endpoint or label used in logs
    fn name(&self) -> &str;

    /// Store `token` under `resource` with the given TTL if no record exists.
    async fn try_set(&self, resource: &str, token: &str, ttl: Duration) -> NodeResult;

    /// Reset the TTL of the record if it still holds `token`.
    async fn try_extend(&self, resource: &str, token: &str, ttl: Duration) -> NodeResult;

    /// Delete the record if it still holds `token`.
    async fn compare_delete(&self, resource: &str, token: &str) -> NodeResult;
}

pub type SharedNode = Arc<dyn StorageNode>;

/// Which primitive a quorum round fans out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOp {
    Set,
    Extend,
    Delete,
}

impl NodeOp {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeOp::Set => "set",
            NodeOp::Extend => "extend",
            NodeOp::Delete => "delete",
        }
    }

    pub(crate) async fn invoke(
        self,
        node: &dyn StorageNode,
        resource: &str,
        token: &str,
        ttl: Duration,
    ) -> NodeResult {
        match self {
            NodeOp::Set => node.try_set(resource, token, ttl).await,
            NodeOp::Extend => node.try_extend(resource, token, ttl).await,
            NodeOp::Delete => node.compare_delete(resource, token).await,
        }
    }
}

impl fmt::Display for NodeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build a node from an endpoint string.
///
/// Supported schemes: `memory://<name>` for an in-process node and
/// `redis://host:port[/db]` for a Redis or KeyDB server.
pub fn from_endpoint(endpoint: &str) -> Result<SharedNode, latchkey_common::LockError> {
    if let Some(name) = endpoint.strip_prefix("memory://") {
        let name = if name.is_empty() { "memory" } else { name };
        return Ok(Arc::new(MemoryNode::new(name)));
    }
    if endpoint.starts_with("redis://") {
        return RedisNode::new(endpoint).map(|node| Arc::new(node) as SharedNode);
    }
    Err(latchkey_common::LockError::Config(format!(
        "unsupported storage node endpoint '{}'",
        endpoint
    )))
}
