//! Latchkey core
//!
//! Quorum-based distributed locking over independent storage nodes:
//! - `node`: storage node trait with in-memory and Redis implementations
//! - `coordinator`: parallel fan-out, vote counting, validity window, rollback
//! - `retry`: bounded jittered retries of acquisition attempts
//! - `handle`: client-side lock handle and its state machine
//! - `extender`: background renewal bound to a handle
//! - `service`: boundary API used by the request layer

pub mod config;
pub mod coordinator;
pub mod extender;
pub mod handle;
pub mod metrics;
pub mod node;
pub mod retry;
pub mod service;
pub mod token;

#[cfg(test)]
mod testing;

pub use config::LockConfig;
pub use coordinator::{Grant, LockNotAcquired, QuorumCoordinator, Votes};
pub use handle::{LockHandle, LockSnapshot, LockState};
pub use node::{MemoryNode, NodeUnavailable, RedisNode, SharedNode, StorageNode, from_endpoint};
pub use service::{LockService, ReleaseOutcome};
