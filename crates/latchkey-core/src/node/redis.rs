//! Redis / KeyDB storage node.
//!
//! `try_set` maps to `SET key token NX PX ttl`. Extension and deletion run
//! as Lua scripts so the token comparison and the mutation happen atomically
//! on the server.

use std::time::Duration;

use async_trait::async_trait;
use latchkey_common::{LockError, millis};
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{NodeResult, NodeUnavailable, StorageNode};

const EXTEND_SCRIPT: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('PEXPIRE', KEYS[1], ARGV[2])
    end
    return 0
"#;

const DELETE_SCRIPT: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    end
    return 0
"#;

/// Storage node backed by a single Redis-compatible server.
///
/// The connection is opened on first use, so an unreachable server at
/// startup only costs this node its votes until it comes back.
pub struct RedisNode {
    endpoint: String,
    client: Client,
    connection: OnceCell<ConnectionManager>,
    extend_script: Script,
    delete_script: Script,
}

impl RedisNode {
    pub fn new(endpoint: &str) -> Result<Self, LockError> {
        let client = Client::open(endpoint).map_err(|e| {
            LockError::Config(format!("invalid redis endpoint '{}': {}", endpoint, e))
        })?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
            connection: OnceCell::new(),
            extend_script: Script::new(EXTEND_SCRIPT),
            delete_script: Script::new(DELETE_SCRIPT),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, NodeUnavailable> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                let manager = ConnectionManager::new(self.client.clone())
                    .await
                    .map_err(|e| self.unavailable(e))?;
                info!(node = %self.endpoint, "Connected to storage node");
                Ok::<_, NodeUnavailable>(manager)
            })
            .await?;
        Ok(manager.clone())
    }

    fn unavailable(&self, err: redis::RedisError) -> NodeUnavailable {
        debug!(node = %self.endpoint, error = %err, "Storage node call failed");
        NodeUnavailable::new(&self.endpoint, err)
    }
}

#[async_trait]
impl StorageNode for RedisNode {
    fn name(&self) -> &str {
        &self.endpoint
    }

    async fn try_set(&self, resource: &str, token: &str, ttl: Duration) -> NodeResult {
        let mut conn = self.connection().await?;
        // SET … NX returns "OK" when the key was set, nil otherwise.
        let reply: Option<String> = redis::cmd("SET")
            .arg(resource)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| self.unavailable(e))?;
        Ok(reply.is_some())
    }

    async fn try_extend(&self, resource: &str, token: &str, ttl: Duration) -> NodeResult {
        let mut conn = self.connection().await?;
        let extended: i64 = self
            .extend_script
            .key(resource)
            .arg(token)
            .arg(millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| self.unavailable(e))?;
        Ok(extended == 1)
    }

    async fn compare_delete(&self, resource: &str, token: &str) -> NodeResult {
        let mut conn = self.connection().await?;
        let deleted: i64 = self
            .delete_script
            .key(resource)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| self.unavailable(e))?;
        Ok(deleted == 1)
    }
}
