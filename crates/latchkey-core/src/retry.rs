//! Bounded, jittered retries around acquisition attempts.

use std::future::Future;
use std::time::Duration;

use latchkey_common::{LockError, millis};
use rand::Rng;
use tracing::debug;

use crate::config::LockConfig;
use crate::coordinator::LockNotAcquired;
use crate::token::generate_token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub retry_jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &LockConfig) -> Self {
        Self {
            retry_count: config.retry_count,
            retry_delay: config.retry_delay(),
            retry_jitter: config.retry_jitter(),
        }
    }

    /// Total attempts allowed, the first one included
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    /// `retry_delay + uniform(0, retry_jitter)`
    pub fn backoff(&self) -> Duration {
        let jitter_ms = millis(self.retry_jitter);
        if jitter_ms == 0 {
            return self.retry_delay;
        }
        self.retry_delay + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }

    /// Drive `attempt` until it succeeds or the budget runs out.
    ///
    /// Every attempt receives a freshly generated token; the winning token is
    /// returned alongside the attempt's value.
    pub async fn run<T, F, Fut>(&self, resource: &str, mut attempt: F) -> Result<(String, T), LockError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, LockNotAcquired>>,
    {
        let attempts = self.max_attempts();
        for n in 1..=attempts {
            let token = generate_token();
            match attempt(token.clone()).await {
                Ok(value) => return Ok((token, value)),
                Err(e) => {
                    debug!(resource = %resource, attempt = n, error = %e, "Acquire attempt failed");
                    if n < attempts {
                        tokio::time::sleep(self.backoff()).await;
                    }
                }
            }
        }
        Err(LockError::ResourceLocked {
            resource: resource.to_string(),
            attempts,
        })
    }
}
