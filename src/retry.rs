use crate::error::Result;
use log::warn;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Bounded retry around one fallible async operation. The default allows
/// exactly one retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Pause between attempts, in milliseconds
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff_ms: backoff.as_millis() as u64,
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Runs `operation` until it succeeds or the attempts are used up, passing
    /// the 1-based attempt number. Returns the last error on exhaustion.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    warn!("Attempt {}/{} failed: {}; retrying", attempt, attempts, e);
                    if self.backoff_ms > 0 {
                        tokio::time::sleep(self.backoff()).await;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    warn!("Attempt {}/{} failed: {}; giving up", attempt, attempts, e);
                    return Err(e);
                }
            }
        }
    }
}
