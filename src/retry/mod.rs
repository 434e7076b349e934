use crate::error::{PortfolioError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Bounded retry for fallible batch operations.
///
/// Runs as an explicit loop, never recursion. Between attempts it honors an
/// upstream retry-after hint when the error carries one, otherwise waits a
/// fixed short delay. The terminal error is propagated unchanged.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(300),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_err: Option<PortfolioError> = None;

        for attempt in 1..=attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let remaining = attempts - attempt;
                    if remaining == 0 {
                        return Err(e);
                    }
                    let delay = match e.retry_after() {
                        Some(secs) => Duration::from_secs(secs),
                        None => self.base_delay,
                    };
                    warn!(
                        "Operation failed, retrying in {:?}. Retries left: {}. Error: {}",
                        delay, remaining, e
                    );
                    last_err = Some(e);
                    sleep(delay).await;
                }
            }
        }

        // Unreachable: the loop always returns on the final attempt.
        Err(last_err.unwrap_or_else(|| PortfolioError::Internal("retry loop exited".to_string())))
    }
}
