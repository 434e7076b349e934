use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

/// Token-bucket admission gate shared by all callers of one upstream API.
///
/// The bucket refills in full once the refill interval has elapsed since the
/// last reset, rather than dripping tokens one at a time. Waiters poll the
/// bucket at a fraction of the interval until a token frees up.
pub struct RateLimiter {
    capacity: u32,
    refill_interval: Duration,
    poll_interval: Duration,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_interval: Duration) -> Self {
        // A zero-capacity bucket would never admit anyone; treat it as 1.
        let capacity = capacity.max(1);
        // Smoother waiting than a flat 100ms when intervals are short.
        let poll_interval = (refill_interval / capacity).min(Duration::from_millis(100));
        Self {
            capacity,
            refill_interval,
            poll_interval,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Blocks until a token is available, then debits one.
    pub async fn acquire(&self) {
        loop {
            {
                let mut state = self.state.lock().await;
                if state.tokens > 0 {
                    state.tokens -= 1;
                    return;
                }
                // The lock serializes the elapsed check, so only one caller resets.
                if state.last_refill.elapsed() > self.refill_interval {
                    state.tokens = self.capacity - 1;
                    state.last_refill = Instant::now();
                    debug!(capacity = self.capacity, "rate limiter bucket refilled");
                    return;
                }
            }
            sleep(self.poll_interval).await;
        }
    }

    #[cfg(test)]
    async fn available(&self) -> u32 {
        self.state.lock().await.tokens
    }
}
