//! Client-side rate limiter for outbound accrual requests

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ServiceError, ServiceResult};

/// Token bucket configuration
#[derive(Debug, Clone)]
pub struct TokenBucketConfig {
    /// Refill rate in tokens per second
    pub rate: f64,
    /// Maximum number of stored tokens
    pub burst: f64,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self {
            rate: 5.0,
            burst: 5.0,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Shared token bucket. All clones draw from the same bucket.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    config: TokenBucketConfig,
    state: Arc<Mutex<BucketState>>,
}

impl TokenBucket {
    /// Create a new bucket. It starts drained, so a freshly started
    /// process cannot front-load a burst of requests.
    pub fn new(config: TokenBucketConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(BucketState {
                tokens: 0.0,
                last_refill: Instant::now(),
            })),
            config,
        }
    }

    /// Take one token, waiting for a refill when the bucket is empty.
    /// The wait is aborted as soon as `cancel` fires.
    pub async fn acquire(&self, cancel: &CancellationToken) -> ServiceResult<()> {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.config.rate).min(self.config.burst);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return Ok(());
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.config.rate)
            };

            tokio::select! {
                _ = cancel.cancelled() => return Err(ServiceError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}
