//! Token bucket pacing for outbound debrid and search requests.
//!
//! Each HTTP client owns one limiter. A caller that finds the bucket empty
//! sleeps until the next token instead of failing, so bursts are spread out
//! rather than rejected.

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::debug;

/// Token bucket for a single upstream.
///
/// Tokens are added at a constant rate and consumed per request. The bucket
/// starts full, allowing a burst up to its capacity.
#[derive(Debug)]
pub struct TokenBucket {
    /// Max tokens (= requests per minute).
    capacity: f64,
    tokens: f64,
    /// Tokens added per second.
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = f64::from(requests_per_minute.max(1));
        Self {
            capacity,
            tokens: capacity,
            refill_rate: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    /// Take a token, or return how long until one is available.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let tokens_needed = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(tokens_needed / self.refill_rate))
        }
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.capacity as u32
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// Shared limiter for one upstream client.
#[derive(Debug)]
pub struct RateLimiter {
    upstream: String,
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    /// `None` when `requests_per_minute` is 0, which disables limiting.
    pub fn per_minute(upstream: &str, requests_per_minute: u32) -> Option<Self> {
        (requests_per_minute > 0).then(|| Self {
            upstream: upstream.to_string(),
            bucket: Mutex::new(TokenBucket::new(requests_per_minute)),
        })
    }

    /// Wait until a request may be sent.
    pub async fn acquire(&self) {
        loop {
            let wait = match self.bucket.lock().await.try_acquire() {
                Ok(()) => return,
                Err(wait) => wait,
            };
            debug!(
                upstream = %self.upstream,
                wait_ms = wait.as_millis() as u64,
                "Rate limited, waiting for a token"
            );
            tokio::time::sleep(wait).await;
        }
    }

    pub async fn requests_per_minute(&self) -> u32 {
        self.bucket.lock().await.requests_per_minute()
    }
}
