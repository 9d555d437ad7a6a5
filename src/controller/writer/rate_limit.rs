//! Token-bucket admission gate for store operations.
//!
//! One bucket is shared by every reconcile. [`TokenBucket::acquire`] waits
//! instead of failing; dropping the returned future (reconcile timeout or
//! controller shutdown) abandons the wait without consuming a token.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct BucketState {
    /// Current tokens available
    tokens: f64,
    /// Last time tokens were refilled
    last_refill: Instant,
}

/// Fixed-rate, fixed-burst token bucket
#[derive(Debug)]
pub struct TokenBucket {
    /// Tokens added per second
    rate: f64,
    /// Maximum tokens (burst size)
    capacity: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a bucket that starts full. A non-positive rate disables limiting.
    #[must_use]
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            rate: rate_per_sec,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Wait for one token. Returns how long the caller waited.
    pub async fn acquire(&self) -> Duration {
        if self.rate <= 0.0 {
            return Duration::ZERO;
        }

        let started = Instant::now();
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return started.elapsed();
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.rate)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Tokens currently available, after refilling
    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.last_refill = now;
    }
}
