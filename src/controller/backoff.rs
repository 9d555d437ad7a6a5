//! # Exponential Backoff
//!
//! Per-target retry delays for failed reconciles.
//!
//! Sequence with the defaults: 1s, 2s, 4s, 8s ... capped at 5m. A successful
//! reconcile resets the sequence.
//!
//! ```rust
//! use std::time::Duration;
//! use vault_sync_controller::controller::backoff::ExponentialBackoff;
//!
//! let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(300));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
//! ```

use std::time::Duration;

/// Doubling backoff with an upper bound
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    start: Duration,
    current: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(start: Duration, max: Duration) -> Self {
        let start = start.min(max);
        Self {
            start,
            current: start,
            max,
        }
    }

    /// Current delay, then double it for next time
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        result
    }

    /// Back to the starting delay
    pub fn reset(&mut self) {
        self.current = self.start;
    }
}

/// Retry bookkeeping for one target
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: ExponentialBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(start: Duration, max: Duration) -> Self {
        Self {
            backoff: ExponentialBackoff::new(start, max),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}
