//! Token-bucket rate limiter.
//!
//! Grounded on `middleware::rate_limit::RateLimitLayer`'s window/lock
//! structure, adapted from a sliding-window HTTP middleware into an
//! async-blocking token bucket for outbound provider calls.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::handle::ScanHandle;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub sustained_rps: f64,
    pub burst: u32,
}

pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let capacity = config.burst as f64 + config.sustained_rps;
        Self {
            config,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn capacity(&self) -> f64 {
        self.config.burst as f64 + self.config.sustained_rps
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.config.sustained_rps).min(self.capacity());
        state.last_refill = now;
    }

    /// Blocks until a token is available or `handle` is cancelled.
    pub async fn acquire(&self, handle: &ScanHandle) -> bool {
        loop {
            if handle.is_cancelled() {
                return false;
            }

            let wait = {
                let mut state = self.state.lock();
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - state.tokens;
                    Some(Duration::from_secs_f64(deficit / self.config.sustained_rps.max(0.01)))
                }
            };

            match wait {
                None => return true,
                Some(duration) => {
                    let duration = duration.min(Duration::from_millis(250));
                    tokio::select! {
                        biased;
                        _ = handle.cancelled() => return false,
                        _ = tokio::time::sleep(duration) => {}
                    }
                }
            }
        }
    }

    /// Non-blocking check used by the guarded-error path: true if a token
    /// was available and consumed right now.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            warn!(rps = self.config.sustained_rps, "rate limiter exhausted");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_successes_per_window() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            sustained_rps: 5.0,
            burst: 2,
        });
        let mut successes = 0;
        for _ in 0..20 {
            if limiter.try_acquire() {
                successes += 1;
            }
        }
        // sustained_rps + burst is the ceiling for an immediate burst.
        assert!(successes <= 7);
    }

    #[tokio::test]
    async fn acquire_respects_cancellation() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            sustained_rps: 0.001,
            burst: 0,
        });
        let handle = ScanHandle::new();
        assert!(limiter.acquire(&handle).await);
        handle.cancel();
        assert!(!limiter.acquire(&handle).await);
    }
}
