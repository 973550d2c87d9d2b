//! `ProviderGuard` — wraps one `VenueAdapter` with rate limiting, a circuit
//! breaker, and a single-flight request cache.

pub mod circuit;
pub mod rate_limiter;
pub mod request_cache;

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::errors::{ScanError, ScanResult};
use crate::handle::ScanHandle;
use crate::venues::VenueAdapter;
use circuit::{Admission, CircuitBreaker, CircuitConfig};
use rate_limiter::{RateLimiter, RateLimiterConfig};
use request_cache::{BeginOutcome, RequestCache, RequestKey};

/// Exponential backoff with jitter for retrying transient failures.
/// Base 100ms, factor 2, cap 2s, up to N attempts; jitter uniform in
/// `[0, 10%*backoff]`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub factor: f64,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            factor: 2.0,
            cap: Duration::from_secs(2),
            max_attempts: 2,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let scaled = self.base.as_secs_f64() * self.factor.powi(attempt as i32);
        let capped = scaled.min(self.cap.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(0.0..(capped * 0.10));
        Duration::from_secs_f64(capped + jitter)
    }
}

/// Wraps one `VenueAdapter` with rate limiting and a circuit breaker.
/// Generic over the call's result type so it can guard any of the
/// adapter's four operations uniformly.
pub struct ProviderGuard {
    adapter: Arc<dyn VenueAdapter>,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    request_cache: RequestCache,
}

impl ProviderGuard {
    pub fn new(adapter: Arc<dyn VenueAdapter>, rate: RateLimiterConfig, circuit: CircuitConfig) -> Self {
        Self::with_request_cache_ttl(adapter, rate, circuit, Duration::from_secs(10))
    }

    pub fn with_request_cache_ttl(
        adapter: Arc<dyn VenueAdapter>,
        rate: RateLimiterConfig,
        circuit: CircuitConfig,
        request_cache_ttl: Duration,
    ) -> Self {
        let name = adapter.name().to_string();
        Self {
            adapter,
            limiter: RateLimiter::new(rate),
            breaker: CircuitBreaker::new(name, circuit),
            retry: RetryPolicy::default(),
            request_cache: RequestCache::new(request_cache_ttl),
        }
    }

    pub fn adapter(&self) -> &Arc<dyn VenueAdapter> {
        &self.adapter
    }

    pub fn is_open(&self) -> bool {
        self.breaker.is_open()
    }

    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    /// Runs `op` under the guard: admission control, rate limiting, retry
    /// with backoff on transient failure, breaker bookkeeping, and
    /// single-flight de-duplication against identical in-flight/cached
    /// calls for `key`.
    pub async fn call<T, F, Fut>(&self, handle: &ScanHandle, key: RequestKey, op: F) -> ScanResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ScanResult<T>>,
    {
        if let Some(cached) = self.request_cache.get::<T>(&key) {
            return Ok(cached);
        }

        loop {
            match self.request_cache.begin::<T>(&key) {
                BeginOutcome::Lead => {
                    let result = self.call_uncached(handle, &op).await;
                    match &result {
                        Ok(value) => self.request_cache.complete(&key, value.clone()),
                        Err(_) => self.request_cache.abandon(&key),
                    }
                    return result;
                }
                BeginOutcome::Join(mut rx) => {
                    if let Some(value) = rx.recv().await {
                        return Ok(value);
                    }
                    // leader errored or was dropped without completing; retry
                    // as the new leader rather than propagating a stale failure.
                    continue;
                }
            }
        }
    }

    async fn call_uncached<T, F, Fut>(&self, handle: &ScanHandle, op: &F) -> ScanResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ScanResult<T>>,
    {
        let admission = self.breaker.admission();
        if admission == Admission::Rejected {
            return Err(ScanError::Guarded(format!("{} circuit open", self.name())));
        }

        let mut attempt = 0;
        loop {
            if handle.is_cancelled() {
                return Err(ScanError::Cancelled);
            }

            if !self.limiter.acquire(handle).await {
                return Err(ScanError::Cancelled);
            }

            match op().await {
                Ok(value) => {
                    self.breaker.record_success();
                    return Ok(value);
                }
                Err(err) => {
                    self.breaker.record_failure();
                    if !err.is_routable() || attempt + 1 >= self.retry.max_attempts {
                        return Err(err);
                    }
                    let delay = self.retry.backoff(attempt);
                    debug!(provider = self.name(), attempt, ?delay, "retrying after transient failure");
                    tokio::select! {
                        biased;
                        _ = handle.cancelled() => return Err(ScanError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venues::FakeAdapter;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn guarded_when_circuit_open() {
        let guard = ProviderGuard::new(
            Arc::new(FakeAdapter::new()),
            RateLimiterConfig {
                sustained_rps: 1000.0,
                burst: 1000,
            },
            CircuitConfig {
                failure_threshold: 1,
                ..CircuitConfig::default()
            },
        );
        let handle = ScanHandle::new();

        let result: ScanResult<()> = guard
            .call(&handle, RequestKey::new("GET", "test", "1"), || async {
                Err(ScanError::Transient("boom".into()))
            })
            .await;
        assert!(result.is_err());

        let result: ScanResult<()> = guard
            .call(&handle, RequestKey::new("GET", "test", "2"), || async { Ok(()) })
            .await;
        assert!(matches!(result, Err(ScanError::Guarded(_))));
    }

    #[tokio::test]
    async fn retries_transient_before_giving_up() {
        let guard = ProviderGuard::new(
            Arc::new(FakeAdapter::new()),
            RateLimiterConfig {
                sustained_rps: 1000.0,
                burst: 1000,
            },
            CircuitConfig::default(),
        );
        let handle = ScanHandle::new();
        let calls = AtomicU32::new(0);

        let result: ScanResult<()> = guard
            .call(&handle, RequestKey::new("GET", "test", "1"), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ScanError::Transient("boom".into())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let guard = ProviderGuard::new(
            Arc::new(FakeAdapter::new()),
            RateLimiterConfig {
                sustained_rps: 1000.0,
                burst: 1000,
            },
            CircuitConfig::default(),
        );
        let handle = ScanHandle::new();
        let calls = AtomicU32::new(0);

        let result: ScanResult<()> = guard
            .call(&handle, RequestKey::new("GET", "test", "1"), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ScanError::Permanent("bad schema".into())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn identical_concurrent_calls_are_single_flighted() {
        let guard = Arc::new(ProviderGuard::new(
            Arc::new(FakeAdapter::new()),
            RateLimiterConfig {
                sustained_rps: 1000.0,
                burst: 1000,
            },
            CircuitConfig::default(),
        ));
        let handle = ScanHandle::new();
        let calls = Arc::new(AtomicU32::new(0));
        let key = RequestKey::new("GET", "klines", "BTCUSD|1h");

        let mut joins = Vec::new();
        for _ in 0..5 {
            let guard = guard.clone();
            let handle = handle.clone();
            let calls = calls.clone();
            let key = key.clone();
            joins.push(tokio::spawn(async move {
                guard
                    .call(&handle, key, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<u32, ScanError>(7)
                        }
                    })
                    .await
            }));
        }

        for join in joins {
            assert_eq!(join.await.unwrap().unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_call_within_ttl_hits_cache_without_rerunning_op() {
        let guard = ProviderGuard::new(
            Arc::new(FakeAdapter::new()),
            RateLimiterConfig {
                sustained_rps: 1000.0,
                burst: 1000,
            },
            CircuitConfig::default(),
        );
        let handle = ScanHandle::new();
        let calls = AtomicU32::new(0);
        let key = RequestKey::new("GET", "klines", "ETHUSD|1h");

        for _ in 0..3 {
            let result: ScanResult<u32> = guard
                .call(&handle, key.clone(), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(7) }
                })
                .await;
            assert_eq!(result.unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
