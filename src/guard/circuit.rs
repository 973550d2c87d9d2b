//! Circuit breaker for one provider.
//!
//! State machine grounded on `route_quality::mitigation::CircuitBreaker`
//! (Closed/Open/HalfOpen), extended with the rolling-rate trip condition
//! and the single-probe half-open semantics this pipeline requires.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitConfig {
    pub failure_threshold: u32,
    pub rolling_window: usize,
    pub rolling_failure_ratio: f64,
    pub open_time: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            rolling_window: 20,
            rolling_failure_ratio: 0.05,
            open_time: Duration::from_secs(60),
        }
    }
}

pub struct CircuitBreaker {
    provider: String,
    config: CircuitConfig,
    inner: Mutex<Inner>,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    recent: VecDeque<bool>,
    opened_at: Option<Instant>,
    /// True while a half-open probe is outstanding; a second caller must not
    /// also be let through (single probe invariant).
    probe_in_flight: bool,
}

/// Whether a call may proceed, and whether it is the lone half-open probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    AllowedAsProbe,
    Rejected,
}

impl CircuitBreaker {
    pub fn new(provider: impl Into<String>, config: CircuitConfig) -> Self {
        Self {
            provider: provider.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                recent: VecDeque::with_capacity(32),
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.admission(), Admission::Rejected)
    }

    /// Whether a call may proceed right now, transitioning Open -> HalfOpen
    /// once `open_time` has elapsed.
    pub fn admission(&self) -> Admission {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Admission::Rejected
                } else {
                    inner.probe_in_flight = true;
                    Admission::AllowedAsProbe
                }
            }
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.open_time {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    info!(provider = %self.provider, "circuit entering half-open");
                    Admission::AllowedAsProbe
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.probe_in_flight = false;
        push_bounded(&mut inner.recent, true, self.config.rolling_window);
        if inner.state != CircuitState::Closed {
            info!(provider = %self.provider, "circuit closed after success");
        }
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        inner.probe_in_flight = false;
        push_bounded(&mut inner.recent, false, self.config.rolling_window);

        let rolling_trip = inner.recent.len() >= self.config.rolling_window
            && failure_ratio(&inner.recent) > self.config.rolling_failure_ratio;

        let should_trip = inner.consecutive_failures >= self.config.failure_threshold || rolling_trip;

        if should_trip && inner.state != CircuitState::Open {
            warn!(
                provider = %self.provider,
                consecutive = inner.consecutive_failures,
                "circuit tripped open"
            );
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        } else if inner.state == CircuitState::HalfOpen {
            // Half-open probe failed: re-open immediately.
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }
}

fn push_bounded(recent: &mut VecDeque<bool>, ok: bool, window: usize) {
    recent.push_back(ok);
    while recent.len() > window {
        recent.pop_front();
    }
}

fn failure_ratio(recent: &VecDeque<bool>) -> f64 {
    if recent.is_empty() {
        return 0.0;
    }
    let failures = recent.iter().filter(|ok| !**ok).count();
    failures as f64 / recent.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_consecutive_failures() {
        let breaker = CircuitBreaker::new("test", CircuitConfig::default());
        for _ in 0..3 {
            assert_eq!(breaker.admission(), Admission::Allowed);
            breaker.record_failure();
        }
        assert_eq!(breaker.admission(), Admission::Rejected);
    }

    #[test]
    fn half_open_allows_single_probe() {
        let breaker = CircuitBreaker::new(
            "test",
            CircuitConfig {
                open_time: Duration::from_millis(0),
                ..CircuitConfig::default()
            },
        );
        for _ in 0..3 {
            breaker.record_failure();
        }
        // open_time is zero, so the very next admission check flips to half-open.
        assert_eq!(breaker.admission(), Admission::AllowedAsProbe);
        assert_eq!(breaker.admission(), Admission::Rejected);
    }

    #[test]
    fn success_in_half_open_closes() {
        let breaker = CircuitBreaker::new(
            "test",
            CircuitConfig {
                open_time: Duration::from_millis(0),
                ..CircuitConfig::default()
            },
        );
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.admission(), Admission::AllowedAsProbe);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn failure_in_half_open_reopens() {
        let breaker = CircuitBreaker::new(
            "test",
            CircuitConfig {
                open_time: Duration::from_millis(0),
                ..CircuitConfig::default()
            },
        );
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.admission(), Admission::AllowedAsProbe);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn rolling_rate_trips_without_consecutive_run() {
        let breaker = CircuitBreaker::new(
            "test",
            CircuitConfig {
                failure_threshold: 100,
                rolling_window: 20,
                rolling_failure_ratio: 0.05,
                open_time: Duration::from_secs(60),
            },
        );
        for i in 0..20 {
            if i % 5 == 0 {
                breaker.record_failure();
            } else {
                breaker.record_success();
            }
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
