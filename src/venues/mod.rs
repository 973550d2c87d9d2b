//! Per-exchange client capability set.
//!
//! Modeled as a trait object rather than an inheritance hierarchy: variants
//! per exchange implement the same capability set and `DataFacade` holds a
//! `Vec<Arc<dyn VenueAdapter>>` in priority order (see SPEC_FULL.md §9).

pub mod binance;
pub mod fake;
pub mod kraken;

use crate::errors::ScanResult;
use crate::handle::ScanHandle;
use crate::types::{Health, MarketBar, OrderBookSnapshot, Symbol};
use async_trait::async_trait;

pub use binance::BinanceAdapter;
pub use fake::FakeAdapter;
pub use kraken::KrakenAdapter;

/// A single trade print.
#[derive(Debug, Clone, Copy)]
pub struct Trade {
    pub price: f64,
    pub quantity: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub buyer_maker: bool,
}

/// Best bid/ask + last price ticker.
#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    pub last: f64,
    pub bid: f64,
    pub ask: f64,
    pub volume_24h: f64,
}

/// Human-facing interval, normalized per-venue by `normalize_interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    OneMinute,
    FiveMinutes,
    OneHour,
    FourHours,
    OneDay,
}

/// Per-exchange market data capability set.
///
/// Implementors normalize symbols/intervals, parse responses into the
/// shared data model, and track per-call latency/error counters for
/// `health()`.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn get_order_book(
        &self,
        symbol: &Symbol,
        depth: usize,
        handle: &ScanHandle,
    ) -> ScanResult<OrderBookSnapshot>;

    async fn get_trades(
        &self,
        symbol: &Symbol,
        n: usize,
        handle: &ScanHandle,
    ) -> ScanResult<Vec<Trade>>;

    async fn get_klines(
        &self,
        symbol: &Symbol,
        interval: Interval,
        n: usize,
        handle: &ScanHandle,
    ) -> ScanResult<Vec<MarketBar>>;

    async fn get_ticker(&self, symbol: &Symbol, handle: &ScanHandle) -> ScanResult<Ticker>;

    /// Rolling health classification; see `HealthTracker` for the shared
    /// implementation every adapter delegates to.
    fn health(&self) -> Health;

    /// Maps a canonical symbol (`BTC/USD`) to the venue's own wire format.
    /// Unknown symbols pass through unchanged.
    fn normalize_symbol(&self, symbol: &Symbol) -> String;

    /// Maps a human interval to the venue's own unit.
    fn normalize_interval(&self, interval: Interval) -> String;
}

/// Rolling error-rate / idle-time health tracker shared by all adapters.
///
/// Thresholds: >10% error or >10 min idle => degraded; >50% error or >30
/// min idle => unhealthy.
pub struct HealthTracker {
    inner: parking_lot::RwLock<HealthInner>,
}

struct HealthInner {
    calls: u64,
    failures: u64,
    last_success: Option<std::time::Instant>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            inner: parking_lot::RwLock::new(HealthInner {
                calls: 0,
                failures: 0,
                last_success: None,
            }),
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.write();
        inner.calls += 1;
        inner.last_success = Some(std::time::Instant::now());
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.write();
        inner.calls += 1;
        inner.failures += 1;
    }

    pub fn health(&self) -> Health {
        let inner = self.inner.read();
        let error_rate = if inner.calls == 0 {
            0.0
        } else {
            inner.failures as f64 / inner.calls as f64
        };
        let idle = inner
            .last_success
            .map(|t| t.elapsed())
            .unwrap_or(std::time::Duration::from_secs(0));

        if error_rate > 0.50 || idle > std::time::Duration::from_secs(30 * 60) {
            Health::Unhealthy
        } else if error_rate > 0.10 || idle > std::time::Duration::from_secs(10 * 60) {
            Health::Degraded
        } else {
            Health::Healthy
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_starts_healthy() {
        let t = HealthTracker::new();
        assert_eq!(t.health(), Health::Healthy);
    }

    #[test]
    fn health_degrades_above_10pct_errors() {
        let t = HealthTracker::new();
        for _ in 0..9 {
            t.record_success();
        }
        t.record_failure();
        assert_eq!(t.health(), Health::Degraded);
    }

    #[test]
    fn health_unhealthy_above_50pct_errors() {
        let t = HealthTracker::new();
        t.record_success();
        for _ in 0..2 {
            t.record_failure();
        }
        assert_eq!(t.health(), Health::Unhealthy);
    }
}
