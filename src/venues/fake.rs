//! Deterministic in-memory adapter.
//!
//! Used by `DataFacade` as the "all providers failed, but fakes are
//! permitted" fallback, and directly by tests that need reproducible
//! market data without a network dependency.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{HealthTracker, Interval, Ticker, Trade, VenueAdapter};
use crate::errors::ScanResult;
use crate::handle::ScanHandle;
use crate::types::{Health, MarketBar, OrderBookSnapshot, Symbol};

pub struct FakeAdapter {
    health: HealthTracker,
}

impl FakeAdapter {
    pub fn new() -> Self {
        Self {
            health: HealthTracker::new(),
        }
    }

    fn rng_for(symbol: &Symbol) -> ChaCha8Rng {
        let mut seed = [0u8; 32];
        for (i, byte) in symbol.canonical().bytes().enumerate() {
            seed[i % 32] ^= byte;
        }
        ChaCha8Rng::from_seed(seed)
    }
}

impl Default for FakeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VenueAdapter for FakeAdapter {
    fn name(&self) -> &str {
        "fake"
    }

    async fn get_order_book(
        &self,
        symbol: &Symbol,
        depth: usize,
        _handle: &ScanHandle,
    ) -> ScanResult<OrderBookSnapshot> {
        let mut rng = Self::rng_for(symbol);
        let mid = 100.0 + rng.gen_range(0.0..1000.0);
        let spread = mid * 0.0005;
        let mut bids = Vec::with_capacity(depth);
        let mut asks = Vec::with_capacity(depth);
        for i in 0..depth {
            let step = i as f64 * spread;
            bids.push((mid - spread / 2.0 - step, rng.gen_range(0.1..5.0)));
            asks.push((mid + spread / 2.0 + step, rng.gen_range(0.1..5.0)));
        }
        self.health.record_success();
        Ok(OrderBookSnapshot {
            bids,
            asks,
            seq: None,
            timestamp: Utc::now(),
        })
    }

    async fn get_trades(
        &self,
        symbol: &Symbol,
        n: usize,
        _handle: &ScanHandle,
    ) -> ScanResult<Vec<Trade>> {
        let mut rng = Self::rng_for(symbol);
        let base = 100.0 + rng.gen_range(0.0..1000.0);
        let trades = (0..n)
            .map(|i| Trade {
                price: base + rng.gen_range(-1.0..1.0),
                quantity: rng.gen_range(0.01..2.0),
                timestamp: Utc::now() - ChronoDuration::seconds(i as i64),
                buyer_maker: rng.gen_bool(0.5),
            })
            .collect();
        self.health.record_success();
        Ok(trades)
    }

    async fn get_klines(
        &self,
        symbol: &Symbol,
        interval: Interval,
        n: usize,
        _handle: &ScanHandle,
    ) -> ScanResult<Vec<MarketBar>> {
        let mut rng = Self::rng_for(symbol);
        let step = match interval {
            Interval::OneMinute => ChronoDuration::minutes(1),
            Interval::FiveMinutes => ChronoDuration::minutes(5),
            Interval::OneHour => ChronoDuration::hours(1),
            Interval::FourHours => ChronoDuration::hours(4),
            Interval::OneDay => ChronoDuration::days(1),
        };
        let mut price = 100.0 + rng.gen_range(0.0..1000.0);
        let now = Utc::now();
        let mut bars = Vec::with_capacity(n);
        for i in (0..n).rev() {
            let drift = rng.gen_range(-0.01..0.012);
            let open = price;
            price *= 1.0 + drift;
            let close = price;
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.004));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.004));
            let open_time = now - step * (i as i32 + 1);
            bars.push(MarketBar {
                open_time,
                close_time: open_time + step,
                open,
                high,
                low,
                close,
                volume: rng.gen_range(10.0..10_000.0),
            });
        }
        self.health.record_success();
        Ok(bars)
    }

    async fn get_ticker(&self, symbol: &Symbol, _handle: &ScanHandle) -> ScanResult<Ticker> {
        let mut rng = Self::rng_for(symbol);
        let mid = 100.0 + rng.gen_range(0.0..1000.0);
        self.health.record_success();
        Ok(Ticker {
            last: mid,
            bid: mid * 0.9995,
            ask: mid * 1.0005,
            volume_24h: rng.gen_range(1_000_000.0..50_000_000.0),
        })
    }

    fn health(&self) -> Health {
        self.health.health()
    }

    fn normalize_symbol(&self, symbol: &Symbol) -> String {
        symbol.canonical()
    }

    fn normalize_interval(&self, interval: Interval) -> String {
        match interval {
            Interval::OneMinute => "1m",
            Interval::FiveMinutes => "5m",
            Interval::OneHour => "1h",
            Interval::FourHours => "4h",
            Interval::OneDay => "1d",
        }
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_across_calls() {
        let adapter = FakeAdapter::new();
        let handle = ScanHandle::new();
        let symbol = Symbol::usd("BTC");
        let a = adapter.get_ticker(&symbol, &handle).await.unwrap();
        let b = adapter.get_ticker(&symbol, &handle).await.unwrap();
        assert_eq!(a.last, b.last);
    }
}
