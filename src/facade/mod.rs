//! `DataFacade` — single entry point the scoring engine consumes.
//!
//! Owns the cache, the per-provider circuit-state snapshot, and the
//! provider registry (priority order). Cache -> healthy providers in
//! order -> deterministic fake fallback, matching `route_quality`'s
//! probe-then-fallback shape.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::warn;

use crate::cache::{key, LayeredCache, Tier};
use crate::errors::{ScanError, ScanResult};
use crate::guard::request_cache::RequestKey;
use crate::guard::ProviderGuard;
use crate::handle::ScanHandle;
use crate::types::{CircuitState, Health, MicrostructureMetrics, Symbol};
use crate::venues::{Interval, VenueAdapter};

/// Raw ingredients a facade call needs before `MicrostructureMetrics` can
/// be derived: best bid/ask plus trailing volume figures.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
struct MicrostructureRaw {
    spread_bps: f64,
    depth_2pct_usd: f64,
    vadr: f64,
    adv_usd: f64,
    venue_latency_p99_ms: f64,
}

impl From<MicrostructureRaw> for MicrostructureMetrics {
    fn from(raw: MicrostructureRaw) -> Self {
        MicrostructureMetrics {
            spread_bps: raw.spread_bps,
            depth_2pct_usd: raw.depth_2pct_usd,
            vadr: raw.vadr,
            adv_usd: raw.adv_usd,
            venue_latency_p99_ms: raw.venue_latency_p99_ms,
        }
    }
}

pub struct DataFacade {
    cache: LayeredCache,
    providers: Vec<ProviderGuard>,
    circuit_snapshot: RwLock<HashMap<String, CircuitState>>,
    max_staleness: Duration,
    allow_fake_data: bool,
    fake: Arc<dyn VenueAdapter>,
}

impl DataFacade {
    pub fn new(
        providers: Vec<ProviderGuard>,
        cache: LayeredCache,
        max_staleness: Duration,
        allow_fake_data: bool,
        fake: Arc<dyn VenueAdapter>,
    ) -> Self {
        let mut circuit_snapshot = HashMap::new();
        for p in &providers {
            circuit_snapshot.insert(p.name().to_string(), CircuitState::closed(p.name()));
        }
        Self {
            cache,
            providers,
            circuit_snapshot: RwLock::new(circuit_snapshot),
            max_staleness,
            allow_fake_data,
            fake,
        }
    }

    /// Snapshot of per-provider breaker state, for diagnostics/artifacts.
    pub fn circuit_states(&self) -> Vec<CircuitState> {
        self.circuit_snapshot.read().values().cloned().collect()
    }

    fn record_open(&self, provider: &str, is_open: bool) {
        let mut snapshot = self.circuit_snapshot.write();
        if let Some(state) = snapshot.get_mut(provider) {
            state.is_open = is_open;
        }
    }

    pub async fn get_microstructure(
        &self,
        symbol: &Symbol,
        handle: &ScanHandle,
    ) -> ScanResult<MicrostructureMetrics> {
        let cache_key = key("microstructure", &[&symbol.canonical()]);

        if let Some((raw, age)) = self.cache.get::<MicrostructureRaw>(Tier::Hot, &cache_key) {
            if age <= self.max_staleness {
                return Ok(raw.into());
            }
        }

        let mut provider_errors = Vec::new();
        // Snapshot the provider list under the lock before iterating,
        // matching the provider registry's copy-on-iterate contract.
        let providers: Vec<&ProviderGuard> = self.providers.iter().collect();

        for guard in providers {
            if guard.is_open() {
                self.record_open(guard.name(), true);
                continue;
            }
            if guard.adapter().health() == Health::Unhealthy {
                continue;
            }

            let request_key = RequestKey::new("GET", "book+trades", symbol.canonical());
            let result = guard
                .call(handle, request_key, || async {
                    let book = guard.adapter().get_order_book(symbol, 50, handle).await?;
                    let trades = guard.adapter().get_trades(symbol, 200, handle).await?;
                    derive_microstructure(&book, &trades)
                })
                .await;

            match result {
                Ok(raw) => {
                    self.record_open(guard.name(), false);
                    self.cache.set(Tier::Hot, cache_key, &raw);
                    return Ok(raw.into());
                }
                Err(err) => {
                    if matches!(err, ScanError::Cancelled) {
                        return Err(err);
                    }
                    self.record_open(guard.name(), guard.is_open());
                    provider_errors.push(format!("{}: {}", guard.name(), err));
                }
            }
        }

        if self.allow_fake_data {
            warn!(symbol = %symbol, "all providers failed, falling back to deterministic fake data");
            let book = self.fake.get_order_book(symbol, 50, handle).await?;
            let trades = self.fake.get_trades(symbol, 200, handle).await?;
            let raw = derive_microstructure(&book, &trades)?;
            self.cache.set(Tier::Warm, cache_key, &raw);
            return Ok(raw.into());
        }

        Err(ScanError::Transient(format!(
            "all providers failed for {symbol}: [{}]",
            provider_errors.join(", ")
        )))
    }

    /// Cache-first for all symbols, then fetch misses individually.
    /// Partial success is allowed: errors are returned alongside results.
    pub async fn get_microstructure_batch(
        &self,
        symbols: &[Symbol],
        handle: &ScanHandle,
    ) -> (HashMap<Symbol, MicrostructureMetrics>, Vec<(Symbol, ScanError)>) {
        let mut results = HashMap::new();
        let mut errors = Vec::new();

        for symbol in symbols {
            if handle.is_cancelled() {
                errors.push((symbol.clone(), ScanError::Cancelled));
                continue;
            }
            match self.get_microstructure(symbol, handle).await {
                Ok(metrics) => {
                    results.insert(symbol.clone(), metrics);
                }
                Err(err) => errors.push((symbol.clone(), err)),
            }
        }

        (results, errors)
    }

    /// Fetches recent 4h/1h klines for regime inputs, using the first
    /// healthy provider (falls back to fake data under the same policy
    /// as `get_microstructure`).
    pub async fn get_regime_bars(
        &self,
        symbol: &Symbol,
        interval: Interval,
        n: usize,
        handle: &ScanHandle,
    ) -> ScanResult<Vec<crate::types::MarketBar>> {
        let cache_key = key(
            "regime-bars",
            &[&symbol.canonical(), &format!("{interval:?}"), &n.to_string()],
        );

        if let Some((bars, age)) = self.cache.get::<Vec<crate::types::MarketBar>>(Tier::Warm, &cache_key) {
            if age <= self.max_staleness {
                return Ok(bars);
            }
        }

        for guard in &self.providers {
            if guard.is_open() || guard.adapter().health() == Health::Unhealthy {
                continue;
            }
            let adapter = guard.adapter().clone();
            let request_key = RequestKey::new(
                "GET",
                "klines",
                format!("{}|{:?}|{n}", symbol.canonical(), interval),
            );
            let result = guard.call(handle, request_key, || adapter.get_klines(symbol, interval, n, handle)).await;
            if let Ok(bars) = result {
                self.cache.set(Tier::Warm, cache_key, &bars);
                return Ok(bars);
            }
        }

        if self.allow_fake_data {
            let bars = self.fake.get_klines(symbol, interval, n, handle).await?;
            self.cache.set(Tier::Warm, cache_key, &bars);
            return Ok(bars);
        }

        Err(ScanError::Transient(format!("no klines available for {symbol}")))
    }

    pub fn cache_sweep(&self) {
        self.cache.sweep();
    }

    pub fn decided_at_now() -> chrono::DateTime<Utc> {
        Utc::now()
    }
}

fn derive_microstructure(
    book: &crate::types::OrderBookSnapshot,
    trades: &[crate::venues::Trade],
) -> ScanResult<MicrostructureRaw> {
    if !book.is_valid() {
        return Err(ScanError::DataIntegrity("invalid order book ordering".into()));
    }

    let mid = book.mid().ok_or_else(|| ScanError::DataIntegrity("no mid price".into()))?;
    let best_bid = book.best_bid().unwrap();
    let best_ask = book.best_ask().unwrap();
    let spread_bps = ((best_ask - best_bid) / mid) * 10_000.0;

    let band = mid * 0.02;
    let depth_2pct_usd: f64 = book
        .bids
        .iter()
        .filter(|(p, _)| *p >= mid - band)
        .map(|(p, q)| p * q)
        .sum::<f64>()
        + book
            .asks
            .iter()
            .filter(|(p, _)| *p <= mid + band)
            .map(|(p, q)| p * q)
            .sum::<f64>();

    let volume_sum: f64 = trades.iter().map(|t| t.quantity).sum();
    let adv_usd = volume_sum * mid;
    let recent_window = trades.len().min(20).max(1);
    let recent_volume: f64 = trades.iter().rev().take(recent_window).map(|t| t.quantity).sum();
    let avg_recent = recent_volume / recent_window as f64;
    let vadr = if avg_recent > 0.0 { volume_sum / avg_recent } else { f64::NAN };

    Ok(MicrostructureRaw {
        spread_bps,
        depth_2pct_usd,
        vadr,
        adv_usd,
        venue_latency_p99_ms: 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venues::FakeAdapter;

    #[tokio::test]
    async fn falls_back_to_fake_data_when_no_providers_configured() {
        let facade = DataFacade::new(
            vec![],
            LayeredCache::new(Duration::from_secs(30), Duration::from_secs(300), Duration::from_secs(3600)),
            Duration::from_secs(60),
            true,
            Arc::new(FakeAdapter::new()),
        );
        let handle = ScanHandle::new();
        let symbol = Symbol::usd("BTC");
        let metrics = facade.get_microstructure(&symbol, &handle).await.unwrap();
        assert!(metrics.spread_bps >= 0.0);
    }

    #[tokio::test]
    async fn errors_when_no_providers_and_fake_disallowed() {
        let facade = DataFacade::new(
            vec![],
            LayeredCache::new(Duration::from_secs(30), Duration::from_secs(300), Duration::from_secs(3600)),
            Duration::from_secs(60),
            false,
            Arc::new(FakeAdapter::new()),
        );
        let handle = ScanHandle::new();
        let symbol = Symbol::usd("BTC");
        let result = facade.get_microstructure(&symbol, &handle).await;
        assert!(result.is_err());
    }
}
