//! `Scheduler` — owns the worker pool and cancellation handle, and wires
//! every stage (universe -> facade -> momentum -> orthogonalizer ->
//! regime -> scorer -> gates -> ranker -> artifacts) into the `Scan` /
//! `RunOnce` entry points.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::artifact::{AlertSummary, ArtifactEmitter};
use crate::config::Config;
use crate::errors::{ScanError, ScanResult};
use crate::facade::DataFacade;
use crate::gates::{self, GateEvaluator, GateInputs};
use crate::guard::circuit::CircuitConfig;
use crate::guard::rate_limiter::RateLimiterConfig;
use crate::guard::ProviderGuard;
use crate::handle::ScanHandle;
use crate::momentum::MomentumCalculator;
use crate::orthogonal::{Orthogonalizer, COL_MOMENTUM_CORE, COL_SOCIAL, COL_VOLATILITY, COL_VOLUME};
use crate::ranker::{CandidateRanker, ScoreInputs};
use crate::regime::{RegimeDetector, RegimeInputs};
use crate::types::{Candidate, GateReport, Regime, Symbol, Timeframe};
use crate::universe::{SymbolCandidate, UniverseBuilder};
use crate::venues::{BinanceAdapter, FakeAdapter, Interval, KrakenAdapter, VenueAdapter};

/// Wraps universe-building inputs plus the scan mode flags.
#[derive(Debug, Clone)]
pub struct ScanCriteria {
    pub candidates: Vec<SymbolCandidate>,
    pub enable_premove_gate: bool,
}

impl ScanCriteria {
    /// A small fixed set of majors, used when no exchange-metadata
    /// listing endpoint is wired in (none is specified by this pipeline;
    /// see DESIGN.md).
    pub fn default_majors() -> Self {
        let majors = ["BTC", "ETH", "SOL", "XRP", "ADA", "AVAX", "LINK", "DOGE"];
        Self {
            candidates: majors
                .iter()
                .map(|base| SymbolCandidate {
                    symbol: Symbol::usd(*base),
                    volume_usd: 50_000_000.0,
                    history_days: 365,
                    has_orderbook: true,
                })
                .collect(),
            enable_premove_gate: false,
        }
    }
}

/// Summary returned to the caller of `Scan`/`RunOnce`; mirrors what
/// `alerts.json`'s `alert_summary` holds.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub started_at: chrono::DateTime<Utc>,
    pub finished_at: chrono::DateTime<Utc>,
    pub universe_size: usize,
    pub candidates: Vec<Candidate>,
    pub dominant_regime: Regime,
    pub cancelled: bool,
    pub partial: bool,
    pub artifact_dir: Option<std::path::PathBuf>,
}

struct SymbolFactors {
    symbol: Symbol,
    raw: [f64; 4],
    momentum_4h: f64,
    gate_inputs: GateInputs,
}

pub struct Scheduler {
    config: Config,
    facade: Arc<DataFacade>,
    regime_detector: Arc<RegimeDetector>,
    gate_evaluator: Arc<GateEvaluator>,
    artifacts: Arc<ArtifactEmitter>,
}

impl Scheduler {
    pub fn new(config: Config) -> Self {
        let mut providers: Vec<ProviderGuard> = Vec::new();
        for venue in &config.venues {
            if !venue.enabled {
                continue;
            }
            let rate = RateLimiterConfig { sustained_rps: venue.rate_per_sec, burst: venue.burst };
            let circuit = CircuitConfig {
                failure_threshold: config.circuit.failure_threshold,
                rolling_window: config.circuit.rolling_window as usize,
                rolling_failure_ratio: config.circuit.rolling_failure_ratio,
                open_time: config.circuit.open_time,
            };
            let adapter: Arc<dyn VenueAdapter> = match venue.name.as_str() {
                "binance" => Arc::new(BinanceAdapter::new(venue.base_url.clone(), venue.timeout)),
                "kraken" => Arc::new(KrakenAdapter::new(venue.base_url.clone(), venue.timeout)),
                other => {
                    warn!(venue = other, "unrecognized venue name, skipping");
                    continue;
                }
            };
            providers.push(ProviderGuard::with_request_cache_ttl(adapter, rate, circuit, venue.request_cache_ttl));
        }

        let cache = crate::cache::LayeredCache::new(
            config.cache.hot_ttl,
            config.cache.warm_ttl,
            config.cache.cold_ttl,
        );

        let facade = Arc::new(DataFacade::new(
            providers,
            cache,
            config.cache.max_staleness,
            config.allow_fake_data,
            Arc::new(FakeAdapter::new()),
        ));

        spawn_cache_sweeper(facade.clone(), config.cache.sweep_interval);

        Self {
            regime_detector: Arc::new(RegimeDetector::new(config.regime.clone())),
            gate_evaluator: Arc::new(GateEvaluator::new(config.gates.clone())),
            artifacts: Arc::new(ArtifactEmitter::new(config.artifact_root.clone())),
            facade,
            config,
        }
    }

    pub async fn scan(&self, criteria: ScanCriteria) -> ScanResult<ScanReport> {
        self.run(criteria, &ScanHandle::new()).await
    }

    /// Same contract as `scan`, but enables the optional 2-of-3
    /// pre-movement gate regardless of `criteria.enable_premove_gate`.
    pub async fn run_once(&self, mut criteria: ScanCriteria) -> ScanResult<ScanReport> {
        criteria.enable_premove_gate = true;
        self.run(criteria, &ScanHandle::new()).await
    }

    async fn run(&self, criteria: ScanCriteria, handle: &ScanHandle) -> ScanResult<ScanReport> {
        let started_at = Utc::now();
        let universe = UniverseBuilder::build_daily(&criteria.candidates, &self.config.universe)?;
        info!(size = universe.symbols.len(), "universe built");

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.min(universe.symbols.len()).max(1)));
        let mut tasks = Vec::with_capacity(universe.symbols.len());

        for symbol in universe.symbols.clone() {
            let semaphore = semaphore.clone();
            let facade = self.facade.clone();
            let handle = handle.clone();
            let enable_premove = criteria.enable_premove_gate;

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.ok()?;
                gather_symbol_factors(&facade, &symbol, &handle, enable_premove).await
            }));
        }

        let mut gathered = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(Some(factors)) => gathered.push(factors),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "worker task panicked"),
            }
        }

        if handle.is_cancelled() {
            return Ok(ScanReport {
                started_at,
                finished_at: Utc::now(),
                universe_size: universe.symbols.len(),
                candidates: Vec::new(),
                dominant_regime: Regime::Choppy,
                cancelled: true,
                partial: true,
                artifact_dir: None,
            });
        }

        let realized_vol = stddev(&gathered.iter().map(|f| f.raw[COL_MOMENTUM_CORE]).collect::<Vec<_>>()) / 100.0;
        let breadth_above_ma = fraction(&gathered, |f| f.raw[COL_MOMENTUM_CORE] > 0.0);
        let breadth_thrust = fraction(&gathered, |f| f.momentum_4h > 0.0);

        let regime_decision = self.regime_detector.decide(RegimeInputs {
            realized_vol: realized_vol.clamp(0.0, 5.0),
            breadth_above_ma,
            breadth_thrust,
        });

        let raw_matrix: Vec<[f64; 4]> = gathered.iter().map(|f| f.raw).collect();
        let ortho = Orthogonalizer::run(&raw_matrix);

        let mut candidates = Vec::with_capacity(ortho.surviving_rows.len());
        for (row_idx, &orig_idx) in ortho.surviving_rows.iter().enumerate() {
            let factors = &gathered[orig_idx];
            let row = ortho.columns[row_idx];

            let gate_report: GateReport = self.gate_evaluator.evaluate(&factors.gate_inputs);

            let score_inputs = ScoreInputs {
                momentum_core: row[COL_MOMENTUM_CORE],
                volume_residual: row[COL_VOLUME],
                quality_residual: row[COL_VOLATILITY],
                social_residual: row[COL_SOCIAL],
                freshness_penalty: if gate_report.gates.iter().any(|g| g.name == "freshness" && !g.passed) { 10.0 } else { 0.0 },
                venue_health_penalty: 0.0,
            };
            let score = if gate_report.passed {
                CandidateRanker::score(&score_inputs, regime_decision.regime)
            } else {
                0.0
            };

            candidates.push(Candidate {
                symbol: factors.symbol.clone(),
                score,
                regime: regime_decision.regime,
                gate_report,
                momentum_4h: factors.momentum_4h,
            });
        }

        let ranked = CandidateRanker::rank(candidates);

        let artifact_dir = self.emit_artifacts(started_at, &ranked, regime_decision.regime)?;

        Ok(ScanReport {
            started_at,
            finished_at: Utc::now(),
            universe_size: universe.symbols.len(),
            candidates: ranked,
            dominant_regime: regime_decision.regime,
            cancelled: false,
            partial: false,
            artifact_dir: Some(artifact_dir),
        })
    }

    fn emit_artifacts(
        &self,
        started_at: chrono::DateTime<Utc>,
        candidates: &[Candidate],
        dominant_regime: Regime,
    ) -> ScanResult<std::path::PathBuf> {
        let dir = self.artifacts.run_directory(started_at)?;

        let high = candidates.iter().filter(|c| c.score >= 85.0 && c.gate_report.passed).count();
        let medium = candidates
            .iter()
            .filter(|c| c.score >= 75.0 && c.gate_report.gates.iter().filter(|g| g.passed).count() >= 2)
            .count();
        let low = candidates.len().saturating_sub(high + medium);
        let avg_score = if candidates.is_empty() {
            0.0
        } else {
            candidates.iter().map(|c| c.score).sum::<f64>() / candidates.len() as f64
        };

        let summary = AlertSummary {
            total: candidates.len(),
            high,
            medium,
            low,
            avg_score,
            dominant_regime: dominant_regime.to_string(),
        };

        self.artifacts.write_alerts(&dir, started_at, &summary, candidates)?;
        self.artifacts.write_explain(&dir, started_at, candidates)?;

        Ok(dir)
    }
}

/// Background eviction sweep for the layered cache, matching the
/// teacher's own 60s-interval sweeper tasks. Runs for the facade's
/// lifetime; the task exits once every `Arc<DataFacade>` clone (held by
/// the `Scheduler` and any in-flight calls) is dropped.
fn spawn_cache_sweeper(facade: Arc<DataFacade>, interval: std::time::Duration) {
    let facade = Arc::downgrade(&facade);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(facade) = facade.upgrade() else { break };
            facade.cache_sweep();
        }
    });
}

fn stddev(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 2 {
        return 0.0;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / finite.len() as f64;
    variance.sqrt()
}

fn fraction(items: &[SymbolFactors], pred: impl Fn(&SymbolFactors) -> bool) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    items.iter().filter(|f| pred(f)).count() as f64 / items.len() as f64
}

/// Fetches microstructure + per-timeframe bars for one symbol and derives
/// its raw [momentum_core, volume, social, volatility] row plus the
/// inputs the gate cascade needs.
///
/// Social has no wired real feed (§9); its raw value is deterministic
/// mock data seeded from the symbol, the same treatment the pre-move
/// gate's confirmation inputs receive.
async fn gather_symbol_factors(
    facade: &DataFacade,
    symbol: &Symbol,
    handle: &ScanHandle,
    enable_premove: bool,
) -> Option<SymbolFactors> {
    let microstructure = facade.get_microstructure(symbol, handle).await.ok()?;

    let mut bars_by_tf = BTreeMap::new();
    for tf in Timeframe::ALL {
        let interval = match tf {
            Timeframe::H1 => Interval::OneHour,
            Timeframe::H4 => Interval::FourHours,
            Timeframe::H12 => Interval::FourHours,
            Timeframe::H24 => Interval::OneDay,
            Timeframe::D7 => Interval::OneDay,
        };
        if let Ok(bars) = facade.get_regime_bars(symbol, interval, tf.min_bars(), handle).await {
            bars_by_tf.insert(tf, bars);
        }
    }

    let momentum = MomentumCalculator::compute(&bars_by_tf);
    // regime-weighted core is computed later once the regime decision is
    // known; the raw row here uses a regime-agnostic equal-weight proxy
    // so per-symbol gathering doesn't depend on the not-yet-decided regime.
    let momentum_core_raw = MomentumCalculator::momentum_core(&momentum, Regime::Choppy);

    let social_raw = gates::premove_mock(&symbol.canonical())
        .funding_divergence
        .then_some(5.0)
        .unwrap_or(-5.0);
    let volume_raw = (microstructure.adv_usd.max(1.0)).ln();
    let volatility_raw = momentum.atr_1h;

    let momentum_4h = *momentum.returns.get(&Timeframe::H4).unwrap_or(&f64::NAN);
    let momentum_1h = *momentum.returns.get(&Timeframe::H1).unwrap_or(&f64::NAN);

    let now = Utc::now().timestamp();
    let premove = enable_premove.then(|| gates::premove_mock(&symbol.canonical()));

    let gate_inputs = GateInputs {
        bars_age: momentum.bars_age,
        price_change_pct: momentum_1h,
        atr_1h: momentum.atr_1h,
        momentum_24h_pct: *momentum.returns.get(&Timeframe::H24).unwrap_or(&0.0),
        rsi_4h: momentum.rsi_4h,
        acceleration_pct: momentum_4h.abs(),
        signal_time_unix: now - 5,
        execution_time_unix: now,
        spread_bps: microstructure.spread_bps,
        depth_2pct_usd: Some(microstructure.depth_2pct_usd),
        vadr: Some(microstructure.vadr),
        adv_usd: Some(microstructure.adv_usd),
        premove,
    };

    Some(SymbolFactors {
        symbol: symbol.clone(),
        raw: [momentum_core_raw, volume_raw, social_raw, volatility_raw],
        momentum_4h,
        gate_inputs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scan_with_fake_data_produces_a_report() {
        let mut config = Config::from_env().unwrap();
        config.venues.clear(); // force fake-data fallback, no network calls
        config.artifact_root = tempfile::tempdir().unwrap().path().to_string_lossy().to_string();

        let scheduler = Scheduler::new(config);
        let report = scheduler.scan(ScanCriteria::default_majors()).await.unwrap();

        assert!(!report.cancelled);
        assert_eq!(report.universe_size, report.candidates.len());
        assert!(report.artifact_dir.unwrap().join("alerts.json").exists());
    }
}
