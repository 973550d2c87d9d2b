//! Shared data model for the scanning pipeline.
//!
//! These mirror the entities of the data model: `Symbol`, `Universe`,
//! `MarketBar`, `OrderBookSnapshot`, `MicrostructureMetrics`,
//! `MomentumFactors`, `FactorSet`, `RegimeDecision`, `GateResult`,
//! `Candidate`, `CircuitState`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A tradable pair, always USD-quoted within the universe.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub base: String,
    pub quote: String,
}

impl Symbol {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    pub fn usd(base: impl Into<String>) -> Self {
        Self::new(base, "USD")
    }

    /// Canonical display form, e.g. `BTC/USD`.
    pub fn canonical(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// The daily-rebuilt working symbol set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Universe {
    pub built_at: DateTime<Utc>,
    pub symbols: Vec<Symbol>,
}

impl Universe {
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// One candle/bar of OHLCV market data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarketBar {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl MarketBar {
    /// True iff this bar satisfies the OHLC ordering invariants.
    pub fn is_valid(&self) -> bool {
        let max_oc = self.open.max(self.close);
        let min_oc = self.open.min(self.close);
        self.high >= max_oc.max(self.low)
            && self.low <= min_oc.min(self.high)
            && self.volume >= 0.0
    }
}

/// Bid/ask ladder snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    /// Descending by price.
    pub bids: Vec<(f64, f64)>,
    /// Ascending by price.
    pub asks: Vec<(f64, f64)>,
    pub seq: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl OrderBookSnapshot {
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|(p, _)| *p)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|(p, _)| *p)
    }

    pub fn mid(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some((b + a) / 2.0),
            _ => None,
        }
    }

    /// True iff best_bid < best_ask and all quantities are positive.
    pub fn is_valid(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) if b < a => {
                self.bids.iter().all(|(_, q)| *q > 0.0) && self.asks.iter().all(|(_, q)| *q > 0.0)
            }
            _ => false,
        }
    }
}

/// Derived liquidity/microstructure snapshot for one symbol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MicrostructureMetrics {
    pub spread_bps: f64,
    pub depth_2pct_usd: f64,
    pub vadr: f64,
    pub adv_usd: f64,
    pub venue_latency_p99_ms: f64,
}

/// Per-timeframe horizon used by the momentum calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    H1,
    H4,
    H12,
    H24,
    D7,
}

impl Timeframe {
    pub const ALL: [Timeframe; 5] = [
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::H12,
        Timeframe::H24,
        Timeframe::D7,
    ];

    /// Minimum bar count required to compute a return for this timeframe.
    pub fn min_bars(self) -> usize {
        match self {
            Timeframe::H1 => 24,
            Timeframe::H4 => 18,
            Timeframe::H12 => 14,
            Timeframe::H24 => 14,
            Timeframe::D7 => 12,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::H12 => "12h",
            Timeframe::H24 => "24h",
            Timeframe::D7 => "7d",
        };
        write!(f, "{s}")
    }
}

/// Returns, RSI, ATR and VADR computed for one symbol in one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumFactors {
    pub returns: BTreeMap<Timeframe, f64>,
    pub rsi_4h: f64,
    pub atr_1h: f64,
    pub vadr: f64,
    pub bars_age: u32,
}

/// Raw and orthogonalized factor columns for one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorSet {
    pub regime: Regime,
    pub momentum_core_raw: f64,
    pub momentum_core: f64,
    pub volume_raw: f64,
    pub volume_residual: f64,
    pub social_raw: f64,
    pub social_residual: f64,
    pub volatility_raw: f64,
    pub volatility_residual: f64,
    /// Pearson correlation matrix over the four raw columns, row-major 4x4.
    pub correlation_matrix: [[f64; 4]; 4],
}

/// Discrete market regime label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Regime {
    TrendingBull,
    Choppy,
    HighVol,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Regime::TrendingBull => "trending-bull",
            Regime::Choppy => "choppy",
            Regime::HighVol => "high-vol",
        };
        write!(f, "{s}")
    }
}

/// A regime classification decision with its supporting inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeDecision {
    pub regime: Regime,
    pub confidence: f64,
    pub realized_vol: f64,
    pub breadth_above_ma: f64,
    pub breadth_thrust: f64,
    pub decided_at: DateTime<Utc>,
}

/// Evidence + verdict for one gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub name: String,
    pub passed: bool,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
}

/// Full cascade result for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateReport {
    pub gates: Vec<GateResult>,
    pub passed: bool,
    pub overall_reason: Option<String>,
}

/// A scored, gated symbol ready for ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: Symbol,
    pub score: f64,
    pub regime: Regime,
    pub gate_report: GateReport,
    pub momentum_4h: f64,
}

/// Per-provider breaker state, process-lifetime.
#[derive(Debug, Clone)]
pub struct CircuitState {
    pub provider: String,
    pub is_open: bool,
    pub consecutive_failures: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl CircuitState {
    pub fn closed(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            is_open: false,
            consecutive_failures: 0,
            next_retry_at: None,
        }
    }
}

/// Adapter/provider health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Degraded,
    Unhealthy,
}
