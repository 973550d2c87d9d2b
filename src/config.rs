//! Process configuration.
//!
//! YAML loading and CLI parsing are out of scope (see SPEC_FULL.md); this
//! mirrors the teacher's `models::Config::from_env` shape instead — a flat
//! struct assembled from environment variables with hard defaults.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct VenueConfig {
    pub name: String,
    pub base_url: String,
    pub enabled: bool,
    pub rate_per_sec: f64,
    pub burst: u32,
    pub timeout: Duration,
    pub request_cache_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub hot_ttl: Duration,
    pub warm_ttl: Duration,
    pub cold_ttl: Duration,
    pub max_staleness: Duration,
    pub remote_kv_addr: Option<String>,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hot_ttl: Duration::from_secs(30),
            warm_ttl: Duration::from_secs(5 * 60),
            cold_ttl: Duration::from_secs(60 * 60),
            max_staleness: Duration::from_secs(60),
            remote_kv_addr: None,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitConfig {
    pub failure_threshold: u32,
    pub rolling_window: u32,
    pub rolling_failure_ratio: f64,
    pub open_time: Duration,
    pub recovery_probes: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            rolling_window: 20,
            rolling_failure_ratio: 0.05,
            open_time: Duration::from_secs(60),
            recovery_probes: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegimeConfig {
    pub refresh_interval: Duration,
    pub trending_vol_max: f64,
    pub choppy_vol_max: f64,
    pub high_vol_min: f64,
    pub above_ma_min: f64,
    pub thrust_min: f64,
    pub history_len: usize,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(4 * 60 * 60),
            trending_vol_max: 0.30,
            choppy_vol_max: 0.50,
            high_vol_min: 0.50,
            above_ma_min: 0.60,
            thrust_min: 0.40,
            history_len: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub spread_bps_max: f64,
    pub depth_usd_min: f64,
    pub vadr_min: f64,
    pub adv_min: f64,
    pub bars_age_max: u32,
    pub atr_ratio_max: f64,
    pub fatigue_momentum: f64,
    pub fatigue_rsi: f64,
    pub fatigue_accel_override: f64,
    pub latefill_max_sec: i64,
    /// VADR floor used only by the pre-move gate's volume confirmation check.
    /// Kept distinct from `vadr_min` so the two thresholds never drift together.
    pub premove_vadr_min: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            spread_bps_max: 50.0,
            depth_usd_min: 100_000.0,
            vadr_min: 1.75,
            adv_min: 100_000.0,
            bars_age_max: 2,
            atr_ratio_max: 1.2,
            fatigue_momentum: 12.0,
            fatigue_rsi: 70.0,
            fatigue_accel_override: 2.0,
            latefill_max_sec: 30,
            premove_vadr_min: 1.8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UniverseConfig {
    pub only_usd: bool,
    pub min_volume_usd: f64,
    pub min_history_days: u32,
    pub require_orderbook: bool,
    pub exclude_stablecoin_bases: bool,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            only_usd: true,
            min_volume_usd: 1_000_000.0,
            min_history_days: 30,
            require_orderbook: true,
            exclude_stablecoin_bases: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub venues: Vec<VenueConfig>,
    pub cache: CacheConfig,
    pub circuit: CircuitConfig,
    pub regime: RegimeConfig,
    pub gates: GateConfig,
    pub universe: UniverseConfig,
    pub max_workers: usize,
    pub artifact_root: String,
    pub allow_fake_data: bool,
}

impl Config {
    /// Assemble configuration from environment variables, falling back to
    /// hard-coded defaults matching the configuration surface.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let max_workers = std::env::var("SCANNER_MAX_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(16);

        let artifact_root = std::env::var("SCANNER_ARTIFACT_ROOT")
            .unwrap_or_else(|_| "./artifacts".to_string());

        let allow_fake_data = std::env::var("SCANNER_ALLOW_FAKE_DATA")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        let binance_enabled = std::env::var("SCANNER_BINANCE_ENABLED")
            .map(|v| v != "0")
            .unwrap_or(true);
        let kraken_enabled = std::env::var("SCANNER_KRAKEN_ENABLED")
            .map(|v| v != "0")
            .unwrap_or(true);

        let venues = vec![
            VenueConfig {
                name: "binance".to_string(),
                base_url: std::env::var("SCANNER_BINANCE_BASE_URL")
                    .unwrap_or_else(|_| "https://api.binance.com".to_string()),
                enabled: binance_enabled,
                rate_per_sec: 10.0,
                burst: 20,
                timeout: Duration::from_secs(10),
                request_cache_ttl: Duration::from_secs(10),
            },
            VenueConfig {
                name: "kraken".to_string(),
                base_url: std::env::var("SCANNER_KRAKEN_BASE_URL")
                    .unwrap_or_else(|_| "https://api.kraken.com".to_string()),
                enabled: kraken_enabled,
                rate_per_sec: 5.0,
                burst: 10,
                timeout: Duration::from_secs(10),
                request_cache_ttl: Duration::from_secs(20),
            },
        ];

        Ok(Self {
            venues,
            cache: CacheConfig::default(),
            circuit: CircuitConfig::default(),
            regime: RegimeConfig::default(),
            gates: GateConfig::default(),
            universe: UniverseConfig::default(),
            max_workers,
            artifact_root,
            allow_fake_data,
        })
    }
}
