//! `UniverseBuilder` — daily-rebuilt working symbol set.

use chrono::Utc;

use crate::config::UniverseConfig;
use crate::errors::{ScanError, ScanResult};
use crate::types::{Symbol, Universe};

/// Stablecoin bases excluded from the universe regardless of volume.
pub const STABLECOIN_BASES: &[&str] = &["USDT", "USDC", "DAI", "BUSD", "TUSD", "USDP", "GUSD", "FDUSD"];

/// One exchange-reported candidate pair before universe filtering.
#[derive(Debug, Clone)]
pub struct SymbolCandidate {
    pub symbol: Symbol,
    pub volume_usd: f64,
    pub history_days: u32,
    pub has_orderbook: bool,
}

pub struct UniverseBuilder;

impl UniverseBuilder {
    pub fn build_daily(candidates: &[SymbolCandidate], config: &UniverseConfig) -> ScanResult<Universe> {
        let mut symbols: Vec<Symbol> = candidates
            .iter()
            .filter(|c| !config.only_usd || c.symbol.quote == "USD")
            .filter(|c| c.volume_usd >= config.min_volume_usd)
            .filter(|c| c.history_days >= config.min_history_days)
            .filter(|c| !config.require_orderbook || c.has_orderbook)
            .filter(|c| !config.exclude_stablecoin_bases || !STABLECOIN_BASES.contains(&c.symbol.base.as_str()))
            .map(|c| c.symbol.clone())
            .collect();

        symbols.sort();
        symbols.dedup();

        if symbols.is_empty() {
            return Err(ScanError::Configuration("no-symbols-matched".to_string()));
        }

        Ok(Universe { built_at: Utc::now(), symbols })
    }
}
