//! `MomentumCalculator` — per-timeframe returns, RSI(14), ATR(14), VADR,
//! and regime-weighted momentum core.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::types::{MarketBar, MomentumFactors, Regime, Timeframe};

/// Regime -> per-timeframe weight table (§4.6). Rows sum to 1.0.
fn weights_for(regime: Regime) -> BTreeMap<Timeframe, f64> {
    let rows: [(Timeframe, f64); 5] = match regime {
        Regime::TrendingBull => [
            (Timeframe::H1, 0.20),
            (Timeframe::H4, 0.35),
            (Timeframe::H12, 0.30),
            (Timeframe::H24, 0.15),
            (Timeframe::D7, 0.00),
        ],
        Regime::Choppy => [
            (Timeframe::H1, 0.15),
            (Timeframe::H4, 0.25),
            (Timeframe::H12, 0.35),
            (Timeframe::H24, 0.20),
            (Timeframe::D7, 0.05),
        ],
        Regime::HighVol => [
            (Timeframe::H1, 0.30),
            (Timeframe::H4, 0.25),
            (Timeframe::H12, 0.25),
            (Timeframe::H24, 0.15),
            (Timeframe::D7, 0.05),
        ],
    };
    rows.into_iter().collect()
}

/// Percent change of last close vs first close in `bars`; NaN if fewer
/// than two bars.
fn simple_return(bars: &[MarketBar]) -> f64 {
    if bars.len() < 2 {
        return f64::NAN;
    }
    let first = bars.first().unwrap().close;
    let last = bars.last().unwrap().close;
    if first == 0.0 {
        return f64::NAN;
    }
    (last - first) / first * 100.0
}

/// Wilder's RSI(14) over `bars`; NaN if fewer than 15 bars.
fn rsi_14(bars: &[MarketBar]) -> f64 {
    if bars.len() < 15 {
        return f64::NAN;
    }
    let window = &bars[bars.len() - 15..];
    let mut gains = 0.0;
    let mut losses = 0.0;
    for pair in window.windows(2) {
        let change = pair[1].close - pair[0].close;
        if change >= 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }
    let avg_gain = gains / 14.0;
    let avg_loss = losses / 14.0;
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// ATR(14) over `bars`; NaN if fewer than 15 bars.
fn atr_14(bars: &[MarketBar]) -> f64 {
    if bars.len() < 15 {
        return f64::NAN;
    }
    let window = &bars[bars.len() - 15..];
    let mut sum_tr = 0.0;
    for pair in window.windows(2) {
        let (prev, cur) = (pair[0], pair[1]);
        let tr = (cur.high - cur.low)
            .max((cur.high - prev.close).abs())
            .max((cur.low - prev.close).abs());
        sum_tr += tr;
    }
    sum_tr / 14.0
}

/// `last_volume / mean(last 20 volumes)`; NaN if fewer than 20 bars.
fn vadr(bars: &[MarketBar]) -> f64 {
    if bars.len() < 20 {
        return f64::NAN;
    }
    let window = &bars[bars.len() - 20..];
    let mean: f64 = window.iter().map(|b| b.volume).sum::<f64>() / 20.0;
    if mean == 0.0 {
        return f64::NAN;
    }
    window.last().unwrap().volume / mean
}

/// How many whole 1h bars behind "now" the latest bar's close sits.
/// Freshly polled REST data is usually 0-1; a stale cache hit or a
/// lagging venue pushes this up, which is exactly what the freshness
/// gate checks.
fn staleness_in_bars(bars: &[MarketBar]) -> u32 {
    let Some(last) = bars.last() else { return u32::MAX };
    let elapsed = (Utc::now() - last.close_time).num_seconds().max(0);
    (elapsed / 3600) as u32
}

pub struct MomentumCalculator;

impl MomentumCalculator {
    /// Computes returns/RSI/ATR/VADR from a per-timeframe bar map. Each
    /// timeframe's bar slice must already satisfy its `min_bars()` intake
    /// at the caller (the facade); fewer bars yields NaN per-metric, not
    /// an error.
    pub fn compute(bars_by_timeframe: &BTreeMap<Timeframe, Vec<MarketBar>>) -> MomentumFactors {
        let mut returns = BTreeMap::new();
        for tf in Timeframe::ALL {
            let r = bars_by_timeframe
                .get(&tf)
                .map(|bars| simple_return(bars))
                .unwrap_or(f64::NAN);
            returns.insert(tf, r);
        }

        let h4_bars = bars_by_timeframe.get(&Timeframe::H4).map(Vec::as_slice).unwrap_or(&[]);
        let h1_bars = bars_by_timeframe.get(&Timeframe::H1).map(Vec::as_slice).unwrap_or(&[]);

        let rsi_4h = rsi_14(h4_bars);
        let atr_1h = atr_14(h1_bars);
        let vadr_value = vadr(h1_bars);
        let bars_age = staleness_in_bars(h1_bars);

        MomentumFactors {
            returns,
            rsi_4h,
            atr_1h,
            vadr: vadr_value,
            bars_age,
        }
    }

    /// Weighted momentum core for `regime`. NaN timeframes contribute
    /// zero with proportional renormalization of the remaining weights;
    /// if every timeframe is NaN, the result is NaN.
    pub fn momentum_core(factors: &MomentumFactors, regime: Regime) -> f64 {
        let weights = weights_for(regime);
        let present_weight: f64 = Timeframe::ALL
            .iter()
            .filter(|tf| factors.returns.get(tf).map(|r| !r.is_nan()).unwrap_or(false))
            .map(|tf| weights[tf])
            .sum();

        if present_weight <= 0.0 {
            return f64::NAN;
        }

        Timeframe::ALL
            .iter()
            .filter_map(|tf| {
                let r = *factors.returns.get(tf)?;
                if r.is_nan() {
                    None
                } else {
                    Some(r * (weights[tf] / present_weight))
                }
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bar(close: f64, volume: f64) -> MarketBar {
        MarketBar {
            open_time: Utc::now(),
            close_time: Utc::now(),
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }

    #[test]
    fn simple_return_needs_two_bars() {
        assert!(simple_return(&[bar(100.0, 1.0)]).is_nan());
        assert_eq!(simple_return(&[bar(100.0, 1.0), bar(110.0, 1.0)]), 10.0);
    }

    #[test]
    fn vadr_needs_twenty_bars() {
        let few: Vec<_> = (0..10).map(|_| bar(1.0, 1.0)).collect();
        assert!(vadr(&few).is_nan());

        let mut many: Vec<_> = (0..19).map(|_| bar(1.0, 1.0)).collect();
        many.push(bar(1.0, 3.0));
        assert_eq!(vadr(&many), 3.0);
    }

    #[test]
    fn weights_sum_to_one_for_every_regime() {
        for regime in [Regime::TrendingBull, Regime::Choppy, Regime::HighVol] {
            let sum: f64 = weights_for(regime).values().sum();
            assert!((sum - 1.0).abs() < 1e-6, "{regime} weights sum to {sum}");
        }
    }

    #[test]
    fn momentum_core_renormalizes_around_nan_timeframes() {
        let mut returns = BTreeMap::new();
        returns.insert(Timeframe::H1, 10.0);
        returns.insert(Timeframe::H4, f64::NAN);
        returns.insert(Timeframe::H12, 5.0);
        returns.insert(Timeframe::H24, 0.0);
        returns.insert(Timeframe::D7, 0.0);
        let factors = MomentumFactors { returns, rsi_4h: 50.0, atr_1h: 1.0, vadr: 1.0, bars_age: 0 };

        let core = MomentumCalculator::momentum_core(&factors, Regime::TrendingBull);
        assert!(core.is_finite());
    }

    #[test]
    fn momentum_core_is_nan_when_all_timeframes_nan() {
        let returns: BTreeMap<Timeframe, f64> = Timeframe::ALL.iter().map(|tf| (*tf, f64::NAN)).collect();
        let factors = MomentumFactors { returns, rsi_4h: f64::NAN, atr_1h: f64::NAN, vadr: f64::NAN, bars_age: 0 };
        assert!(MomentumCalculator::momentum_core(&factors, Regime::Choppy).is_nan());
    }
}
