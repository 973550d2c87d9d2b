//! `RegimeDetector` — 4h-cadence majority vote over three market signals.
//!
//! Cache/refresh shape mirrors `route_quality::prober`'s periodic-refresh
//! pattern; the bounded history deque is the same `VecDeque` idiom used
//! by `signals::detector` for its rolling confidence window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;

use crate::config::RegimeConfig;
use crate::types::{Regime, RegimeDecision};

/// Inputs to the regime classifier for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct RegimeInputs {
    pub realized_vol: f64,
    pub breadth_above_ma: f64,
    pub breadth_thrust: f64,
}

pub struct RegimeDetector {
    config: RegimeConfig,
    cached: Mutex<Option<(RegimeDecision, Instant)>>,
    history: Mutex<VecDeque<RegimeDecision>>,
}

impl RegimeDetector {
    pub fn new(config: RegimeConfig) -> Self {
        Self {
            config,
            cached: Mutex::new(None),
            history: Mutex::new(VecDeque::with_capacity(config.history_len + 1)),
        }
    }

    /// Returns the cached decision if still fresh, else classifies from
    /// `inputs`, caches, and appends to history.
    pub fn decide(&self, inputs: RegimeInputs) -> RegimeDecision {
        if let Some((decision, decided)) = self.cached.lock().clone() {
            if decided.elapsed() < self.config.refresh_interval {
                return decision;
            }
        }

        let decision = classify(inputs, &self.config);
        *self.cached.lock() = Some((decision.clone(), Instant::now()));

        let mut history = self.history.lock();
        history.push_back(decision.clone());
        while history.len() > self.config.history_len {
            history.pop_front();
        }

        decision
    }

    /// Count of label flips between adjacent decisions across the
    /// retained history window.
    pub fn stability(&self) -> usize {
        let history = self.history.lock();
        history
            .iter()
            .zip(history.iter().skip(1))
            .filter(|(a, b)| a.regime != b.regime)
            .count()
    }
}

fn classify(inputs: RegimeInputs, config: &RegimeConfig) -> RegimeDecision {
    let RegimeInputs { realized_vol, breadth_above_ma, breadth_thrust } = inputs;

    let regime = if realized_vol >= config.high_vol_min {
        Regime::HighVol
    } else if realized_vol <= config.trending_vol_max
        && breadth_above_ma >= config.above_ma_min
        && breadth_thrust >= config.thrust_min
    {
        Regime::TrendingBull
    } else {
        Regime::Choppy
    };

    let confidence = mean_margin(regime, inputs, config).clamp(0.0, 1.0);

    RegimeDecision {
        regime,
        confidence,
        realized_vol,
        breadth_above_ma,
        breadth_thrust,
        decided_at: Utc::now(),
    }
}

/// Mean of normalized margins to the thresholds that decided `regime`.
fn mean_margin(regime: Regime, inputs: RegimeInputs, config: &RegimeConfig) -> f64 {
    match regime {
        Regime::HighVol => {
            let margin = (inputs.realized_vol - config.high_vol_min) / config.high_vol_min.max(1e-9);
            margin.max(0.0)
        }
        Regime::TrendingBull => {
            let vol_margin = (config.trending_vol_max - inputs.realized_vol) / config.trending_vol_max.max(1e-9);
            let breadth_margin = (inputs.breadth_above_ma - config.above_ma_min) / (1.0 - config.above_ma_min).max(1e-9);
            let thrust_margin = (inputs.breadth_thrust - config.thrust_min) / (1.0 - config.thrust_min).max(1e-9);
            (vol_margin.max(0.0) + breadth_margin.max(0.0) + thrust_margin.max(0.0)) / 3.0
        }
        Regime::Choppy => {
            // Distance from the nearest boundary of the choppy band; smaller
            // distance to trending/high-vol cutoffs means lower confidence.
            let vol_dist = (inputs.realized_vol - config.trending_vol_max).abs()
                .min((config.high_vol_min - inputs.realized_vol).abs());
            (vol_dist / config.choppy_vol_max.max(1e-9)).min(1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_vol_overrides_other_signals() {
        let detector = RegimeDetector::new(RegimeConfig::default());
        let decision = detector.decide(RegimeInputs {
            realized_vol: 0.60,
            breadth_above_ma: 0.90,
            breadth_thrust: 0.90,
        });
        assert_eq!(decision.regime, Regime::HighVol);
    }

    #[test]
    fn trending_bull_requires_all_three_conditions() {
        let detector = RegimeDetector::new(RegimeConfig::default());
        let decision = detector.decide(RegimeInputs {
            realized_vol: 0.20,
            breadth_above_ma: 0.70,
            breadth_thrust: 0.50,
        });
        assert_eq!(decision.regime, Regime::TrendingBull);
    }

    #[test]
    fn falls_back_to_choppy_otherwise() {
        let detector = RegimeDetector::new(RegimeConfig::default());
        let decision = detector.decide(RegimeInputs {
            realized_vol: 0.40,
            breadth_above_ma: 0.45,
            breadth_thrust: 0.25,
        });
        assert_eq!(decision.regime, Regime::Choppy);
    }

    #[test]
    fn decision_is_cached_within_refresh_interval() {
        let detector = RegimeDetector::new(RegimeConfig::default());
        let first = detector.decide(RegimeInputs {
            realized_vol: 0.60,
            breadth_above_ma: 0.90,
            breadth_thrust: 0.90,
        });
        let second = detector.decide(RegimeInputs {
            realized_vol: 0.10,
            breadth_above_ma: 0.10,
            breadth_thrust: 0.10,
        });
        assert_eq!(first.regime, second.regime);
    }

    #[test]
    fn stability_counts_flips_across_history() {
        let mut config = RegimeConfig::default();
        config.refresh_interval = Duration::from_millis(0);
        let detector = RegimeDetector::new(config);

        detector.decide(RegimeInputs { realized_vol: 0.60, breadth_above_ma: 0.9, breadth_thrust: 0.9 });
        std::thread::sleep(Duration::from_millis(2));
        detector.decide(RegimeInputs { realized_vol: 0.20, breadth_above_ma: 0.7, breadth_thrust: 0.5 });
        std::thread::sleep(Duration::from_millis(2));
        detector.decide(RegimeInputs { realized_vol: 0.60, breadth_above_ma: 0.9, breadth_thrust: 0.9 });

        assert_eq!(detector.stability(), 2);
    }
}
