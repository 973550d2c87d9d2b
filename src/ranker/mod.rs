//! `CandidateRanker` — composite score, sort, and priority classification.

use crate::types::{Candidate, GateReport, Regime};

#[derive(Debug, Clone, Copy)]
pub struct RegimeWeights {
    pub core: f64,
    pub volume: f64,
    pub quality: f64,
    pub social_free: f64,
}

fn weights_for(regime: Regime) -> RegimeWeights {
    match regime {
        Regime::TrendingBull => RegimeWeights { core: 0.45, volume: 0.25, quality: 0.20, social_free: 0.10 },
        Regime::Choppy => RegimeWeights { core: 0.40, volume: 0.22, quality: 0.23, social_free: 0.15 },
        Regime::HighVol => RegimeWeights { core: 0.42, volume: 0.20, quality: 0.25, social_free: 0.13 },
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScoreInputs {
    pub momentum_core: f64,
    pub volume_residual: f64,
    pub quality_residual: f64,
    pub social_residual: f64,
    pub freshness_penalty: f64,
    pub venue_health_penalty: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        }
    }
}

pub struct CandidateRanker;

impl CandidateRanker {
    /// `score = clamp(core*w_core + vol*w_vol + qual*w_qual + min(social,10) - penalties, 0, 100)`.
    pub fn score(inputs: &ScoreInputs, regime: Regime) -> f64 {
        let w = weights_for(regime);
        let raw = inputs.momentum_core * w.core
            + inputs.volume_residual * w.volume
            + inputs.quality_residual * w.quality
            + inputs.social_residual.min(10.0)
            - inputs.freshness_penalty
            - inputs.venue_health_penalty;
        raw.clamp(0.0, 100.0)
    }

    pub fn priority(score: f64, gate_report: &GateReport) -> Priority {
        let gates_passed = gate_report.gates.iter().filter(|g| g.passed).count();
        if score >= 85.0 && gate_report.passed {
            Priority::High
        } else if score >= 75.0 && gates_passed >= 2 {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    /// Sorts by score desc, then 4h momentum desc, then symbol asc.
    pub fn rank(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.momentum_4h.partial_cmp(&a.momentum_4h).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.symbol.canonical().cmp(&b.symbol.canonical()))
        });
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GateResult, Symbol};

    fn passing_report() -> GateReport {
        GateReport {
            gates: vec![GateResult {
                name: "freshness".into(),
                passed: true,
                value: 0.0,
                threshold: 0.0,
                message: String::new(),
            }],
            passed: true,
            overall_reason: None,
        }
    }

    #[test]
    fn weights_sum_to_one_for_every_regime() {
        for regime in [Regime::TrendingBull, Regime::Choppy, Regime::HighVol] {
            let w = weights_for(regime);
            let sum = w.core + w.volume + w.quality + w.social_free;
            assert!((sum - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn score_clamps_to_range() {
        let inputs = ScoreInputs {
            momentum_core: 1000.0,
            volume_residual: 0.0,
            quality_residual: 0.0,
            social_residual: 0.0,
            freshness_penalty: 0.0,
            venue_health_penalty: 0.0,
        };
        assert_eq!(CandidateRanker::score(&inputs, Regime::TrendingBull), 100.0);
    }

    #[test]
    fn social_residual_capped_before_scoring() {
        let inputs = ScoreInputs {
            momentum_core: 0.0,
            volume_residual: 0.0,
            quality_residual: 0.0,
            social_residual: 999.0,
            freshness_penalty: 0.0,
            venue_health_penalty: 0.0,
        };
        assert_eq!(CandidateRanker::score(&inputs, Regime::Choppy), 10.0);
    }

    #[test]
    fn priority_high_requires_all_gates_passed() {
        let report = passing_report();
        assert_eq!(CandidateRanker::priority(90.0, &report), Priority::High);
    }

    #[test]
    fn rank_orders_by_score_then_momentum_then_symbol() {
        let candidates = vec![
            Candidate { symbol: Symbol::usd("ETH"), score: 80.0, regime: Regime::Choppy, gate_report: passing_report(), momentum_4h: 1.0 },
            Candidate { symbol: Symbol::usd("BTC"), score: 80.0, regime: Regime::Choppy, gate_report: passing_report(), momentum_4h: 2.0 },
            Candidate { symbol: Symbol::usd("SOL"), score: 90.0, regime: Regime::Choppy, gate_report: passing_report(), momentum_4h: 0.0 },
        ];
        let ranked = CandidateRanker::rank(candidates);
        assert_eq!(ranked[0].symbol.base, "SOL");
        assert_eq!(ranked[1].symbol.base, "BTC");
        assert_eq!(ranked[2].symbol.base, "ETH");
    }
}
