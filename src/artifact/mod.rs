//! `ArtifactEmitter` — atomic JSON artifact writes (temp file + rename).
//!
//! No fsync call is available portably through `std::fs` without
//! platform-specific code; the teacher's own atomic-write sites rely on
//! rename alone, so this matches that rather than reaching for a crate.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::json;

use crate::errors::{ScanError, ScanResult};
use crate::types::Candidate;

/// Removes `path` on drop unless `disarm()` was called — guards against
/// leaving a stray `.tmp` file behind on an error path.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Writes `bytes` to `path` atomically: write to `path.tmp`, then rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> ScanResult<()> {
    let tmp_path = path.with_extension("tmp");
    let mut guard = TempFileGuard::new(tmp_path.clone());

    std::fs::write(&tmp_path, bytes)
        .map_err(|e| ScanError::DataIntegrity(format!("write {}: {e}", tmp_path.display())))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| ScanError::DataIntegrity(format!("rename {}: {e}", tmp_path.display())))?;

    guard.disarm();
    Ok(())
}

pub struct ArtifactEmitter {
    root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AlertSummary {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub avg_score: f64,
    pub dominant_regime: String,
}

impl ArtifactEmitter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates `<root>/<YYYYMMDD_HHMMSS>/`, disambiguated with a short
    /// random suffix if the directory already exists (two scans starting
    /// in the same second).
    pub fn run_directory(&self, started_at: DateTime<Utc>) -> ScanResult<PathBuf> {
        let base_name = started_at.format("%Y%m%d_%H%M%S").to_string();
        let mut candidate = self.root.join(&base_name);

        if candidate.exists() {
            let suffix: u32 = rand::thread_rng().gen_range(1000..9999);
            candidate = self.root.join(format!("{base_name}-{suffix}"));
        }

        std::fs::create_dir_all(&candidate)
            .map_err(|e| ScanError::DataIntegrity(format!("create_dir_all {}: {e}", candidate.display())))?;
        Ok(candidate)
    }

    pub fn write_alerts(
        &self,
        dir: &Path,
        started_at: DateTime<Utc>,
        summary: &AlertSummary,
        candidates: &[Candidate],
    ) -> ScanResult<PathBuf> {
        let alerts: Vec<_> = candidates
            .iter()
            .map(|c| {
                let priority = crate::ranker::CandidateRanker::priority(c.score, &c.gate_report);
                json!({
                    "symbol": c.symbol.canonical(),
                    "priority": priority.as_str(),
                    "score": c.score,
                    "gate_summary": c.gate_report.overall_reason,
                    "action": if c.gate_report.passed { "watch" } else { "skip" },
                })
            })
            .collect();

        let body = json!({
            "timestamp": started_at.to_rfc3339(),
            "alert_summary": {
                "total": summary.total,
                "high": summary.high,
                "medium": summary.medium,
                "low": summary.low,
                "avg_score": summary.avg_score,
                "dominant_regime": summary.dominant_regime,
            },
            "alerts": alerts,
            "gate_analysis": gate_analysis(candidates),
            "system_info": { "scanner": "momentum-scanner" },
        });

        let path = dir.join("alerts.json");
        write_atomic(&path, serde_json::to_vec_pretty(&body).unwrap().as_slice())?;
        Ok(path)
    }

    pub fn write_explain(
        &self,
        dir: &Path,
        started_at: DateTime<Utc>,
        candidates: &[Candidate],
    ) -> ScanResult<PathBuf> {
        let candidate_entries: Vec<_> = candidates
            .iter()
            .map(|c| {
                json!({
                    "symbol": c.symbol.canonical(),
                    "score": c.score,
                    "regime": c.regime.to_string(),
                    "momentum_4h": c.momentum_4h,
                    "gates": c.gate_report.gates,
                })
            })
            .collect();

        let body = json!({
            "metadata": { "generated_at": started_at.to_rfc3339() },
            "gate_system": { "cascade": ["freshness", "fatigue", "late-fill", "microstructure", "premove-2of3"] },
            "scoring_system": { "protected_factor": "momentum_core" },
            "candidates": candidate_entries,
            "summary_stats": { "count": candidates.len() },
        });

        let path = dir.join("explain.json");
        write_atomic(&path, serde_json::to_vec_pretty(&body).unwrap().as_slice())?;
        Ok(path)
    }

    /// Optional ad-hoc microstructure snapshot, written the same atomic way.
    pub fn write_snapshot<T: Serialize>(&self, dir: &Path, symbol: &str, epoch: i64, value: &T) -> ScanResult<PathBuf> {
        let path = dir.join(format!("snapshot-{symbol}-{epoch}.json"));
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| ScanError::DataIntegrity(format!("serialize snapshot: {e}")))?;
        write_atomic(&path, &bytes)?;
        Ok(path)
    }
}

fn gate_analysis(candidates: &[Candidate]) -> serde_json::Value {
    let mut counts = std::collections::HashMap::new();
    for c in candidates {
        for gate in &c.gate_report.gates {
            let entry = counts.entry(gate.name.clone()).or_insert((0, 0));
            if gate.passed {
                entry.0 += 1;
            } else {
                entry.1 += 1;
            }
        }
    }
    json!(counts
        .into_iter()
        .map(|(name, (passed, failed))| (name, json!({ "passed": passed, "failed": failed })))
        .collect::<std::collections::HashMap<_, _>>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GateReport, GateResult, Regime, Symbol};

    fn candidate() -> Candidate {
        Candidate {
            symbol: Symbol::usd("BTC"),
            score: 90.0,
            regime: Regime::TrendingBull,
            gate_report: GateReport {
                gates: vec![GateResult {
                    name: "freshness".into(),
                    passed: true,
                    value: 0.0,
                    threshold: 0.0,
                    message: String::new(),
                }],
                passed: true,
                overall_reason: None,
            },
            momentum_4h: 5.0,
        }
    }

    #[test]
    fn writes_alerts_and_explain_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = ArtifactEmitter::new(dir.path());
        let run_dir = emitter.run_directory(Utc::now()).unwrap();

        let summary = AlertSummary {
            total: 1,
            high: 1,
            medium: 0,
            low: 0,
            avg_score: 90.0,
            dominant_regime: "trending-bull".to_string(),
        };
        let candidates = vec![candidate()];

        let alerts_path = emitter.write_alerts(&run_dir, Utc::now(), &summary, &candidates).unwrap();
        let explain_path = emitter.write_explain(&run_dir, Utc::now(), &candidates).unwrap();

        assert!(alerts_path.exists());
        assert!(explain_path.exists());
        assert!(!alerts_path.with_extension("tmp").exists());
    }

    #[test]
    fn run_directory_disambiguates_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = ArtifactEmitter::new(dir.path());
        let now = Utc::now();
        let first = emitter.run_directory(now).unwrap();
        let second = emitter.run_directory(now).unwrap();
        assert_ne!(first, second);
    }
}
