//! End-to-end scan exercised with the fake venue fallback, no network.

use momentum_scanner::{Config, ScanCriteria, Scheduler};

#[tokio::test]
async fn scan_end_to_end_writes_artifacts() {
    let dir = tempfile::tempdir().unwrap();

    let mut config = Config::from_env().expect("config assembles from defaults");
    config.venues.clear();
    config.allow_fake_data = true;
    config.artifact_root = dir.path().to_string_lossy().to_string();

    let scheduler = Scheduler::new(config);
    let report = scheduler
        .scan(ScanCriteria::default_majors())
        .await
        .expect("scan succeeds against fake data");

    assert!(!report.cancelled);
    assert!(!report.partial);
    assert!(report.universe_size > 0);

    let artifact_dir = report.artifact_dir.expect("artifacts were written");
    assert!(artifact_dir.join("alerts.json").exists());
    assert!(artifact_dir.join("explain.json").exists());

    let alerts: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(artifact_dir.join("alerts.json")).unwrap()).unwrap();
    assert!(alerts.get("alert_summary").is_some());
}

#[tokio::test]
async fn run_once_enables_premove_gate() {
    let dir = tempfile::tempdir().unwrap();

    let mut config = Config::from_env().expect("config assembles from defaults");
    config.venues.clear();
    config.artifact_root = dir.path().to_string_lossy().to_string();

    let scheduler = Scheduler::new(config);
    let report = scheduler
        .run_once(ScanCriteria::default_majors())
        .await
        .expect("run_once succeeds against fake data");

    assert!(report.candidates.iter().any(|c| {
        c.gate_report.gates.iter().any(|g| g.name == "premove-2of3")
    }));
}
