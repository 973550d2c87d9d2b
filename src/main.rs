//! Momentum scanner entry point.
//!
//! No CLI argument parsing: `Scan` runs with a default `ScanCriteria`
//! built from `Config::from_env()`, matching the out-of-scope CLI's
//! contract without actually parsing any arguments.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use momentum_scanner::{Config, ScanCriteria, Scheduler};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "momentum_scanner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env()?;
    info!(venues = config.venues.len(), max_workers = config.max_workers, "starting scan");

    let scheduler = Scheduler::new(config);
    let criteria = ScanCriteria::default_majors();

    match scheduler.scan(criteria).await {
        Ok(report) => {
            info!(
                universe_size = report.universe_size,
                candidates = report.candidates.len(),
                regime = %report.dominant_regime,
                "scan complete"
            );
            Ok(())
        }
        Err(err) => {
            tracing::error!(error = %err, "scan failed");
            std::process::exit(1);
        }
    }
}
