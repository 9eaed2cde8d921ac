//! Slavic news relay: batch entrypoint.
//! Fetches every configured feed once, filters, dedups, classifies and
//! delivers, then exits. Schedule it with cron or a systemd timer.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use slavic_news_relay::metrics::Metrics;
use slavic_news_relay::RelayConfig;

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .is_some_and(|v| matches!(v.trim(), "1" | "true" | "yes"))
}

/// RUST_LOG filter (default `info`); JSON lines when RELAY_LOG_JSON=1.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if env_flag("RELAY_LOG_JSON") {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let metrics = Metrics::init()?;
    let cfg = RelayConfig::load_default().context("loading relay config")?;
    let dry_run = env_flag("RELAY_DRY_RUN");

    let sources = cfg.feed_sources()?;
    let pipeline = cfg.pipeline(dry_run)?;
    info!(
        target: "pipeline",
        feeds = sources.len(),
        dry_run,
        threshold = cfg.classification.threshold,
        ledger = %cfg.ledger.path.display(),
        "relay starting"
    );

    let report = pipeline
        .run_once(&sources, cfg.fetch.concurrency, cfg.fetch_timeout())
        .await;

    if let Ok(p) = std::env::var("RELAY_METRICS_TEXTFILE") {
        let path = PathBuf::from(p);
        if let Err(e) = metrics.write_textfile(&path) {
            warn!(error = %e, path = %path.display(), "metrics textfile not written");
        }
    }

    if report.delivery_failures > 0 {
        warn!(target: "pipeline", failures = report.delivery_failures, "some deliveries failed; they will be retried next run");
    }
    Ok(())
}
