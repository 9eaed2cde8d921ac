// src/metrics.rs
use std::path::Path;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const FEED_ITEMS: &str = "relay_feed_items_total";
pub const FEED_ERRORS: &str = "relay_feed_errors_total";
pub const FETCH_MS: &str = "relay_fetch_ms";
pub const REJECTED: &str = "relay_rejected_total";
pub const DUPLICATES: &str = "relay_duplicates_total";
pub const ACCEPTED: &str = "relay_accepted_total";
pub const CLASSIFICATION_ERRORS: &str = "relay_classification_errors_total";
pub const TRANSLATION_FALLBACKS: &str = "relay_translation_fallbacks_total";
pub const DELIVERED: &str = "relay_delivered_total";
pub const DELIVERY_ERRORS: &str = "relay_delivery_errors_total";
pub const LEDGER_ERRORS: &str = "relay_ledger_errors_total";
pub const LAST_RUN_TS: &str = "relay_last_run_ts";

/// One-time registration so series carry descriptions in the exposition.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(FEED_ITEMS, "Items parsed from feed sources.");
        describe_counter!(FEED_ERRORS, "Feed sources that failed to fetch or parse.");
        describe_histogram!(FETCH_MS, "Per-source fetch + parse time in milliseconds.");
        describe_counter!(REJECTED, "Items rejected, labelled by reason.");
        describe_counter!(DUPLICATES, "Items skipped because the ledger already had them.");
        describe_counter!(ACCEPTED, "Items accepted for delivery, labelled by admission class.");
        describe_counter!(
            CLASSIFICATION_ERRORS,
            "Classifier calls that failed or returned malformed data."
        );
        describe_counter!(
            TRANSLATION_FALLBACKS,
            "Translations that fell back to the original text."
        );
        describe_counter!(DELIVERED, "Messages accepted by the delivery sink.");
        describe_counter!(DELIVERY_ERRORS, "Messages the delivery sink refused.");
        describe_counter!(LEDGER_ERRORS, "Ledger reads or writes that failed.");
        describe_gauge!(LAST_RUN_TS, "Unix ts when the relay pipeline last finished.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Call once, from the binary.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Write the exposition text for a node-exporter textfile collector.
    /// Written via a temp file so the collector never reads half a file.
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let body = self.handle.render();
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, body)
            .with_context(|| format!("writing metrics to {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("moving metrics into {}", path.display()))?;
        Ok(())
    }
}
