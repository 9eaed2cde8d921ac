// src/ingest/mod.rs
pub mod config;
pub mod providers;
pub mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use regex::Regex;
use tokio::sync::Semaphore;

use crate::error::FetchError;
use crate::ingest::types::{FeedItem, FeedSource};
use crate::metrics::{ensure_metrics_described, FEED_ERRORS, FEED_ITEMS, FETCH_MS};

pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;

/// Normalize display text: decode entities, strip markup, fold typographic
/// quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” „ ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{201E}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (incl. nbsp)
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Lower-cased normalized text, the form all keyword roots are matched against.
pub fn fold_for_match(s: &str) -> String {
    normalize_text(s).to_lowercase()
}

/// Keep at most `max` chars.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Result of fetching every configured source once.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Items in source order; order within a source is the feed's.
    pub items: Vec<FeedItem>,
    /// (source name, error) for every source that failed.
    pub failures: Vec<(String, FetchError)>,
}

/// Fetch all sources with at most `concurrency` requests in flight. A failing
/// or slow source is logged and skipped; it never aborts the others.
pub async fn fetch_all(
    sources: &[Arc<dyn FeedSource>],
    concurrency: usize,
    timeout: Duration,
) -> FetchOutcome {
    ensure_metrics_described();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    let futures: Vec<_> = sources
        .iter()
        .map(|source| {
            let permit = semaphore.clone();
            let source = source.clone();
            async move {
                let _permit = permit.acquire().await;
                let name = source.name().to_string();
                let t0 = Instant::now();
                let res = match tokio::time::timeout(timeout, source.fetch_latest()).await {
                    Ok(res) => res,
                    Err(_) => Err(FetchError::Timeout {
                        source_name: name.clone(),
                        secs: timeout.as_secs(),
                    }),
                };
                histogram!(FETCH_MS).record(t0.elapsed().as_secs_f64() * 1_000.0);
                (name, res)
            }
        })
        .collect();

    let results = futures::future::join_all(futures).await;

    let mut out = FetchOutcome::default();
    for (name, res) in results {
        match res {
            Ok(mut items) => {
                tracing::debug!(target: "ingest", feed = %name, items = items.len(), "feed fetched");
                counter!(FEED_ITEMS).increment(items.len() as u64);
                out.items.append(&mut items);
            }
            Err(e) => {
                tracing::warn!(target: "ingest", feed = %name, error = %e, "feed skipped");
                counter!(FEED_ERRORS).increment(1);
                out.failures.push((name, e));
            }
        }
    }
    out
}
