// src/ingest/config.rs
//! `config/relay.toml` loader. The loaded value is immutable; components are
//! built from it once and receive their own slice of it.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::warn;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use std::{env, fs};

use crate::classify::zero_shot::{DisabledClassifier, HfZeroShotClassifier, TopicClassifier};
use crate::classify::{sanitize_threshold, ClassificationGate, LabelSpec, DEFAULT_THRESHOLD};
use crate::ingest::providers::rss::RssFeed;
use crate::ingest::types::FeedSource;
use crate::ingest::{DEFAULT_FETCH_CONCURRENCY, DEFAULT_FETCH_TIMEOUT_SECS};
use crate::ledger::{Ledger, DEFAULT_LEDGER_PATH, DEFAULT_TTL_SECS};
use crate::notify::discord::DiscordWebhook;
use crate::notify::stdout::StdoutSink;
use crate::notify::DeliverySink;
use crate::pipeline::Pipeline;
use crate::relevance::{KeywordRuleSet, LengthFloor, RelevanceFilter};
use crate::translate::{self, LibreTranslate, MyMemory, TranslationStrategy, TranslatorChain};

pub const ENV_CONFIG_PATH: &str = "RELAY_CONFIG_PATH";
pub const ENV_THRESHOLD: &str = "RELAY_CLASSIFY_THRESHOLD";
pub const ENV_HF_TOKEN: &str = "HF_API_TOKEN";
pub const ENV_WEBHOOK: &str = "DISCORD_WEBHOOK_URL";
pub const DEFAULT_CONFIG_PATH: &str = "config/relay.toml";
pub const DEFAULT_CLASSIFIER_ENDPOINT: &str =
    "https://api-inference.huggingface.co/models/facebook/bart-large-mnli";

fn default_timeout() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}
fn default_concurrency() -> usize {
    DEFAULT_FETCH_CONCURRENCY
}
fn default_env_marker() -> String {
    "ENV".to_string()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FeedConfig {
    /// "<Country> – <Outlet>", becomes the item's source name.
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_FETCH_CONCURRENCY,
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationFallback {
    #[default]
    MyMemory,
    None,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslationConfig {
    /// LibreTranslate-compatible servers, tried in order.
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub fallback: TranslationFallback,
    #[serde(default = "default_classify_language")]
    pub classify_language: String,
    /// Translate delivered titles into this language when set.
    #[serde(default)]
    pub delivery_language: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_classify_language() -> String {
    crate::classify::DEFAULT_CLASSIFY_LANGUAGE.to_string()
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            api_key: None,
            fallback: TranslationFallback::MyMemory,
            classify_language: default_classify_language(),
            delivery_language: None,
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_classifier_endpoint")]
    pub endpoint: String,
    /// "ENV" means: read from HF_API_TOKEN
    #[serde(default = "default_env_marker")]
    pub api_key: String,
    #[serde(default)]
    pub labels: Vec<LabelSpec>,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_classifier_endpoint() -> String {
    DEFAULT_CLASSIFIER_ENDPOINT.to_string()
}
fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_classifier_endpoint(),
            api_key: default_env_marker(),
            labels: Vec::new(),
            threshold: DEFAULT_THRESHOLD,
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// "ENV" (or empty) means: read from DISCORD_WEBHOOK_URL
    #[serde(default = "default_env_marker")]
    pub webhook_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            webhook_url: default_env_marker(),
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from(DEFAULT_LEDGER_PATH)
}
fn default_ttl() -> u64 {
    DEFAULT_TTL_SECS
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RelayConfig {
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
    #[serde(default)]
    pub keywords: KeywordRuleSet,
    #[serde(default)]
    pub filter: LengthFloor,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

impl RelayConfig {
    /// $RELAY_CONFIG_PATH, else `config/relay.toml`.
    pub fn load_default() -> Result<Self> {
        match env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    return Err(anyhow!(
                        "{ENV_CONFIG_PATH} points to non-existent path {}",
                        pb.display()
                    ));
                }
                Self::load_from_file(&pb)
            }
            Err(_) => Self::load_from_file(Path::new(DEFAULT_CONFIG_PATH)),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading relay config from {}", path.display()))?;
        Self::from_toml_str(&data).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parse, resolve "ENV" secrets, apply env overrides and sanitize.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: RelayConfig = toml::from_str(s)?;

        // Resolve secrets
        if cfg.classification.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.classification.api_key = env::var(ENV_HF_TOKEN).unwrap_or_default();
        }
        let hook = cfg.delivery.webhook_url.trim();
        if hook.is_empty() || hook.eq_ignore_ascii_case("env") {
            cfg.delivery.webhook_url = env::var(ENV_WEBHOOK).unwrap_or_default();
        }

        // Env override, clamped. Garbage keeps the configured value.
        if let Ok(raw) = env::var(ENV_THRESHOLD) {
            match raw.trim().parse::<f32>() {
                Ok(t) if t.is_finite() => cfg.classification.threshold = t.clamp(0.0, 1.0),
                _ => warn!(
                    target: "config",
                    value = %raw,
                    "{ENV_THRESHOLD} is not a number, keeping configured threshold"
                ),
            }
        }

        cfg.sanitize();
        Ok(cfg)
    }

    fn sanitize(&mut self) {
        self.classification.threshold = sanitize_threshold(self.classification.threshold);
        self.fetch.concurrency = self.fetch.concurrency.max(1);
        self.fetch.timeout_secs = self.fetch.timeout_secs.max(1);
        self.keywords = std::mem::take(&mut self.keywords).normalized();
        self.feeds = dedup_feeds(std::mem::take(&mut self.feeds));
        self.translation.endpoints = clean_list(std::mem::take(&mut self.translation.endpoints));
        self.classification.labels.retain(|l| !l.candidate.trim().is_empty());
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }

    /* ----------------------------
    Component factories
    ---------------------------- */

    pub fn feed_sources(&self) -> Result<Vec<Arc<dyn FeedSource>>> {
        let client = RssFeed::http_client(self.fetch_timeout()).context("building feed client")?;
        Ok(self
            .feeds
            .iter()
            .map(|f| {
                Arc::new(RssFeed::from_url(f.name.clone(), f.url.clone(), client.clone()))
                    as Arc<dyn FeedSource>
            })
            .collect())
    }

    pub fn translator(&self) -> Result<TranslatorChain> {
        let t = &self.translation;
        let client = translate::http_client(Duration::from_secs(t.timeout_secs.max(1)))
            .context("building translation client")?;
        let mut strategies: Vec<Arc<dyn TranslationStrategy>> = t
            .endpoints
            .iter()
            .map(|e| {
                Arc::new(LibreTranslate::new(e, t.api_key.clone(), client.clone()))
                    as Arc<dyn TranslationStrategy>
            })
            .collect();
        if t.fallback == TranslationFallback::MyMemory {
            strategies.push(Arc::new(MyMemory::new(client)));
        }
        Ok(TranslatorChain::new(strategies))
    }

    pub fn classification_gate(&self, translator: TranslatorChain) -> Result<ClassificationGate> {
        let c = &self.classification;
        let classifier: Arc<dyn TopicClassifier> = if c.enabled {
            let key = Some(c.api_key.clone()).filter(|k| !k.trim().is_empty());
            Arc::new(
                HfZeroShotClassifier::new(&c.endpoint, key, Duration::from_secs(c.timeout_secs.max(1)))
                    .context("building classifier client")?,
            )
        } else {
            Arc::new(DisabledClassifier)
        };
        Ok(
            ClassificationGate::new(classifier, translator, c.labels.clone(), c.threshold)
                .with_classify_language(&self.translation.classify_language),
        )
    }

    /// Stdout when `dry_run`, else the Discord webhook.
    pub fn delivery_sink(&self, dry_run: bool) -> Result<Arc<dyn DeliverySink>> {
        if dry_run {
            return Ok(Arc::new(StdoutSink));
        }
        if self.delivery.webhook_url.trim().is_empty() {
            return Err(anyhow!(
                "no webhook configured: set delivery.webhook_url or {ENV_WEBHOOK}"
            ));
        }
        Ok(Arc::new(
            DiscordWebhook::new(self.delivery.webhook_url.clone())
                .with_timeout(self.delivery.timeout_secs),
        ))
    }

    pub fn pipeline(&self, dry_run: bool) -> Result<Pipeline> {
        let translator = self.translator()?;
        let filter = RelevanceFilter::new(self.keywords.clone(), self.filter);
        let ledger = Ledger::new(self.ledger.path.clone(), self.ledger.ttl_secs);
        let gate = self.classification_gate(translator.clone())?;
        let mut pipeline = Pipeline::new(filter, ledger, gate, self.delivery_sink(dry_run)?);
        if let Some(lang) = self.translation.delivery_language.as_deref() {
            pipeline = pipeline.with_delivery_language(translator, lang);
        }
        Ok(pipeline)
    }
}

fn dedup_feeds(feeds: Vec<FeedConfig>) -> Vec<FeedConfig> {
    let mut seen = HashSet::new();
    feeds
        .into_iter()
        .filter(|f| !f.url.trim().is_empty())
        .filter(|f| seen.insert(f.url.trim().trim_end_matches('/').to_ascii_lowercase()))
        .collect()
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SAMPLE: &str = r#"
[[feeds]]
name = "Polska – RMF24"
url = "https://www.rmf24.pl/fakty/polska/feed"

[[feeds]]
name = "Bośnia i Hercegowina – CIN"
url = "https://cin.ba/feed/"

[[feeds]]
name = "Bośnia i Hercegowina – CIN (ekonomia)"
url = "https://cin.ba/feed"

[keywords]
include = [" Prezydent ", "wojn", "", "WOJN"]
exclude = ["wypad"]
priority = ["wojn"]
region = ["polsk"]

[fetch]
concurrency = 0

[classification]
api_key = "ENV"
threshold = 7.5
labels = [
  { candidate = "domestic politics", topic = "polityka krajowa" },
  { candidate = "sport" },
]

[delivery]
webhook_url = "ENV"
"#;

    fn clear_env() {
        for k in [ENV_CONFIG_PATH, ENV_THRESHOLD, ENV_HF_TOKEN, ENV_WEBHOOK] {
            env::remove_var(k);
        }
    }

    #[serial]
    #[test]
    fn sanitizes_and_dedups() {
        clear_env();
        let cfg = RelayConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.feeds.len(), 2);
        assert_eq!(cfg.feeds[0].name, "Polska – RMF24");
        assert_eq!(cfg.keywords.include, vec!["prezydent".to_string(), "wojn".to_string()]);
        assert_eq!(cfg.fetch.concurrency, 1);
        assert_eq!(cfg.fetch.timeout_secs, 15);
        assert_eq!(cfg.classification.threshold, DEFAULT_THRESHOLD);
        assert_eq!(cfg.classification.labels[0].topic(), "polityka krajowa");
        assert_eq!(cfg.classification.labels[1].topic(), "sport");
        assert_eq!(cfg.ledger.ttl_secs, 259_200);
        assert_eq!(cfg.translation.fallback, TranslationFallback::MyMemory);
    }

    #[serial]
    #[test]
    fn env_secrets_and_threshold_override() {
        clear_env();
        env::set_var(ENV_HF_TOKEN, "hf_test");
        env::set_var(ENV_WEBHOOK, "https://discord.example/hook");
        env::set_var(ENV_THRESHOLD, "0.55");
        let cfg = RelayConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.classification.api_key, "hf_test");
        assert_eq!(cfg.delivery.webhook_url, "https://discord.example/hook");
        assert_eq!(cfg.classification.threshold, 0.55);

        env::set_var(ENV_THRESHOLD, "3");
        let cfg = RelayConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.classification.threshold, 1.0);
        clear_env();
    }

    #[serial]
    #[test]
    fn garbage_threshold_override_keeps_configured_value() {
        clear_env();
        env::set_var(ENV_THRESHOLD, "not-a-number");
        let sample = SAMPLE.replacen("threshold = 7.5", "threshold = 0.45", 1);
        let cfg = RelayConfig::from_toml_str(&sample).unwrap();
        assert_eq!(cfg.classification.threshold, 0.45);
        clear_env();
    }

    #[serial]
    #[test]
    fn load_default_honours_env_path() {
        clear_env();
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("relay.toml");
        fs::write(&p, "[ledger]\nttl_secs = 60\n").unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        let cfg = RelayConfig::load_default().unwrap();
        assert_eq!(cfg.ledger.ttl_secs, 60);
        assert!(cfg.feeds.is_empty());

        env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(RelayConfig::load_default().is_err());
        clear_env();
    }

    #[serial]
    #[test]
    fn dry_run_needs_no_webhook() {
        clear_env();
        let cfg = RelayConfig::from_toml_str("").unwrap();
        assert!(cfg.delivery_sink(true).is_ok());
        assert!(cfg.delivery_sink(false).is_err());
    }

    #[serial]
    #[test]
    fn shipped_config_parses() {
        clear_env();
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let cfg = RelayConfig::load_from_file(&path).unwrap();
        assert!(cfg.feeds.len() > 40);
        assert!(!cfg.keywords.include.is_empty());
        assert!(!cfg.keywords.region.is_empty());
        assert!(!cfg.classification.labels.is_empty());
    }
}
