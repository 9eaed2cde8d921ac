// src/translate.rs
//! Translation as an ordered list of strategies. The chain stops at the first
//! success and never fails: when every strategy errors, the original text is
//! returned with `failed = true`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::TranslationError;
use crate::metrics::TRANSLATION_FALLBACKS;

pub const MYMEMORY_URL: &str = "https://api.mymemory.translated.net/get";
// MyMemory rejects longer queries
const MYMEMORY_MAX_CHARS: usize = 500;

#[async_trait]
pub trait TranslationStrategy: Send + Sync {
    async fn translate(&self, text: &str, target: &str) -> Result<String, TranslationError>;
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub text: String,
    /// Strategy that produced `text`; `None` when nothing was translated.
    pub provider: Option<String>,
    /// True when every strategy failed and `text` is the original.
    pub failed: bool,
}

impl Translation {
    fn untouched(text: &str, failed: bool) -> Self {
        Self {
            text: text.to_string(),
            provider: None,
            failed,
        }
    }
}

#[derive(Clone, Default)]
pub struct TranslatorChain {
    strategies: Vec<Arc<dyn TranslationStrategy>>,
}

impl TranslatorChain {
    pub fn new(strategies: Vec<Arc<dyn TranslationStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub async fn translate(&self, text: &str, target: &str) -> Translation {
        if text.trim().is_empty() {
            return Translation::untouched(text, false);
        }

        let mut errors: Vec<String> = Vec::new();
        for s in &self.strategies {
            match s.translate(text, target).await {
                Ok(out) => {
                    if !errors.is_empty() {
                        debug!(target: "translate", provider = s.name(), skipped = ?errors, "translated after fallback");
                    }
                    return Translation {
                        text: out,
                        provider: Some(s.name().to_string()),
                        failed: false,
                    };
                }
                Err(e) => errors.push(e.to_string()),
            }
        }

        warn!(
            target: "translate",
            target_lang = target,
            errors = ?errors,
            "all translation providers failed, keeping original text"
        );
        counter!(TRANSLATION_FALLBACKS).increment(1);
        Translation::untouched(text, true)
    }
}

/// Shared client for translation endpoints.
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent("slavic-news-relay/0.1")
        .connect_timeout(Duration::from_secs(5).min(timeout))
        .timeout(timeout)
        .build()
}

/* ----------------------------
LibreTranslate-compatible endpoint
---------------------------- */

pub struct LibreTranslate {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl LibreTranslate {
    /// `endpoint` is the server base URL or its full `/translate` URL.
    pub fn new(endpoint: &str, api_key: Option<String>, client: reqwest::Client) -> Self {
        let base = endpoint.trim().trim_end_matches('/');
        let endpoint = if base.ends_with("/translate") {
            base.to_string()
        } else {
            format!("{base}/translate")
        };
        Self {
            endpoint,
            api_key,
            client,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TranslationStrategy for LibreTranslate {
    async fn translate(&self, text: &str, target: &str) -> Result<String, TranslationError> {
        #[derive(Serialize)]
        struct Req<'a> {
            q: &'a str,
            source: &'a str,
            target: &'a str,
            format: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            api_key: Option<&'a str>,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(rename = "translatedText")]
            translated_text: String,
        }

        let req = Req {
            q: text,
            source: "auto",
            target,
            format: "text",
            api_key: self.api_key.as_deref(),
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&req)
            .send()
            .await
            .map_err(|e| TranslationError::Http {
                provider: self.endpoint.clone(),
                message: e.to_string(),
            })?;
        if !resp.status().is_success() {
            return Err(TranslationError::Status {
                provider: self.endpoint.clone(),
                status: resp.status().as_u16(),
            });
        }
        let body: Resp = resp.json().await.map_err(|e| TranslationError::Malformed {
            provider: self.endpoint.clone(),
            message: e.to_string(),
        })?;
        let out = body.translated_text.trim().to_string();
        if out.is_empty() {
            return Err(TranslationError::Malformed {
                provider: self.endpoint.clone(),
                message: "empty translatedText".into(),
            });
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        &self.endpoint
    }
}

/* ----------------------------
MyMemory fallback
---------------------------- */

pub struct MyMemory {
    url: String,
    client: reqwest::Client,
}

impl MyMemory {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_url(MYMEMORY_URL, client)
    }

    pub fn with_url(url: &str, client: reqwest::Client) -> Self {
        Self {
            url: url.to_string(),
            client,
        }
    }
}

#[async_trait]
impl TranslationStrategy for MyMemory {
    async fn translate(&self, text: &str, target: &str) -> Result<String, TranslationError> {
        let q = crate::ingest::truncate_chars(text, MYMEMORY_MAX_CHARS);
        let langpair = format!("Autodetect|{target}");
        let err_http = |e: reqwest::Error| TranslationError::Http {
            provider: "mymemory".into(),
            message: e.to_string(),
        };

        let resp = self
            .client
            .get(&self.url)
            .query(&[("q", q.as_str()), ("langpair", langpair.as_str())])
            .send()
            .await
            .map_err(err_http)?;
        if !resp.status().is_success() {
            return Err(TranslationError::Status {
                provider: "mymemory".into(),
                status: resp.status().as_u16(),
            });
        }
        let v: serde_json::Value = resp.json().await.map_err(|e| TranslationError::Malformed {
            provider: "mymemory".into(),
            message: e.to_string(),
        })?;

        // responseStatus arrives as a number or a string
        let status = match &v["responseStatus"] {
            serde_json::Value::Number(n) => n.as_u64().unwrap_or(0),
            serde_json::Value::String(s) => s.parse().unwrap_or(0),
            _ => 0,
        };
        let out = v["responseData"]["translatedText"]
            .as_str()
            .map(str::trim)
            .unwrap_or_default();
        if status != 200 || out.is_empty() {
            return Err(TranslationError::Malformed {
                provider: "mymemory".into(),
                message: format!("status {status}, empty={}", out.is_empty()),
            });
        }
        Ok(out.to_string())
    }

    fn name(&self) -> &str {
        "mymemory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fails(AtomicUsize);
    struct Upper(AtomicUsize);

    #[async_trait]
    impl TranslationStrategy for Fails {
        async fn translate(&self, _text: &str, _target: &str) -> Result<String, TranslationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(TranslationError::Status {
                provider: "fails".into(),
                status: 503,
            })
        }
        fn name(&self) -> &str {
            "fails"
        }
    }

    #[async_trait]
    impl TranslationStrategy for Upper {
        async fn translate(&self, text: &str, _target: &str) -> Result<String, TranslationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(text.to_uppercase())
        }
        fn name(&self) -> &str {
            "upper"
        }
    }

    #[tokio::test]
    async fn first_success_wins_and_later_strategies_are_not_called() {
        let a = Arc::new(Fails(AtomicUsize::new(0)));
        let b = Arc::new(Upper(AtomicUsize::new(0)));
        let c = Arc::new(Upper(AtomicUsize::new(0)));
        let chain = TranslatorChain::new(vec![a.clone(), b.clone(), c.clone()]);

        let t = chain.translate("wojna", "en").await;
        assert_eq!(t.text, "WOJNA");
        assert_eq!(t.provider.as_deref(), Some("upper"));
        assert!(!t.failed);
        assert_eq!(a.0.load(Ordering::SeqCst), 1);
        assert_eq!(b.0.load(Ordering::SeqCst), 1);
        assert_eq!(c.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn all_failing_keeps_original_with_marker() {
        let chain = TranslatorChain::new(vec![
            Arc::new(Fails(AtomicUsize::new(0))),
            Arc::new(Fails(AtomicUsize::new(0))),
        ]);
        let t = chain.translate("Prezydent podpisał ustawę", "en").await;
        assert_eq!(t.text, "Prezydent podpisał ustawę");
        assert!(t.failed);
        assert!(t.provider.is_none());
    }

    #[tokio::test]
    async fn empty_chain_is_a_failed_translation() {
        let t = TranslatorChain::default().translate("tekst", "en").await;
        assert!(t.failed);
    }

    #[tokio::test]
    async fn empty_text_skips_providers() {
        let a = Arc::new(Upper(AtomicUsize::new(0)));
        let chain = TranslatorChain::new(vec![a.clone()]);
        let t = chain.translate("  ", "en").await;
        assert!(!t.failed);
        assert_eq!(a.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn libretranslate_endpoint_is_normalized() {
        let c = reqwest::Client::new();
        assert_eq!(
            LibreTranslate::new("https://lt.example/", None, c.clone()).endpoint(),
            "https://lt.example/translate"
        );
        assert_eq!(
            LibreTranslate::new("https://lt.example/translate", None, c).endpoint(),
            "https://lt.example/translate"
        );
    }
}
