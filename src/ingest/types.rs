// src/ingest/types.rs
use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::FetchError;

/// One entry as produced by a feed source. Never mutated after parsing.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct FeedItem {
    pub title: String,
    /// Absent summaries are treated as "".
    #[serde(default)]
    pub summary: Option<String>,
    pub link: String,
    /// Feed categories, in document order.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Label of the feed the item came from, e.g. "Polska – RMF24".
    #[serde(default)]
    pub source_name: Option<String>,
    /// unix seconds, when the feed provides a parseable date
    #[serde(default)]
    pub published_at: Option<u64>,
}

impl FeedItem {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            ..Default::default()
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_name = Some(source.into());
        self
    }

    pub fn summary_or_empty(&self) -> &str {
        self.summary.as_deref().unwrap_or_default()
    }

    pub fn source_or_empty(&self) -> &str {
        self.source_name.as_deref().unwrap_or_default()
    }

    pub fn identity(&self) -> ArticleIdentity {
        ArticleIdentity::of(&self.title, &self.link)
    }
}

/// 128-bit fingerprint of `(title, link)`; the only dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArticleIdentity([u8; 16]);

impl ArticleIdentity {
    pub fn of(title: &str, link: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        // unit separator keeps ("ab", "c") apart from ("a", "bc")
        hasher.update([0x1f]);
        hasher.update(link.as_bytes());
        let digest = hasher.finalize();
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest[..16]);
        Self(out)
    }
}

impl fmt::Display for ArticleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<FeedItem>, FetchError>;
    fn name(&self) -> &str;
}
