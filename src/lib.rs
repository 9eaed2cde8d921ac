// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod classify;
pub mod error;
pub mod ingest;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod relevance;
pub mod translate;

// ---- Re-exports for stable public API ----
pub use crate::ingest::config::RelayConfig;
pub use crate::ingest::types::{ArticleIdentity, FeedItem, FeedSource};
pub use crate::ledger::Ledger;
pub use crate::pipeline::{Outcome, Pipeline, RunReport};
pub use crate::relevance::{AdmissionClass, KeywordRuleSet, RelevanceFilter};
