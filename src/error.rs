//! Error taxonomy for one relay pass.
//!
//! Every variant is recovered locally by the pipeline: a failing source, item
//! or endpoint never aborts the rest of the batch.

use thiserror::Error;

/// One feed source could not be fetched or parsed.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {source_name} failed: {message}")]
    Http { source_name: String, message: String },

    #[error("{source_name} answered with HTTP {status}")]
    Status { source_name: String, status: u16 },

    #[error("{source_name} did not answer within {secs}s")]
    Timeout { source_name: String, secs: u64 },

    #[error("could not parse feed from {source_name}: {message}")]
    Parse { source_name: String, message: String },
}

/// A single translation strategy failed. The chain aggregates these; the
/// caller never sees one because the terminal fallback is the original text.
#[derive(Error, Debug)]
pub enum TranslationError {
    #[error("{provider}: request failed: {message}")]
    Http { provider: String, message: String },

    #[error("{provider}: HTTP {status}")]
    Status { provider: String, status: u16 },

    #[error("{provider}: malformed response: {message}")]
    Malformed { provider: String, message: String },
}

/// The topic classifier is unavailable or returned garbage. Treated as "no
/// label", which rejects the item.
#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("classifier is disabled")]
    Disabled,

    #[error("classifier request failed: {0}")]
    Http(String),

    #[error("classifier answered with HTTP {0}")]
    Status(u16),

    #[error("malformed classifier response: {0}")]
    Malformed(String),
}

/// The notification sink rejected or never received the message.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Http(String),

    #[error("webhook answered with HTTP {0}")]
    Status(u16),

    #[error("delivery sink is not configured")]
    NotConfigured,
}

/// The persisted ledger could not be read or written.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
