// src/notify/mod.rs
pub mod discord;
pub mod stdout;

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::ingest::truncate_chars;

/// Discord rejects longer message content.
pub const MAX_CONTENT_CHARS: usize = 2000;
pub const UNTRANSLATED_MARKER: &str = " [untranslated]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryMessage {
    pub title: String,
    pub topic: String,
    pub source: String,
    pub link: String,
    /// The title was meant to be translated but every provider failed.
    pub untranslated: bool,
}

impl DeliveryMessage {
    /// `**title**\n_topic · source_\nlink`, capped at [`MAX_CONTENT_CHARS`].
    /// The title is shortened first so the link survives.
    pub fn render(&self) -> String {
        let marker = if self.untranslated { UNTRANSLATED_MARKER } else { "" };
        let meta = if self.source.is_empty() {
            format!("_{}_", self.topic)
        } else {
            format!("_{} · {}_", self.topic, self.source)
        };
        let tail = format!("{marker}\n{meta}\n{}", self.link);
        let room = MAX_CONTENT_CHARS.saturating_sub(tail.chars().count() + 4);
        let title = truncate_chars(&self.title, room);
        let body = format!("**{title}**{tail}");
        truncate_chars(&body, MAX_CONTENT_CHARS)
    }
}

/// One-shot delivery. Failures are reported, never retried here.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, msg: &DeliveryMessage) -> Result<(), DeliveryError>;
    fn name(&self) -> &str;
    /// Dry-run sinks do not mark items as sent.
    fn records_deliveries(&self) -> bool {
        true
    }
}
