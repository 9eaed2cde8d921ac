use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{DeliveryMessage, DeliverySink};
use crate::error::DeliveryError;

#[derive(Clone)]
pub struct DiscordWebhook {
    webhook: String,
    client: Client,
    timeout: Duration,
}

impl DiscordWebhook {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs.max(1));
        self
    }
}

#[derive(Serialize)]
struct DiscordWebhookPayload<'a> {
    content: &'a str,
}

#[async_trait]
impl DeliverySink for DiscordWebhook {
    async fn deliver(&self, msg: &DeliveryMessage) -> Result<(), DeliveryError> {
        if self.webhook.trim().is_empty() {
            return Err(DeliveryError::NotConfigured);
        }
        let content = msg.render();
        let rsp = self
            .client
            .post(&self.webhook)
            .timeout(self.timeout)
            .json(&DiscordWebhookPayload { content: &content })
            .send()
            .await
            .map_err(|e| DeliveryError::Http(e.to_string()))?;
        if let Err(e) = rsp.error_for_status_ref() {
            return Err(DeliveryError::Status(
                e.status().map(|s| s.as_u16()).unwrap_or_default(),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "discord"
    }
}
