use std::collections::HashMap;
use std::time::Duration;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use shared::types::ChannelId;
use crate::config::ChannelConfig;

/// Outcome of delivering one message to one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Channel is gone or we can no longer reach it; its binding is dead
    ChannelNotFound,
    /// Anything else; the binding stays
    Failed(String),
}

/// Delivers text messages to chat channels
#[async_trait]
pub trait ChannelSink: Send + Sync {
    async fn deliver(&self, channel_id: ChannelId, text: &str) -> Delivery;
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
}

/// Posts messages to per-channel chat webhooks
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: Client,
    webhooks: HashMap<ChannelId, String>,
    timeout: Duration,
}

impl WebhookSink {
    pub fn new(client: Client, channels: &[ChannelConfig], timeout: Duration) -> Self {
        let webhooks = channels
            .iter()
            .map(|c| (c.id, c.webhook.clone()))
            .collect();

        Self {
            client,
            webhooks,
            timeout,
        }
    }
}

#[async_trait]
impl ChannelSink for WebhookSink {
    async fn deliver(&self, channel_id: ChannelId, text: &str) -> Delivery {
        let Some(webhook) = self.webhooks.get(&channel_id) else {
            return Delivery::ChannelNotFound;
        };

        let response = self
            .client
            .post(webhook)
            .json(&WebhookMessage { content: text })
            .timeout(self.timeout)
            .send()
            .await;

        match response {
            Ok(r) if r.status().is_success() => Delivery::Delivered,
            // Deleted channel, or a revoked webhook we will never get back into
            Ok(r) if matches!(
                r.status(),
                StatusCode::NOT_FOUND | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            ) => Delivery::ChannelNotFound,
            Ok(r) => Delivery::Failed(format!("webhook returned status {}", r.status())),
            Err(e) => Delivery::Failed(e.to_string()),
        }
    }
}
