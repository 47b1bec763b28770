//! Messaging channel -- post the reminder text to a webhook.
//!
//! The recipient address is the webhook URL itself; a reminder created
//! without one falls back to the configured default.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use url::Url;

use crate::channel::{status_error, NotificationChannel};
use crate::error::{ChannelError, ConfigError};
use crate::model::ChannelKind;
use crate::storage::config::MessagingConfig;
use crate::template::Message;

pub struct WebhookChannel {
    default_url: Option<Url>,
    client: Client,
}

impl WebhookChannel {
    /// # Errors
    /// Returns an error if a default webhook URL is configured but invalid.
    pub fn new(config: &MessagingConfig) -> Result<Self, ConfigError> {
        let default_url = if config.webhook_url.is_empty() {
            None
        } else {
            Some(
                parse_webhook_url(&config.webhook_url).map_err(|e| ConfigError::InvalidValue {
                    key: "channels.messaging.webhook_url".into(),
                    message: e,
                })?,
            )
        };
        Ok(Self {
            default_url,
            client: Client::new(),
        })
    }

    fn target(&self, recipient: &str) -> Result<Url, ChannelError> {
        if recipient.is_empty() {
            return self
                .default_url
                .clone()
                .ok_or_else(|| ChannelError::terminal("no webhook URL for recipient"));
        }
        parse_webhook_url(recipient)
            .map_err(|e| ChannelError::terminal(format!("invalid webhook URL {recipient:?}: {e}")))
    }
}

fn parse_webhook_url(s: &str) -> Result<Url, String> {
    let url = Url::parse(s).map_err(|e| e.to_string())?;
    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    Ok(url)
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Messaging
    }

    async fn send(&self, recipient: &str, message: &Message) -> Result<(), ChannelError> {
        let url = self.target(recipient)?;
        let body = json!({ "content": message.body });

        let resp = self.client.post(url).json(&body).send().await?;

        // Webhook endpoints commonly answer 204 on success.
        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            Err(status_error(status, &text))
        }
    }
}
