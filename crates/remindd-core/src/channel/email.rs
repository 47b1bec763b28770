//! Email channel -- deliver reminders through an HTTP mail gateway.
//!
//! The gateway relays to SMTP; this adapter only speaks JSON to it.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use url::Url;

use crate::channel::{status_error, NotificationChannel};
use crate::error::{ChannelError, ConfigError};
use crate::model::ChannelKind;
use crate::storage::config::EmailConfig;
use crate::template::Message;

pub struct EmailChannel {
    gateway_url: Url,
    from: String,
    client: Client,
}

impl EmailChannel {
    /// # Errors
    /// Returns an error if the gateway URL is missing or invalid.
    pub fn new(config: &EmailConfig) -> Result<Self, ConfigError> {
        let gateway_url =
            Url::parse(&config.gateway_url).map_err(|e| ConfigError::InvalidValue {
                key: "channels.email.gateway_url".into(),
                message: e.to_string(),
            })?;
        Ok(Self {
            gateway_url,
            from: config.from.clone(),
            client: Client::new(),
        })
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, recipient: &str, message: &Message) -> Result<(), ChannelError> {
        if recipient.is_empty() || !recipient.contains('@') {
            return Err(ChannelError::terminal(format!(
                "invalid email recipient: {recipient:?}"
            )));
        }

        let body = json!({
            "to": recipient,
            "from": self.from,
            "subject": message.subject,
            "html": message.html_body,
        });

        let resp = self
            .client
            .post(self.gateway_url.clone())
            .json(&body)
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            Err(status_error(status, &text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message() -> Message {
        Message {
            subject: "Event Reminder: standup".into(),
            body: "Reminder: standup".into(),
            html_body: "<p>standup</p>".into(),
            event_title: "standup".into(),
            event_start: Utc::now(),
            event_end: Utc::now(),
        }
    }

    #[test]
    fn rejects_unparseable_gateway_url() {
        let err = EmailChannel::new(&EmailConfig {
            gateway_url: "not a url".into(),
            from: "remindd@example.com".into(),
        });
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn invalid_recipient_is_terminal() {
        let channel = EmailChannel::new(&EmailConfig {
            gateway_url: "https://mail.example.com/send".into(),
            from: "remindd@example.com".into(),
        })
        .unwrap();
        let err = channel.send("not-an-address", &message()).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
