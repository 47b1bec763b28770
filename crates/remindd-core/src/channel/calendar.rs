//! Calendar-sync channel -- create calendar entries for events.
//!
//! Used two ways: `create_entry` directly for fire-and-forget event sync
//! (failures are logged by the caller, outside the delivery state machine),
//! and through the [`NotificationChannel`] trait when a reminder routes to
//! calendar sync as a tracked channel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::channel::{status_error, NotificationChannel};
use crate::error::{ChannelError, ConfigError};
use crate::model::ChannelKind;
use crate::storage::config::CalendarConfig;
use crate::template::Message;

#[derive(Deserialize)]
struct EntryResponse {
    id: String,
}

pub struct CalendarChannel {
    api_url: Url,
    client: Client,
}

impl CalendarChannel {
    /// # Errors
    /// Returns an error if the calendar API URL is missing or invalid.
    pub fn new(config: &CalendarConfig) -> Result<Self, ConfigError> {
        let api_url = Url::parse(&config.api_url).map_err(|e| ConfigError::InvalidValue {
            key: "channels.calendar.api_url".into(),
            message: e.to_string(),
        })?;
        Ok(Self {
            api_url,
            client: Client::new(),
        })
    }

    /// Create a calendar entry; returns the backend's id for it.
    ///
    /// `calendar_id` may be empty for the backend's default calendar.
    pub async fn create_entry(
        &self,
        calendar_id: &str,
        title: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<String, ChannelError> {
        let url = self
            .api_url
            .join("entries")
            .map_err(|e| ChannelError::terminal(format!("bad calendar API URL: {e}")))?;
        let body = json!({
            "calendar": calendar_id,
            "title": title,
            "start": start.to_rfc3339(),
            "end": end.to_rfc3339(),
        });

        let resp = self.client.post(url).json(&body).send().await?;

        if resp.status().is_success() {
            let entry: EntryResponse = resp
                .json()
                .await
                .map_err(|e| ChannelError::transient(format!("bad entry response: {e}")))?;
            Ok(entry.id)
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            Err(status_error(status, &text))
        }
    }
}

#[async_trait]
impl NotificationChannel for CalendarChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::CalendarSync
    }

    async fn send(&self, recipient: &str, message: &Message) -> Result<(), ChannelError> {
        self.create_entry(
            recipient,
            &message.event_title,
            message.event_start,
            message.event_end,
        )
        .await
        .map(|_| ())
    }
}
