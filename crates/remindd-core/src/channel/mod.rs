//! Notification channels.
//!
//! Every delivery medium implements [`NotificationChannel`]. Adapters are
//! thin HTTP clients; the transport behind them (SMTP relay, chat service,
//! calendar backend) is an external collaborator. Sends are NOT assumed
//! idempotent at the transport layer -- the store's delivery-state tracking
//! is what prevents duplicate user-visible notifications.

pub mod calendar;
pub mod email;
pub mod webhook;

pub use calendar::CalendarChannel;
pub use email::EmailChannel;
pub use webhook::WebhookChannel;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::{ChannelError, ConfigError};
use crate::model::ChannelKind;
use crate::storage::config::ChannelsConfig;
use crate::template::Message;

/// A delivery medium for reminder notifications.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Which recipient slot of a reminder this channel serves.
    fn kind(&self) -> ChannelKind;

    /// Attempt delivery to `recipient`. Errors are classified transient
    /// (retry per backoff) or terminal (freeze the channel).
    async fn send(&self, recipient: &str, message: &Message) -> Result<(), ChannelError>;
}

/// Map an HTTP response status to a channel error.
///
/// 4xx means the request itself is wrong (bad recipient, rejected payload)
/// and retrying the same send cannot succeed; everything else is transport
/// trouble worth retrying.
pub(crate) fn status_error(status: StatusCode, body: &str) -> ChannelError {
    let reason = format!("HTTP {status}: {body}");
    if status.is_client_error() {
        ChannelError::terminal(reason)
    } else {
        ChannelError::transient(reason)
    }
}

/// Build the enabled channel set from configuration.
///
/// # Errors
/// Returns an error if an enabled channel is missing required settings.
pub fn build_channels(
    config: &ChannelsConfig,
) -> Result<BTreeMap<ChannelKind, Arc<dyn NotificationChannel>>, ConfigError> {
    let mut channels: BTreeMap<ChannelKind, Arc<dyn NotificationChannel>> = BTreeMap::new();
    for kind in &config.enabled {
        match kind {
            ChannelKind::Email => {
                channels.insert(*kind, Arc::new(EmailChannel::new(&config.email)?));
            }
            ChannelKind::Messaging => {
                channels.insert(*kind, Arc::new(WebhookChannel::new(&config.messaging)?));
            }
            ChannelKind::CalendarSync => {
                channels.insert(*kind, Arc::new(CalendarChannel::new(&config.calendar)?));
            }
        }
    }
    Ok(channels)
}
