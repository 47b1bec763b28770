//! Domain model: events, reminders, and the per-channel delivery state
//! machine.
//!
//! A reminder fires once at `firing_time` and routes to one or more
//! channels. Delivery is tracked per channel: `pending -> delivered`
//! (one-way) or `pending -> failed -> ... -> terminal` once the retry
//! budget is spent. The store owns every transition; nothing here mutates.

use std::collections::BTreeMap;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A delivery medium configured on a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Messaging,
    CalendarSync,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Messaging => "messaging",
            ChannelKind::CalendarSync => "calendar_sync",
        }
    }

    pub fn parse(s: &str) -> Option<ChannelKind> {
        match s {
            "email" => Some(ChannelKind::Email),
            "messaging" => Some(ChannelKind::Messaging),
            "calendar_sync" => Some(ChannelKind::CalendarSync),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-channel delivery status.
///
/// `Delivered` is terminal success; `Terminal` is terminal failure (retry
/// budget spent or a non-retryable send error). Neither is ever left again
/// by the scheduler -- only an explicit operator re-arm resets `Terminal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
    Terminal,
}

/// Delivery state of one channel of one reminder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDelivery {
    /// Channel-specific recipient address (email address, webhook URL,
    /// calendar id).
    pub recipient: String,
    pub status: DeliveryStatus,
    /// Send attempts made so far, counting the final successful one.
    pub attempts: u32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl ChannelDelivery {
    pub fn pending(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            status: DeliveryStatus::Pending,
            attempts: 0,
            last_error: None,
            last_attempt_at: None,
        }
    }

    /// Whether the dispatcher may attempt this channel at `now`.
    ///
    /// Pending channels are always eligible. Failed channels become eligible
    /// again once `attempts * base_backoff` has elapsed since the last
    /// attempt (linear backoff). Delivered and terminal channels never are.
    pub fn retry_eligible(&self, now: DateTime<Utc>, policy: &DeliveryPolicy) -> bool {
        match self.status {
            DeliveryStatus::Pending => true,
            DeliveryStatus::Delivered | DeliveryStatus::Terminal => false,
            DeliveryStatus::Failed => {
                if self.attempts >= policy.max_attempts {
                    return false;
                }
                match self.last_attempt_at {
                    None => true,
                    Some(at) => at + policy.backoff_after(self.attempts) <= now,
                }
            }
        }
    }

    /// Whether this channel needs no further scheduler work.
    pub fn is_settled(&self) -> bool {
        matches!(
            self.status,
            DeliveryStatus::Delivered | DeliveryStatus::Terminal
        )
    }
}

/// Retry and timeout policy applied by the dispatcher and due-detection.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryPolicy {
    /// Failed attempts after which a channel is frozen in terminal failure.
    pub max_attempts: u32,
    /// Linear backoff unit: a channel failed `n` times waits `n * base`.
    pub base_backoff: StdDuration,
    /// Per-send timeout applied at the dispatcher boundary.
    pub send_timeout: StdDuration,
}

impl DeliveryPolicy {
    pub fn backoff_after(&self, attempts: u32) -> Duration {
        Duration::seconds(attempts as i64 * self.base_backoff.as_secs() as i64)
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: StdDuration::from_secs(120),
            send_timeout: StdDuration::from_secs(30),
        }
    }
}

/// The user-facing occurrence a reminder refers to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Event fields supplied at creation, before the store assigns an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// A scheduled notification tied to an event, firing once at `firing_time`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: i64,
    /// Back-reference to the owning event, not ownership.
    pub event_id: i64,
    /// Immutable after creation.
    pub firing_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// One entry per configured channel.
    pub deliveries: BTreeMap<ChannelKind, ChannelDelivery>,
}

impl Reminder {
    pub fn recipient(&self, kind: ChannelKind) -> Option<&str> {
        self.deliveries.get(&kind).map(|d| d.recipient.as_str())
    }

    /// True iff every configured channel has been delivered.
    pub fn fully_delivered(&self) -> bool {
        !self.deliveries.is_empty()
            && self
                .deliveries
                .values()
                .all(|d| d.status == DeliveryStatus::Delivered)
    }

    /// True iff no channel needs further scheduler work (each one delivered
    /// or terminally failed).
    pub fn is_settled(&self) -> bool {
        self.deliveries.values().all(|d| d.is_settled())
    }

    /// True iff at least one channel is attemptable at `now`.
    pub fn has_actionable_channel(&self, now: DateTime<Utc>, policy: &DeliveryPolicy) -> bool {
        self.deliveries
            .values()
            .any(|d| d.retry_eligible(now, policy))
    }
}
