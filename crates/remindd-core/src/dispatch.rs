//! Notification dispatch: drive a due reminder through its channels and
//! reconcile the outcomes into the store.
//!
//! Channels are independent. One channel's failure never blocks or rolls
//! back another channel's success for the same reminder, and distinct
//! channels of one reminder are sent concurrently. Every send is wrapped in
//! a timeout so a hung channel cannot stall the scheduler tick for other
//! reminders.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::channel::NotificationChannel;
use crate::error::{ChannelError, CoreError, DatabaseError};
use crate::model::{ChannelKind, DeliveryPolicy, DeliveryStatus, Reminder};
use crate::storage::ReminderStore;
use crate::template::Message;

/// What happened to one channel during a dispatch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOutcome {
    /// Send succeeded and the store transition was applied (or a racing
    /// tick already had -- either way the channel is delivered).
    Delivered,
    /// Transient failure recorded; the channel stays retryable.
    Retrying { attempts: u32 },
    /// Channel frozen: retry budget spent or a non-retryable send error.
    TerminalFailure { attempts: u32 },
    /// Failed channel still inside its backoff window; not attempted.
    SkippedBackoff,
    /// Reminder row vanished mid-flight (deleted); outcome discarded.
    Dropped,
}

/// Per-reminder dispatch result, for logging and tests.
#[derive(Debug)]
pub struct DeliveryReport {
    pub reminder_id: i64,
    /// Trace id correlating this pass's log lines.
    pub trace_id: Uuid,
    pub outcomes: BTreeMap<ChannelKind, ChannelOutcome>,
}

impl DeliveryReport {
    /// True iff some channel is still retryable after this pass.
    pub fn has_retryable(&self) -> bool {
        self.outcomes.values().any(|o| {
            matches!(
                o,
                ChannelOutcome::Retrying { .. } | ChannelOutcome::SkippedBackoff
            )
        })
    }
}

/// Routes due reminders to their channels and writes outcomes back through
/// the store's compare-and-set transitions.
pub struct Dispatcher {
    store: ReminderStore,
    channels: BTreeMap<ChannelKind, Arc<dyn NotificationChannel>>,
    policy: DeliveryPolicy,
    template: Option<String>,
}

impl Dispatcher {
    pub fn new(
        store: ReminderStore,
        channels: BTreeMap<ChannelKind, Arc<dyn NotificationChannel>>,
        policy: DeliveryPolicy,
    ) -> Self {
        Self {
            store,
            channels,
            policy,
            template: None,
        }
    }

    /// Use a custom message template instead of the built-in one.
    pub fn with_template(mut self, template: String) -> Self {
        self.template = Some(template);
        self
    }

    pub fn policy(&self) -> &DeliveryPolicy {
        &self.policy
    }

    /// Deliver every attemptable channel of `reminder`, concurrently.
    ///
    /// # Errors
    /// Only store unavailability escapes; channel failures are recorded in
    /// the report and the store, never raised.
    pub async fn deliver(
        &self,
        reminder: &Reminder,
        now: DateTime<Utc>,
    ) -> Result<DeliveryReport, CoreError> {
        let trace_id = Uuid::new_v4();
        let mut report = DeliveryReport {
            reminder_id: reminder.id,
            trace_id,
            outcomes: BTreeMap::new(),
        };

        let event = match self.store.get_event(reminder.event_id) {
            Ok(event) => event,
            // Event (and with it the reminder) deleted since the due scan.
            Err(DatabaseError::NotFound { .. }) => {
                debug!("[{trace_id}] reminder {} dropped: event gone", reminder.id);
                return Ok(report);
            }
            Err(e) => return Err(e.into()),
        };
        let message = Arc::new(Message::for_event(&event, self.template.as_deref()));

        let mut tasks = Vec::new();
        for (&kind, delivery) in &reminder.deliveries {
            if delivery.is_settled() {
                continue;
            }
            if !delivery.retry_eligible(now, &self.policy) {
                report.outcomes.insert(kind, ChannelOutcome::SkippedBackoff);
                continue;
            }

            let store = self.store.clone();
            let channel = self.channels.get(&kind).cloned();
            let message = Arc::clone(&message);
            let recipient = delivery.recipient.clone();
            let policy = self.policy;
            let reminder_id = reminder.id;

            tasks.push(tokio::spawn(async move {
                let outcome = attempt_channel(
                    store,
                    channel,
                    kind,
                    recipient,
                    message,
                    reminder_id,
                    now,
                    policy,
                )
                .await?;
                Ok::<(ChannelKind, ChannelOutcome), CoreError>((kind, outcome))
            }));
        }

        for task in tasks {
            let (kind, outcome) = task
                .await
                .map_err(|e| CoreError::Custom(format!("dispatch task panicked: {e}")))??;
            match outcome {
                ChannelOutcome::Delivered => {
                    info!("[{trace_id}] reminder {} {kind}: delivered", reminder.id);
                }
                ChannelOutcome::Retrying { attempts } => {
                    warn!(
                        "[{trace_id}] reminder {} {kind}: attempt {attempts} failed, will retry",
                        reminder.id
                    );
                }
                ChannelOutcome::TerminalFailure { attempts } => {
                    warn!(
                        "[{trace_id}] reminder {} {kind}: terminally failed after {attempts} attempts",
                        reminder.id
                    );
                }
                ChannelOutcome::SkippedBackoff | ChannelOutcome::Dropped => {}
            }
            report.outcomes.insert(kind, outcome);
        }

        Ok(report)
    }
}

/// One send attempt for one channel: timeout-bounded send, then the state
/// write-back through the store's guarded transitions.
#[allow(clippy::too_many_arguments)]
async fn attempt_channel(
    store: ReminderStore,
    channel: Option<Arc<dyn NotificationChannel>>,
    kind: ChannelKind,
    recipient: String,
    message: Arc<Message>,
    reminder_id: i64,
    now: DateTime<Utc>,
    policy: DeliveryPolicy,
) -> Result<ChannelOutcome, CoreError> {
    // A reminder routed to a channel the runtime doesn't carry freezes as a
    // terminal failure immediately, so the misconfiguration is visible to
    // the operator, who can enable the channel and re-arm.
    let send_result = match channel {
        Some(channel) => {
            match tokio::time::timeout(policy.send_timeout, channel.send(&recipient, &message))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ChannelError::transient(format!(
                    "send timed out after {:?}",
                    policy.send_timeout
                ))),
            }
        }
        None => Err(ChannelError::NotConfigured { kind }),
    };

    let outcome = match send_result {
        Ok(()) => {
            if !store.mark_channel_delivered(reminder_id, kind)? {
                // Lost the transition: either a racing tick delivered first
                // or the reminder was deleted mid-flight. Both are benign.
                debug!("reminder {reminder_id} {kind}: delivered transition already applied");
            }
            ChannelOutcome::Delivered
        }
        Err(err) if err.is_transient() => {
            match store.mark_channel_failed(reminder_id, kind, &err.to_string(), now, policy.max_attempts)? {
                Some((DeliveryStatus::Terminal, attempts)) => {
                    ChannelOutcome::TerminalFailure { attempts }
                }
                Some((_, attempts)) => ChannelOutcome::Retrying { attempts },
                None => ChannelOutcome::Dropped,
            }
        }
        Err(err) => {
            if store.mark_channel_terminal(reminder_id, kind, &err.to_string(), now)? {
                let attempts = store
                    .get_reminder(reminder_id)
                    .ok()
                    .and_then(|r| r.deliveries.get(&kind).map(|d| d.attempts))
                    .unwrap_or(0);
                ChannelOutcome::TerminalFailure { attempts }
            } else {
                ChannelOutcome::Dropped
            }
        }
    };
    Ok(outcome)
}
