//! Reminder management commands for CLI.

use std::collections::BTreeMap;

use chrono::Duration;
use clap::Subcommand;
use remindd_core::storage::ReminderStore;
use remindd_core::{ChannelKind, DeliveryStatus, Reminder};

use super::{parse_datetime, parse_duration};

#[derive(Subcommand)]
pub enum ReminderAction {
    /// Create a reminder for an event
    Add {
        /// Event ID the reminder belongs to
        event_id: i64,
        /// Absolute firing time (RFC3339, 'YYYY-MM-DD HH:MM', or 'YYYY-MM-DD')
        #[arg(long, conflicts_with = "before")]
        at: Option<String>,
        /// Fire this long before the event start (e.g. '1d', '2h30m')
        #[arg(long)]
        before: Option<String>,
        /// Email recipient address
        #[arg(long)]
        email: Option<String>,
        /// Messaging webhook URL
        #[arg(long)]
        webhook: Option<String>,
        /// Calendar id for calendar-sync delivery
        #[arg(long)]
        calendar: Option<String>,
    },
    /// List reminders with per-channel delivery state
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a reminder
    Delete {
        /// Reminder ID
        id: i64,
    },
    /// Reset failed or terminally failed channels back to pending
    Rearm {
        /// Reminder ID
        id: i64,
        /// Only this channel (email, messaging, calendar_sync)
        #[arg(long)]
        channel: Option<String>,
    },
}

pub fn run(action: ReminderAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = ReminderStore::open()?;

    match action {
        ReminderAction::Add {
            event_id,
            at,
            before,
            email,
            webhook,
            calendar,
        } => {
            let mut recipients: BTreeMap<ChannelKind, String> = BTreeMap::new();
            if let Some(email) = email {
                recipients.insert(ChannelKind::Email, email);
            }
            if let Some(webhook) = webhook {
                recipients.insert(ChannelKind::Messaging, webhook);
            }
            if let Some(calendar) = calendar {
                recipients.insert(ChannelKind::CalendarSync, calendar);
            }
            if recipients.is_empty() {
                return Err("at least one of --email, --webhook, or --calendar is required".into());
            }

            let event = store.get_event(event_id)?;
            let firing_time = match (at, before) {
                (Some(at), None) => parse_datetime(&at)?,
                (None, Some(before)) => {
                    let seconds = parse_duration(&before).ok_or_else(|| {
                        format!("invalid duration '{before}' (use forms like 30m, 2h, 1d)")
                    })?;
                    event.start_time - Duration::seconds(seconds)
                }
                _ => return Err("exactly one of --at or --before is required".into()),
            };

            let id = store.add_reminder(event_id, firing_time, &recipients)?;
            println!(
                "Reminder created: #{id} for event #{event_id}, firing at {firing_time} ({} channel(s))",
                recipients.len()
            );
        }
        ReminderAction::List { json } => {
            let reminders = store.list_reminders()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&reminders)?);
            } else if reminders.is_empty() {
                println!("No reminders.");
            } else {
                for reminder in reminders {
                    print_reminder(&reminder);
                }
            }
        }
        ReminderAction::Delete { id } => {
            if store.delete_reminder(id)? {
                println!("Reminder #{id} deleted.");
            } else {
                println!("Reminder #{id} not found.");
            }
        }
        ReminderAction::Rearm { id, channel } => {
            let kinds: Vec<ChannelKind> = match channel {
                Some(name) => vec![ChannelKind::parse(&name)
                    .ok_or_else(|| format!("unknown channel '{name}'"))?],
                None => store.get_reminder(id)?.deliveries.keys().copied().collect(),
            };
            let mut rearmed = 0;
            for kind in kinds {
                if store.rearm_channel(id, kind)? {
                    rearmed += 1;
                    println!("Reminder #{id} {kind}: re-armed.");
                }
            }
            if rearmed == 0 {
                println!("Reminder #{id}: nothing to re-arm.");
            }
        }
    }

    Ok(())
}

fn print_reminder(reminder: &Reminder) {
    println!("#{} event #{} fires {}", reminder.id, reminder.event_id, reminder.firing_time);
    for (kind, delivery) in &reminder.deliveries {
        let status = match delivery.status {
            DeliveryStatus::Pending => "pending".to_string(),
            DeliveryStatus::Delivered => "delivered".to_string(),
            DeliveryStatus::Failed => format!("failed ({} attempt(s))", delivery.attempts),
            DeliveryStatus::Terminal => {
                format!("TERMINAL after {} attempt(s)", delivery.attempts)
            }
        };
        match &delivery.last_error {
            Some(error) => println!("    {kind} -> {}: {status} -- {error}", delivery.recipient),
            None => println!("    {kind} -> {}: {status}", delivery.recipient),
        }
    }
}
