//! Event management commands for CLI.

use chrono::Duration;
use clap::Subcommand;
use remindd_core::channel::CalendarChannel;
use remindd_core::storage::{Config, ReminderStore};
use remindd_core::NewEvent;

use super::parse_datetime;

#[derive(Subcommand)]
pub enum EventAction {
    /// Create a new event
    Add {
        /// Event title
        title: String,
        /// Event description
        #[arg(long, default_value = "")]
        description: String,
        /// Start time (RFC3339, 'YYYY-MM-DD HH:MM', or 'YYYY-MM-DD')
        #[arg(long)]
        start: String,
        /// End time (default: one hour after start)
        #[arg(long)]
        end: Option<String>,
        /// Also create a calendar entry via the configured calendar API
        #[arg(long)]
        sync_calendar: bool,
    },
    /// List events
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an event (cascades to its reminders)
    Delete {
        /// Event ID
        id: i64,
    },
}

pub fn run(action: EventAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = ReminderStore::open()?;

    match action {
        EventAction::Add {
            title,
            description,
            start,
            end,
            sync_calendar,
        } => {
            let start_time = parse_datetime(&start)?;
            let end_time = match end {
                Some(s) => parse_datetime(&s)?,
                None => start_time + Duration::hours(1),
            };
            let event = NewEvent {
                title,
                description,
                start_time,
                end_time,
            };
            let id = store.add_event(&event)?;
            println!("Event created: #{id} \"{}\" at {}", event.title, event.start_time);

            if sync_calendar {
                sync_to_calendar(&event)?;
            }
        }
        EventAction::List { json } => {
            let events = store.list_events()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else if events.is_empty() {
                println!("No events.");
            } else {
                for event in events {
                    println!(
                        "#{} {} -- {} to {}",
                        event.id, event.title, event.start_time, event.end_time
                    );
                }
            }
        }
        EventAction::Delete { id } => {
            if store.delete_event(id)? {
                println!("Event #{id} deleted (reminders cascaded).");
            } else {
                println!("Event #{id} not found.");
            }
        }
    }

    Ok(())
}

/// Fire-and-forget calendar sync: a failure here is reported but never
/// touches the reminder delivery state machine.
fn sync_to_calendar(event: &NewEvent) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let channel = CalendarChannel::new(&config.channels.calendar)?;
    let runtime = tokio::runtime::Runtime::new()?;
    match runtime.block_on(channel.create_entry(
        "",
        &event.title,
        event.start_time,
        event.end_time,
    )) {
        Ok(external_id) => println!("Calendar entry created: {external_id}"),
        Err(e) => eprintln!("warning: calendar sync failed: {e}"),
    }
    Ok(())
}
