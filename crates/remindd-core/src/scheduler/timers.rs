//! Timer-based scheduling: a one-shot wake-up per reminder.
//!
//! Arming is idempotent per reminder id -- re-arming aborts the previous
//! timer before the new one is inserted, so two timers can never race on
//! the same reminder. Deleting or editing a reminder cancels its timer
//! first. On start, every unsettled reminder is armed; those already past
//! due fire immediately, which is the restart-recovery path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::dispatch::Dispatcher;
use crate::error::CoreError;
use crate::model::{DeliveryPolicy, DeliveryStatus, Reminder};
use crate::storage::ReminderStore;

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Timer-based scheduler: one tokio task per unsettled reminder.
pub struct TimerScheduler {
    store: ReminderStore,
    dispatcher: Arc<Dispatcher>,
    armed: Arc<Mutex<HashMap<i64, ArmedTimer>>>,
    generation: AtomicU64,
}

impl TimerScheduler {
    pub fn new(store: ReminderStore, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            armed: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Arm (or re-arm) the wake-up for a reminder. Idempotent per id: any
    /// previously armed timer for the same reminder is aborted first.
    pub fn arm(&self, reminder: &Reminder) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let task = fire_task(
            self.store.clone(),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.armed),
            reminder.id,
            reminder.firing_time,
            generation,
        );

        let mut armed = match self.armed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(prev) = armed.remove(&reminder.id) {
            prev.handle.abort();
            debug!("reminder {}: re-armed, previous timer cancelled", reminder.id);
        }
        armed.insert(
            reminder.id,
            ArmedTimer {
                generation,
                handle: tokio::spawn(task),
            },
        );
    }

    /// Cancel the wake-up for a reminder, if one is armed.
    pub fn cancel(&self, reminder_id: i64) {
        let mut armed = match self.armed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(timer) = armed.remove(&reminder_id) {
            timer.handle.abort();
            debug!("reminder {reminder_id}: timer cancelled");
        }
    }

    /// Arm every unsettled reminder in the store. Returns how many were
    /// armed.
    ///
    /// # Errors
    /// Fails only if the store cannot be read.
    pub fn arm_all(&self) -> Result<usize, CoreError> {
        let reminders = self.store.list_reminders()?;
        let mut count = 0;
        for reminder in &reminders {
            if !reminder.is_settled() {
                self.arm(reminder);
                count += 1;
            }
        }
        Ok(count)
    }

    /// Arm all persisted reminders and park until `shutdown` flips to true,
    /// then cancel every outstanding timer.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        match self.arm_all() {
            Ok(count) => info!("timer scheduler started ({count} reminder(s) armed)"),
            Err(e) => error!("timer scheduler failed to arm persisted reminders: {e}"),
        }

        loop {
            if shutdown.changed().await.is_err() || *shutdown.borrow() {
                break;
            }
        }

        let mut armed = match self.armed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (_, timer) in armed.drain() {
            timer.handle.abort();
        }
        info!("timer scheduler stopped");
    }
}

/// The armed wake-up: sleep until the firing time, then dispatch, re-arming
/// itself across retry backoff windows until the reminder settles or is
/// deleted.
fn fire_task(
    store: ReminderStore,
    dispatcher: Arc<Dispatcher>,
    armed: Arc<Mutex<HashMap<i64, ArmedTimer>>>,
    reminder_id: i64,
    firing_time: DateTime<Utc>,
    generation: u64,
) -> impl std::future::Future<Output = ()> {
    async move {
        sleep_until(firing_time).await;

        loop {
            // Reload current state each pass: the reminder may have been
            // delivered by another process or deleted outright.
            let reminder = match store.get_reminder(reminder_id) {
                Ok(reminder) => reminder,
                Err(_) => break,
            };
            if reminder.is_settled() {
                break;
            }

            let now = Utc::now();
            if !reminder.has_actionable_channel(now, dispatcher.policy()) {
                // Everything left is backoff-gated; sleep to the earliest
                // eligibility instant.
                match next_eligible_at(&reminder, dispatcher.policy()) {
                    Some(at) => {
                        sleep_until(at).await;
                        continue;
                    }
                    None => break,
                }
            }

            match dispatcher.deliver(&reminder, now).await {
                Ok(report) => {
                    if !report.has_retryable() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("reminder {reminder_id}: dispatch pass failed, retrying: {e}");
                    tokio::time::sleep(dispatcher.policy().base_backoff).await;
                }
            }
        }

        // Drop our own map entry, unless a re-arm has already replaced it.
        let mut armed = match armed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if armed.get(&reminder_id).is_some_and(|t| t.generation == generation) {
            armed.remove(&reminder_id);
        }
    }
}

async fn sleep_until(at: DateTime<Utc>) {
    let now = Utc::now();
    if at > now {
        if let Ok(wait) = (at - now).to_std() {
            tokio::time::sleep(wait).await;
        }
    }
}

/// Earliest instant at which any unsettled channel becomes attemptable.
fn next_eligible_at(reminder: &Reminder, policy: &DeliveryPolicy) -> Option<DateTime<Utc>> {
    reminder
        .deliveries
        .values()
        .filter(|d| !d.is_settled())
        .filter_map(|d| match d.status {
            DeliveryStatus::Pending => Some(Utc::now()),
            DeliveryStatus::Failed if d.attempts < policy.max_attempts => d
                .last_attempt_at
                .map(|at| at + policy.backoff_after(d.attempts)),
            _ => None,
        })
        .min()
}
