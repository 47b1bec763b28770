//! Scheduling: decide when due reminders get handed to the dispatcher.
//!
//! Two interchangeable strategies. The poll scheduler scans the store on a
//! fixed interval; worst-case delivery latency is one interval plus dispatch
//! time, and a fresh start after a crash picks up reminders whose firing
//! time already passed. The timer scheduler ([`timers::TimerScheduler`])
//! arms a one-shot wake-up per reminder instead.
//!
//! The tick is an explicit method on the scheduler, not a hidden thread:
//! `run()` drives it from a tokio interval with a shutdown signal, and tests
//! drive it directly with a synthetic clock.

pub mod timers;

pub use timers::TimerScheduler;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::dispatch::{DeliveryReport, Dispatcher};
use crate::error::CoreError;
use crate::storage::ReminderStore;

/// Poll-based scheduler (the default strategy).
pub struct Scheduler {
    store: ReminderStore,
    dispatcher: Arc<Dispatcher>,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(store: ReminderStore, dispatcher: Arc<Dispatcher>, poll_interval: Duration) -> Self {
        Self {
            store,
            dispatcher,
            poll_interval,
        }
    }

    /// One scheduling pass: scan for due reminders and dispatch each,
    /// fanned out across tasks.
    ///
    /// # Errors
    /// Store unavailability aborts the pass cleanly; the caller retries on
    /// the next tick. Nothing here panics the process.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Vec<DeliveryReport>, CoreError> {
        let due = self.store.due(now, self.dispatcher.policy())?;
        if due.is_empty() {
            return Ok(Vec::new());
        }
        debug!("tick: {} reminder(s) due", due.len());

        let mut tasks = Vec::with_capacity(due.len());
        for reminder in due {
            let dispatcher = Arc::clone(&self.dispatcher);
            tasks.push(tokio::spawn(async move {
                dispatcher.deliver(&reminder, now).await
            }));
        }

        let mut reports = Vec::with_capacity(tasks.len());
        for task in tasks {
            let report = task
                .await
                .map_err(|e| CoreError::Custom(format!("dispatch task panicked: {e}")))??;
            reports.push(report);
        }
        Ok(reports)
    }

    /// Run until `shutdown` flips to true. Each interval tick runs one
    /// scheduling pass; a failed pass is logged and retried on the next.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "poll scheduler started (interval {}s)",
            self.poll_interval.as_secs()
        );
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick(Utc::now()).await {
                        Ok(reports) if !reports.is_empty() => {
                            debug!("tick dispatched {} reminder(s)", reports.len());
                        }
                        Ok(_) => {}
                        Err(e) => error!("scheduler tick aborted: {e}"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("poll scheduler stopped");
    }
}
