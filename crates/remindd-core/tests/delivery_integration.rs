//! E2E tests for the scheduling and dispatch pipeline.
//!
//! Channels are mocked with scripted outcomes so ticks can be driven
//! deterministically: no wall-clock polling, every `tick(now)` is explicit.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Notify;

use remindd_core::{
    ChannelError, ChannelKind, DeliveryPolicy, DeliveryStatus, Dispatcher, Message, NewEvent,
    NotificationChannel, ReminderStore, Scheduler, TimerScheduler,
};

// ============================================================================
// Mock channel
// ============================================================================

#[derive(Clone, Copy)]
enum Step {
    Succeed,
    FailTransient,
    FailTerminal,
    Hang,
    AwaitRelease,
}

struct MockChannel {
    kind: ChannelKind,
    steps: Mutex<VecDeque<Step>>,
    sends: Mutex<Vec<(String, String)>>,
    release: Notify,
}

impl MockChannel {
    fn new(kind: ChannelKind, steps: &[Step]) -> Arc<Self> {
        Arc::new(Self {
            kind,
            steps: Mutex::new(steps.iter().copied().collect()),
            sends: Mutex::new(Vec::new()),
            release: Notify::new(),
        })
    }

    fn send_count(&self) -> usize {
        self.sends.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationChannel for MockChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(&self, recipient: &str, message: &Message) -> Result<(), ChannelError> {
        self.sends
            .lock()
            .unwrap()
            .push((recipient.to_string(), message.subject.clone()));
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Succeed);
        match step {
            Step::Succeed => Ok(()),
            Step::FailTransient => Err(ChannelError::transient("simulated network failure")),
            Step::FailTerminal => Err(ChannelError::terminal("simulated invalid recipient")),
            Step::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Step::AwaitRelease => {
                self.release.notified().await;
                Ok(())
            }
        }
    }
}

// ============================================================================
// Test helpers
// ============================================================================

fn policy(max_attempts: u32, base_backoff_secs: u64, send_timeout_ms: u64) -> DeliveryPolicy {
    DeliveryPolicy {
        max_attempts,
        base_backoff: StdDuration::from_secs(base_backoff_secs),
        send_timeout: StdDuration::from_millis(send_timeout_ms),
    }
}

fn add_event(store: &ReminderStore) -> i64 {
    store
        .add_event(&NewEvent {
            title: "Submit report".into(),
            description: "Quarterly numbers".into(),
            start_time: Utc::now() + Duration::hours(1),
            end_time: Utc::now() + Duration::hours(2),
        })
        .unwrap()
}

fn add_due_reminder(
    store: &ReminderStore,
    event_id: i64,
    recipients: &[(ChannelKind, &str)],
) -> i64 {
    let recipients: BTreeMap<ChannelKind, String> = recipients
        .iter()
        .map(|(k, r)| (*k, r.to_string()))
        .collect();
    store
        .add_reminder(event_id, Utc::now() - Duration::minutes(5), &recipients)
        .unwrap()
}

fn dispatcher(
    store: &ReminderStore,
    channels: &[Arc<MockChannel>],
    policy: DeliveryPolicy,
) -> Arc<Dispatcher> {
    let map: BTreeMap<ChannelKind, Arc<dyn NotificationChannel>> = channels
        .iter()
        .map(|c| (c.kind, Arc::clone(c) as Arc<dyn NotificationChannel>))
        .collect();
    Arc::new(Dispatcher::new(store.clone(), map, policy))
}

fn scheduler(store: &ReminderStore, dispatcher: Arc<Dispatcher>) -> Scheduler {
    Scheduler::new(store.clone(), dispatcher, StdDuration::from_secs(60))
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn delivered_once_across_ticks() {
    let store = ReminderStore::open_memory().unwrap();
    let event_id = add_event(&store);
    let id = add_due_reminder(&store, event_id, &[(ChannelKind::Email, "a@example.com")]);

    let email = MockChannel::new(ChannelKind::Email, &[]);
    let sched = scheduler(&store, dispatcher(&store, &[email.clone()], policy(5, 0, 1000)));

    let reports = sched.tick(Utc::now()).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(email.send_count(), 1);

    // One poll interval later: nothing left to do.
    let reports = sched.tick(Utc::now() + Duration::seconds(60)).await.unwrap();
    assert!(reports.is_empty());
    assert_eq!(email.send_count(), 1);

    let reminder = store.get_reminder(id).unwrap();
    let delivery = &reminder.deliveries[&ChannelKind::Email];
    assert_eq!(delivery.status, DeliveryStatus::Delivered);
    assert_eq!(delivery.attempts, 1);

    // The rendered message carries the event title.
    let (recipient, subject) = &email.sends.lock().unwrap()[0];
    assert_eq!(recipient, "a@example.com");
    assert!(subject.contains("Submit report"));
}

#[tokio::test]
async fn partial_failure_retries_only_failed_channel() {
    let store = ReminderStore::open_memory().unwrap();
    let event_id = add_event(&store);
    let id = add_due_reminder(
        &store,
        event_id,
        &[
            (ChannelKind::Email, "a@example.com"),
            (ChannelKind::Messaging, "https://hooks.example.com/t"),
        ],
    );

    let email = MockChannel::new(ChannelKind::Email, &[]);
    let messaging = MockChannel::new(ChannelKind::Messaging, &[Step::FailTransient]);
    let sched = scheduler(
        &store,
        dispatcher(&store, &[email.clone(), messaging.clone()], policy(5, 0, 1000)),
    );

    sched.tick(Utc::now()).await.unwrap();
    assert_eq!(email.send_count(), 1);
    assert_eq!(messaging.send_count(), 1);

    // Next tick retries only the failed channel; the delivered one is never
    // re-invoked.
    sched.tick(Utc::now() + Duration::seconds(60)).await.unwrap();
    assert_eq!(email.send_count(), 1);
    assert_eq!(messaging.send_count(), 2);

    let reminder = store.get_reminder(id).unwrap();
    assert!(reminder.fully_delivered());
}

#[tokio::test]
async fn terminal_after_max_attempts() {
    let store = ReminderStore::open_memory().unwrap();
    let event_id = add_event(&store);
    let id = add_due_reminder(
        &store,
        event_id,
        &[(ChannelKind::Messaging, "https://hooks.example.com/t")],
    );

    let messaging = MockChannel::new(
        ChannelKind::Messaging,
        &[Step::FailTransient, Step::FailTransient, Step::FailTransient],
    );
    let sched = scheduler(&store, dispatcher(&store, &[messaging.clone()], policy(2, 0, 1000)));

    sched.tick(Utc::now()).await.unwrap();
    sched.tick(Utc::now() + Duration::seconds(60)).await.unwrap();
    // Budget of 2 spent: frozen, no further send on later ticks.
    sched.tick(Utc::now() + Duration::seconds(120)).await.unwrap();
    assert_eq!(messaging.send_count(), 2);

    // Still listable with the recorded error for diagnosis.
    let reminder = store.get_reminder(id).unwrap();
    let delivery = &reminder.deliveries[&ChannelKind::Messaging];
    assert_eq!(delivery.status, DeliveryStatus::Terminal);
    assert_eq!(delivery.attempts, 2);
    assert_eq!(
        delivery.last_error.as_deref(),
        Some("transient channel failure: simulated network failure")
    );
    assert!(store.list_reminders().unwrap().iter().any(|r| r.id == id));
}

#[tokio::test]
async fn terminal_error_short_circuits_retries() {
    let store = ReminderStore::open_memory().unwrap();
    let event_id = add_event(&store);
    let id = add_due_reminder(&store, event_id, &[(ChannelKind::Email, "a@example.com")]);

    let email = MockChannel::new(ChannelKind::Email, &[Step::FailTerminal]);
    let sched = scheduler(&store, dispatcher(&store, &[email.clone()], policy(5, 0, 1000)));

    sched.tick(Utc::now()).await.unwrap();
    sched.tick(Utc::now() + Duration::seconds(60)).await.unwrap();

    // One attempt, not five: non-retryable errors skip the backoff schedule.
    assert_eq!(email.send_count(), 1);
    let reminder = store.get_reminder(id).unwrap();
    assert_eq!(
        reminder.deliveries[&ChannelKind::Email].status,
        DeliveryStatus::Terminal
    );
}

#[tokio::test]
async fn timeout_twice_then_success_records_three_attempts() {
    let store = ReminderStore::open_memory().unwrap();
    let event_id = add_event(&store);
    let id = add_due_reminder(&store, event_id, &[(ChannelKind::Email, "a@example.com")]);

    let email = MockChannel::new(ChannelKind::Email, &[Step::Hang, Step::Hang, Step::Succeed]);
    // 50ms dispatcher-boundary timeout; hung sends must not stall the tick.
    let sched = scheduler(&store, dispatcher(&store, &[email.clone()], policy(5, 0, 50)));

    sched.tick(Utc::now()).await.unwrap();
    sched.tick(Utc::now() + Duration::seconds(60)).await.unwrap();
    sched.tick(Utc::now() + Duration::seconds(120)).await.unwrap();

    assert_eq!(email.send_count(), 3);
    let reminder = store.get_reminder(id).unwrap();
    let delivery = &reminder.deliveries[&ChannelKind::Email];
    assert_eq!(delivery.status, DeliveryStatus::Delivered);
    assert_eq!(delivery.attempts, 3);
}

#[tokio::test]
async fn backoff_gates_next_attempt() {
    let store = ReminderStore::open_memory().unwrap();
    let event_id = add_event(&store);
    add_due_reminder(&store, event_id, &[(ChannelKind::Email, "a@example.com")]);

    let email = MockChannel::new(ChannelKind::Email, &[Step::FailTransient]);
    // 1 failed attempt * 120s base: not eligible at +60s, eligible at +121s.
    let sched = scheduler(&store, dispatcher(&store, &[email.clone()], policy(5, 120, 1000)));

    let t0 = Utc::now();
    sched.tick(t0).await.unwrap();
    assert_eq!(email.send_count(), 1);

    sched.tick(t0 + Duration::seconds(60)).await.unwrap();
    assert_eq!(email.send_count(), 1);

    sched.tick(t0 + Duration::seconds(121)).await.unwrap();
    assert_eq!(email.send_count(), 2);
}

#[tokio::test]
async fn due_ordering_ties_broken_by_id() {
    let store = ReminderStore::open_memory().unwrap();
    let event_id = add_event(&store);
    let t = Utc::now() - Duration::minutes(5);

    // Occupy ids 1..=5, then drop 1, 2, and 4 so ids 3 and 5 share a firing
    // time.
    let mut ids = Vec::new();
    for _ in 0..5 {
        let mut recipients = BTreeMap::new();
        recipients.insert(ChannelKind::Email, "a@example.com".to_string());
        ids.push(store.add_reminder(event_id, t, &recipients).unwrap());
    }
    store.delete_reminder(ids[0]).unwrap();
    store.delete_reminder(ids[1]).unwrap();
    store.delete_reminder(ids[3]).unwrap();

    let due = store.due(Utc::now(), &policy(5, 0, 1000)).unwrap();
    let due_ids: Vec<i64> = due.iter().map(|r| r.id).collect();
    assert_eq!(due_ids, vec![ids[2], ids[4]]);
    assert!(due_ids[0] < due_ids[1]);
}

#[tokio::test]
async fn delete_mid_flight_does_not_resurrect_row() {
    let store = ReminderStore::open_memory().unwrap();
    let event_id = add_event(&store);
    let id = add_due_reminder(&store, event_id, &[(ChannelKind::Email, "a@example.com")]);

    let email = MockChannel::new(ChannelKind::Email, &[Step::AwaitRelease]);
    let sched = scheduler(&store, dispatcher(&store, &[email.clone()], policy(5, 0, 60_000)));

    let tick = tokio::spawn({
        let now = Utc::now();
        async move { sched.tick(now).await }
    });
    // Let the send start, delete the row out from under it, then let the
    // send finish.
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    assert!(store.delete_reminder(id).unwrap());
    email.release.notify_one();

    tick.await.unwrap().unwrap();
    assert!(matches!(
        store.get_reminder(id),
        Err(remindd_core::DatabaseError::NotFound { .. })
    ));
    assert!(store.list_reminders().unwrap().is_empty());
}

#[tokio::test]
async fn unconfigured_channel_surfaces_as_failure() {
    let store = ReminderStore::open_memory().unwrap();
    let event_id = add_event(&store);
    let id = add_due_reminder(
        &store,
        event_id,
        &[(ChannelKind::Messaging, "https://hooks.example.com/t")],
    );

    // Dispatcher carries no messaging channel.
    let sched = scheduler(&store, dispatcher(&store, &[], policy(2, 0, 1000)));
    sched.tick(Utc::now()).await.unwrap();
    sched.tick(Utc::now() + Duration::seconds(60)).await.unwrap();

    let reminder = store.get_reminder(id).unwrap();
    let delivery = &reminder.deliveries[&ChannelKind::Messaging];
    assert_eq!(delivery.status, DeliveryStatus::Terminal);
    assert!(delivery
        .last_error
        .as_deref()
        .unwrap()
        .contains("no messaging channel configured"));
}

#[tokio::test]
async fn restart_recovers_missed_reminders() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("remindd.db");

    let id = {
        let store = ReminderStore::open_at(&path).unwrap();
        let event_id = add_event(&store);
        add_due_reminder(&store, event_id, &[(ChannelKind::Email, "a@example.com")])
    };

    // Fresh process: a new store over the same file must see the missed
    // reminder on the first tick.
    let store = ReminderStore::open_at(&path).unwrap();
    let email = MockChannel::new(ChannelKind::Email, &[]);
    let sched = scheduler(&store, dispatcher(&store, &[email.clone()], policy(5, 0, 1000)));

    sched.tick(Utc::now()).await.unwrap();
    assert_eq!(email.send_count(), 1);
    assert!(store.get_reminder(id).unwrap().fully_delivered());
}

#[tokio::test]
async fn timer_scheduler_fires_past_due_and_rearms_idempotently() {
    let store = ReminderStore::open_memory().unwrap();
    let event_id = add_event(&store);
    let id = add_due_reminder(&store, event_id, &[(ChannelKind::Email, "a@example.com")]);
    let reminder = store.get_reminder(id).unwrap();

    let email = MockChannel::new(ChannelKind::Email, &[]);
    let timers = TimerScheduler::new(
        store.clone(),
        dispatcher(&store, &[email.clone()], policy(5, 0, 1000)),
    );

    // Double-arm without cancelling: the second arm replaces the first
    // timer, so exactly one dispatch attempt runs.
    timers.arm(&reminder);
    timers.arm(&reminder);

    tokio::time::sleep(StdDuration::from_millis(200)).await;
    assert_eq!(email.send_count(), 1);
    assert!(store.get_reminder(id).unwrap().fully_delivered());
}

#[tokio::test]
async fn timer_cancel_prevents_dispatch() {
    let store = ReminderStore::open_memory().unwrap();
    let event_id = add_event(&store);
    let id = add_due_reminder(&store, event_id, &[(ChannelKind::Email, "a@example.com")]);
    let reminder = store.get_reminder(id).unwrap();

    let email = MockChannel::new(ChannelKind::Email, &[]);
    let timers = TimerScheduler::new(
        store.clone(),
        dispatcher(&store, &[email.clone()], policy(5, 0, 1000)),
    );

    timers.arm(&reminder);
    timers.cancel(id);

    tokio::time::sleep(StdDuration::from_millis(200)).await;
    assert_eq!(email.send_count(), 0);
}
