//! # Remindd Core Library
//!
//! This library provides the core business logic for the remindd reminder
//! daemon. It implements a CLI-first philosophy where all operations are
//! available via a standalone CLI binary, with any front-end being a thin
//! layer over the same core library.
//!
//! ## Architecture
//!
//! - **Store**: SQLite-backed persistence for events, reminders, and the
//!   per-channel delivery state machine; the store is the only writer of
//!   delivery state, and every transition is a guarded single-row update
//! - **Channels**: Trait-based notification adapters (email gateway,
//!   messaging webhook, calendar sync)
//! - **Dispatcher**: Routes due reminders to channels, reconciles outcomes,
//!   applies the retry/backoff policy with per-send timeouts
//! - **Scheduler**: Poll-based due-detection loop or one-shot timers per
//!   reminder, both driven by an explicit shutdown signal
//!
//! ## Key Components
//!
//! - [`ReminderStore`]: Event/reminder persistence and delivery transitions
//! - [`Dispatcher`]: Channel fan-out for a due reminder
//! - [`Scheduler`]: Poll-based scheduling loop
//! - [`NotificationChannel`]: Trait for delivery media
//! - [`Config`]: Application configuration management

pub mod channel;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod scheduler;
pub mod storage;
pub mod template;

pub use channel::{
    build_channels, CalendarChannel, EmailChannel, NotificationChannel, WebhookChannel,
};
pub use dispatch::{ChannelOutcome, DeliveryReport, Dispatcher};
pub use error::{ChannelError, ConfigError, CoreError, DatabaseError};
pub use model::{
    ChannelDelivery, ChannelKind, DeliveryPolicy, DeliveryStatus, Event, NewEvent, Reminder,
};
pub use scheduler::{Scheduler, TimerScheduler};
pub use storage::{Config, ReminderStore};
pub use template::Message;
