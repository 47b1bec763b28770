//! SQLite-based storage for events, reminders, and delivery state.
//!
//! The store is the only writer of delivery state. Every state transition is
//! a guarded single-row UPDATE on the `deliveries` table, which is what makes
//! `mark_channel_delivered` a compare-and-set: two ticks racing on the same
//! channel resolve to exactly one winning transition.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{data_dir, migrations};
use crate::error::DatabaseError;
use crate::model::{
    ChannelDelivery, ChannelKind, DeliveryPolicy, DeliveryStatus, Event, NewEvent, Reminder,
};

// === Helper Functions ===

/// Format delivery status for database storage
fn format_status(status: DeliveryStatus) -> &'static str {
    match status {
        DeliveryStatus::Pending => "pending",
        DeliveryStatus::Delivered => "delivered",
        DeliveryStatus::Failed => "failed",
        DeliveryStatus::Terminal => "terminal",
    }
}

/// Parse delivery status from database string
fn parse_status(status_str: &str) -> DeliveryStatus {
    match status_str {
        "delivered" => DeliveryStatus::Delivered,
        "failed" => DeliveryStatus::Failed,
        "terminal" => DeliveryStatus::Terminal,
        _ => DeliveryStatus::Pending,
    }
}

/// Parse datetime from RFC3339 string with fallback to current time
fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_datetime_opt(dt_str: Option<String>) -> Option<DateTime<Utc>> {
    dt_str.map(|s| parse_datetime_fallback(&s))
}

/// Build an Event from a database row
fn row_to_event(row: &rusqlite::Row) -> Result<Event, rusqlite::Error> {
    let start_time_str: String = row.get(3)?;
    let end_time_str: String = row.get(4)?;
    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        start_time: parse_datetime_fallback(&start_time_str),
        end_time: parse_datetime_fallback(&end_time_str),
    })
}

/// SQLite database for reminder storage.
///
/// Handles are cheap to clone; the scheduler, dispatcher, and CLI share one
/// connection behind a mutex, which keeps every state-mutating operation
/// linearizable.
#[derive(Clone)]
pub struct ReminderStore {
    conn: Arc<Mutex<Connection>>,
}

impl ReminderStore {
    /// Open the database at `~/.config/remindd/remindd.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let dir = data_dir().map_err(|e| DatabaseError::Unavailable(e.to_string()))?;
        Self::open_at(dir.join("remindd.db"))
    }

    /// Open the database at an explicit path.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: PathBuf::from(path),
            source,
        })?;
        Self::init(conn)
    }

    /// Open an in-memory database (tests, ephemeral runs).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory().map_err(|source| DatabaseError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, DatabaseError> {
        // Cascade deletes rely on FK enforcement.
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(DatabaseError::from)?;
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn
            .lock()
            .map_err(|_| DatabaseError::Unavailable("connection mutex poisoned".into()))
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Insert an event and return its id.
    pub fn add_event(&self, event: &NewEvent) -> Result<i64, DatabaseError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO events (title, description, start_time, end_time)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                event.title,
                event.description,
                event.start_time.to_rfc3339(),
                event.end_time.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_event(&self, id: i64) -> Result<Event, DatabaseError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, description, start_time, end_time FROM events WHERE id = ?1",
        )?;
        match stmt.query_row(params![id], row_to_event) {
            Ok(event) => Ok(event),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(DatabaseError::NotFound {
                entity: "event",
                id,
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_events(&self) -> Result<Vec<Event>, DatabaseError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, description, start_time, end_time
             FROM events ORDER BY start_time ASC, id ASC",
        )?;
        let rows = stmt.query_map([], row_to_event)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// Delete an event. Cascades to its reminders and their delivery rows.
    pub fn delete_event(&self, id: i64) -> Result<bool, DatabaseError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM events WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    // ── Reminders ────────────────────────────────────────────────────

    /// Insert a reminder with one pending delivery row per recipient.
    ///
    /// # Errors
    /// `DatabaseError::NotFound` if the event does not exist.
    pub fn add_reminder(
        &self,
        event_id: i64,
        firing_time: DateTime<Utc>,
        recipients: &BTreeMap<ChannelKind, String>,
    ) -> Result<i64, DatabaseError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let event_exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM events WHERE id = ?1)",
            params![event_id],
            |row| row.get(0),
        )?;
        if !event_exists {
            return Err(DatabaseError::NotFound {
                entity: "event",
                id: event_id,
            });
        }

        tx.execute(
            "INSERT INTO reminders (event_id, firing_time, created_at)
             VALUES (?1, ?2, ?3)",
            params![
                event_id,
                firing_time.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        let reminder_id = tx.last_insert_rowid();

        for (kind, recipient) in recipients {
            tx.execute(
                "INSERT INTO deliveries (reminder_id, channel, recipient, status)
                 VALUES (?1, ?2, ?3, 'pending')",
                params![reminder_id, kind.as_str(), recipient],
            )?;
        }

        tx.commit()?;
        Ok(reminder_id)
    }

    pub fn get_reminder(&self, id: i64) -> Result<Reminder, DatabaseError> {
        let conn = self.lock()?;
        Self::load_reminder(&conn, id)?.ok_or(DatabaseError::NotFound {
            entity: "reminder",
            id,
        })
    }

    /// All reminders, ascending firing time, ties broken by id.
    pub fn list_reminders(&self) -> Result<Vec<Reminder>, DatabaseError> {
        let conn = self.lock()?;
        let ids = Self::reminder_ids(
            &conn,
            "SELECT id FROM reminders ORDER BY firing_time ASC, id ASC",
            params![],
        )?;
        Self::load_reminders(&conn, &ids)
    }

    /// Reminders that are due at `now`: firing time has passed and at least
    /// one channel is pending, or failed and retry-eligible under `policy`.
    ///
    /// Ordering is deterministic and stable under repeated calls: ascending
    /// firing time, ties broken by ascending id. Reminders whose channels
    /// are all delivered or terminally failed are never returned.
    pub fn due(
        &self,
        now: DateTime<Utc>,
        policy: &DeliveryPolicy,
    ) -> Result<Vec<Reminder>, DatabaseError> {
        let conn = self.lock()?;
        let ids = Self::reminder_ids(
            &conn,
            "SELECT r.id
             FROM reminders r
             WHERE r.firing_time <= ?1
               AND EXISTS (
                   SELECT 1 FROM deliveries d
                   WHERE d.reminder_id = r.id
                     AND d.status IN ('pending', 'failed')
               )
             ORDER BY r.firing_time ASC, r.id ASC",
            params![now.to_rfc3339()],
        )?;
        let reminders = Self::load_reminders(&conn, &ids)?;
        // Backoff gating happens here rather than in SQL: text timestamps
        // don't add durations well, and the row count at this point is small.
        Ok(reminders
            .into_iter()
            .filter(|r| r.has_actionable_channel(now, policy))
            .collect())
    }

    pub fn delete_reminder(&self, id: i64) -> Result<bool, DatabaseError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM reminders WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    // ── Delivery state transitions ───────────────────────────────────
    //
    // Every transition is guarded on the current status, and operations on a
    // deleted reminder id are no-ops rather than errors: an in-flight
    // dispatch finishing after a delete must not resurrect the row.

    /// Compare-and-set a channel to delivered.
    ///
    /// Only transitions `pending`/`failed` -> `delivered`; returns whether
    /// this call performed the transition. A repeat call, a racing tick, or
    /// a deleted reminder all land in the `false` arm.
    pub fn mark_channel_delivered(
        &self,
        reminder_id: i64,
        kind: ChannelKind,
    ) -> Result<bool, DatabaseError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE deliveries
             SET status = 'delivered', attempts = attempts + 1,
                 last_error = NULL, last_attempt_at = ?3
             WHERE reminder_id = ?1 AND channel = ?2
               AND status IN ('pending', 'failed')",
            params![reminder_id, kind.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    /// Record a failed attempt: increments the counter, stores the error,
    /// and freezes the channel in `terminal` once `max_attempts` is reached.
    ///
    /// Returns the resulting `(status, attempts)`, or `None` when the
    /// transition did not apply (deleted reminder, or channel already
    /// delivered/terminal).
    pub fn mark_channel_failed(
        &self,
        reminder_id: i64,
        kind: ChannelKind,
        error: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Option<(DeliveryStatus, u32)>, DatabaseError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE deliveries
             SET attempts = attempts + 1,
                 last_error = ?3,
                 last_attempt_at = ?4,
                 status = CASE WHEN attempts + 1 >= ?5 THEN 'terminal' ELSE 'failed' END
             WHERE reminder_id = ?1 AND channel = ?2
               AND status IN ('pending', 'failed')",
            params![
                reminder_id,
                kind.as_str(),
                error,
                now.to_rfc3339(),
                max_attempts,
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let (status_str, attempts): (String, u32) = conn.query_row(
            "SELECT status, attempts FROM deliveries
             WHERE reminder_id = ?1 AND channel = ?2",
            params![reminder_id, kind.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(Some((parse_status(&status_str), attempts)))
    }

    /// Freeze a channel in terminal failure immediately, bypassing the
    /// remaining retry budget (non-retryable send errors).
    pub fn mark_channel_terminal(
        &self,
        reminder_id: i64,
        kind: ChannelKind,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE deliveries
             SET attempts = attempts + 1,
                 last_error = ?3,
                 last_attempt_at = ?4,
                 status = 'terminal'
             WHERE reminder_id = ?1 AND channel = ?2
               AND status IN ('pending', 'failed')",
            params![reminder_id, kind.as_str(), error, now.to_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    /// Operator re-arm: reset a failed or terminally failed channel back to
    /// pending with a fresh retry budget.
    pub fn rearm_channel(&self, reminder_id: i64, kind: ChannelKind) -> Result<bool, DatabaseError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE deliveries
             SET status = 'pending', attempts = 0, last_error = NULL, last_attempt_at = NULL
             WHERE reminder_id = ?1 AND channel = ?2
               AND status IN ('failed', 'terminal')",
            params![reminder_id, kind.as_str()],
        )?;
        Ok(changed > 0)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn reminder_ids(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<i64>, DatabaseError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| row.get::<_, i64>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    fn load_reminders(conn: &Connection, ids: &[i64]) -> Result<Vec<Reminder>, DatabaseError> {
        let mut reminders = Vec::with_capacity(ids.len());
        for &id in ids {
            // Deleted between the id scan and the load: skip, not an error.
            if let Some(reminder) = Self::load_reminder(conn, id)? {
                reminders.push(reminder);
            }
        }
        Ok(reminders)
    }

    fn load_reminder(conn: &Connection, id: i64) -> Result<Option<Reminder>, DatabaseError> {
        let mut stmt = conn.prepare(
            "SELECT id, event_id, firing_time, created_at FROM reminders WHERE id = ?1",
        )?;
        let row = stmt.query_row(params![id], |row| {
            let firing_time_str: String = row.get(2)?;
            let created_at_str: String = row.get(3)?;
            Ok(Reminder {
                id: row.get(0)?,
                event_id: row.get(1)?,
                firing_time: parse_datetime_fallback(&firing_time_str),
                created_at: parse_datetime_fallback(&created_at_str),
                deliveries: BTreeMap::new(),
            })
        });
        let mut reminder = match row {
            Ok(r) => r,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut stmt = conn.prepare(
            "SELECT channel, recipient, status, attempts, last_error, last_attempt_at
             FROM deliveries WHERE reminder_id = ?1",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            let channel_str: String = row.get(0)?;
            let status_str: String = row.get(2)?;
            let last_attempt_str: Option<String> = row.get(5)?;
            Ok((
                channel_str,
                ChannelDelivery {
                    recipient: row.get(1)?,
                    status: parse_status(&status_str),
                    attempts: row.get(3)?,
                    last_error: row.get(4)?,
                    last_attempt_at: parse_datetime_opt(last_attempt_str),
                },
            ))
        })?;
        for row in rows {
            let (channel_str, delivery) = row?;
            if let Some(kind) = ChannelKind::parse(&channel_str) {
                reminder.deliveries.insert(kind, delivery);
            }
        }
        Ok(Some(reminder))
    }
}
