//! SQLite database holding the assistant's emails, calendar and session history.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{params, Connection, Result as SqliteResult};
use serde::Serialize;

/// Timestamps are stored as ISO-8601 UTC with second precision
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Email {
    pub id: i64,
    pub sender: String,
    pub received_at: String,
    pub subject: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarEvent {
    pub id: i64,
    pub title: String,
    pub start_ts: String,
    pub end_ts: String,
    pub attendees: String,
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> SqliteResult<Self> {
        let path = path.as_ref();
        let conn = if path.as_os_str() == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Self::init(conn)
    }

    pub fn open_in_memory() -> SqliteResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> SqliteResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;
        Ok(store)
    }

    /// Lock the connection. A poisoned lock still holds a usable connection.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn create_tables(&self) -> SqliteResult<()> {
        let conn = self.conn();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS emails (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender TEXT NOT NULL,
                received_at TEXT NOT NULL,
                subject TEXT NOT NULL,
                content TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS calendar (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                start_ts TEXT NOT NULL,
                end_ts TEXT NOT NULL,
                attendees TEXT NOT NULL DEFAULT ''
            );
            CREATE INDEX IF NOT EXISTS idx_calendar_start ON calendar(start_ts);
            CREATE TABLE IF NOT EXISTS session_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                owner TEXT NOT NULL,
                run_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                tool_calls TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_session_messages_session
                ON session_messages(session_id, owner);",
        )
    }

    pub fn insert_email(
        &self,
        sender: &str,
        received_at: &str,
        subject: &str,
        content: &str,
    ) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO emails (sender, received_at, subject, content) VALUES (?1, ?2, ?3, ?4)",
            params![sender, received_at, subject, content],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recently received emails first
    pub fn recent_emails(&self, limit: u32) -> SqliteResult<Vec<Email>> {
        self.query_emails(
            "SELECT id, sender, received_at, subject, content FROM emails
             ORDER BY received_at DESC LIMIT ?1",
            params![limit],
        )
    }

    /// Emails whose sender, subject or body mention `query`
    pub fn search_emails(&self, query: &str) -> SqliteResult<Vec<Email>> {
        let pattern = format!("%{}%", query);
        self.query_emails(
            "SELECT id, sender, received_at, subject, content FROM emails
             WHERE sender LIKE ?1 OR subject LIKE ?1 OR content LIKE ?1
             ORDER BY received_at DESC",
            params![pattern],
        )
    }

    pub fn emails_from(&self, sender: &str) -> SqliteResult<Vec<Email>> {
        let pattern = format!("%{}%", sender);
        self.query_emails(
            "SELECT id, sender, received_at, subject, content FROM emails
             WHERE sender LIKE ?1
             ORDER BY received_at DESC",
            params![pattern],
        )
    }

    fn query_emails(&self, sql: &str, params: impl rusqlite::Params) -> SqliteResult<Vec<Email>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok(Email {
                id: row.get(0)?,
                sender: row.get(1)?,
                received_at: row.get(2)?,
                subject: row.get(3)?,
                content: row.get(4)?,
            })
        })?;
        let emails = rows.collect::<SqliteResult<Vec<_>>>()?;
        Ok(emails)
    }

    pub fn insert_event(
        &self,
        title: &str,
        start_ts: &str,
        end_ts: &str,
        attendees: &str,
    ) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO calendar (title, start_ts, end_ts, attendees) VALUES (?1, ?2, ?3, ?4)",
            params![title, start_ts, end_ts, attendees],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Events starting within `[from, to]`, earliest first
    pub fn events_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> SqliteResult<Vec<CalendarEvent>> {
        self.query_events(
            "SELECT id, title, start_ts, end_ts, attendees FROM calendar
             WHERE start_ts >= ?1 AND start_ts <= ?2
             ORDER BY start_ts ASC",
            params![format_timestamp(from), format_timestamp(to)],
        )
    }

    pub fn events_by_attendee(&self, attendee: &str) -> SqliteResult<Vec<CalendarEvent>> {
        let pattern = format!("%{}%", attendee);
        self.query_events(
            "SELECT id, title, start_ts, end_ts, attendees FROM calendar
             WHERE attendees LIKE ?1
             ORDER BY start_ts ASC",
            params![pattern],
        )
    }

    pub fn all_events(&self) -> SqliteResult<Vec<CalendarEvent>> {
        self.query_events(
            "SELECT id, title, start_ts, end_ts, attendees FROM calendar ORDER BY start_ts ASC",
            [],
        )
    }

    fn query_events(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> SqliteResult<Vec<CalendarEvent>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok(CalendarEvent {
                id: row.get(0)?,
                title: row.get(1)?,
                start_ts: row.get(2)?,
                end_ts: row.get(3)?,
                attendees: row.get(4)?,
            })
        })?;
        let events = rows.collect::<SqliteResult<Vec<_>>>()?;
        Ok(events)
    }

    /// Fill empty tables with fifteen sample emails and three events in the week after `now`.
    ///
    /// Returns the number of emails and events inserted; tables that already
    /// hold rows are left untouched.
    pub fn seed_demo_data(&self, now: DateTime<Utc>) -> SqliteResult<(usize, usize)> {
        let (email_count, event_count): (i64, i64) = {
            let conn = self.conn();
            let emails = conn.query_row("SELECT COUNT(*) FROM emails", [], |row| row.get(0))?;
            let events = conn.query_row("SELECT COUNT(*) FROM calendar", [], |row| row.get(0))?;
            (emails, events)
        };

        let mut seeded = (0, 0);
        if email_count == 0 {
            let base = Utc
                .with_ymd_and_hms(2025, 11, 2, 16, 0, 0)
                .single()
                .unwrap_or(now);
            for i in 1..=15 {
                self.insert_email(
                    &format!("User{i} <user{i}@example.com>"),
                    &format_timestamp(base + Duration::minutes(i)),
                    &format!("Sample subject {i}"),
                    &format!("Simple content body for message {i} with a name like Dana or Chris #{i}."),
                )?;
                seeded.0 += 1;
            }
        }

        if event_count == 0 {
            let events = [
                ("Standup", Duration::days(1) + Duration::hours(2), 30, "Dana, Chris"),
                ("Client call", Duration::days(3) + Duration::hours(1), 45, "Alex <alex@client.com>"),
                ("Interview", Duration::days(5) + Duration::hours(4), 30, "Dana, Chris"),
            ];
            for (title, offset, minutes, attendees) in events {
                let start = now + offset;
                let end = start + Duration::minutes(minutes);
                self.insert_event(
                    title,
                    &format_timestamp(start),
                    &format_timestamp(end),
                    attendees,
                )?;
                seeded.1 += 1;
            }
        }

        Ok(seeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_emails_queries() -> SqliteResult<()> {
        let store = Store::open_in_memory()?;
        store.insert_email(
            "Dana <dana@example.com>",
            "2025-11-02T16:01:00Z",
            "Quarterly plan",
            "Can we meet on Thursday?",
        )?;
        store.insert_email(
            "Chris <chris@example.com>",
            "2025-11-02T17:00:00Z",
            "Lunch",
            "Pizza or sushi?",
        )?;

        let recent = store.recent_emails(1)?;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].subject, "Lunch");

        let from_dana = store.emails_from("Dana")?;
        assert_eq!(from_dana.len(), 1);
        assert_eq!(from_dana[0].subject, "Quarterly plan");

        let thursday = store.search_emails("thursday")?;
        assert_eq!(thursday.len(), 1);
        assert!(store.search_emails("nothing like this")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_event_queries() -> SqliteResult<()> {
        let store = Store::open_in_memory()?;
        let now = Utc::now();
        store.insert_event(
            "Standup",
            &format_timestamp(now + Duration::days(1)),
            &format_timestamp(now + Duration::days(1) + Duration::minutes(30)),
            "Dana, Chris",
        )?;
        store.insert_event(
            "Offsite",
            &format_timestamp(now + Duration::days(30)),
            &format_timestamp(now + Duration::days(31)),
            "Alex",
        )?;

        let upcoming = store.events_between(now, now + Duration::days(7))?;
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].title, "Standup");

        let with_chris = store.events_by_attendee("Chris")?;
        assert_eq!(with_chris.len(), 1);

        let all = store.all_events()?;
        assert_eq!(
            all.iter().map(|e| e.title.as_str()).collect::<Vec<_>>(),
            vec!["Standup", "Offsite"]
        );
        Ok(())
    }

    #[test]
    fn test_seed_demo_data_only_fills_empty_tables() -> SqliteResult<()> {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("intern.db"))?;
        let now = Utc::now();

        assert_eq!(store.seed_demo_data(now)?, (15, 3));
        assert_eq!(store.seed_demo_data(now)?, (0, 0));
        assert_eq!(store.recent_emails(100)?.len(), 15);
        assert_eq!(store.events_by_attendee("Dana")?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_format_timestamp() {
        let ts = Utc.with_ymd_and_hms(2025, 11, 3, 18, 0, 0).unwrap();
        assert_eq!(format_timestamp(ts), "2025-11-03T18:00:00Z");
    }
}
