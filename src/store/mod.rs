//! Event storage with SQLite
//!
//! Append-only: rows are inserted once and never updated or deleted.
//! Duplicate keys are absorbed by `ON CONFLICT DO NOTHING`, so replaying a
//! batch is harmless while any other constraint failure still surfaces.

mod schema;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

use crate::event::{EventKind, Message, StatusChange};

pub use schema::SCHEMA;

pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("Failed to apply schema")?;
        Ok(())
    }

    // ============================================
    // RAW EVENTS
    // ============================================

    /// Insert a batch of messages in one transaction.
    ///
    /// Returns how many rows were actually written; already-known
    /// `(system_id, timestamp)` pairs are skipped.
    pub fn insert_messages(&self, messages: &[Message]) -> Result<usize> {
        if messages.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO messages (system_id, from_id, site_id, timestamp)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(system_id, timestamp) DO NOTHING",
            )?;
            for msg in messages {
                inserted += stmt.execute(params![
                    msg.system_id,
                    msg.from_id,
                    msg.site_id,
                    msg.timestamp.timestamp(),
                ])?;
            }
        }
        tx.commit().context("Failed to commit message batch")?;
        Ok(inserted)
    }

    /// Insert a batch of status changes in one transaction.
    pub fn insert_status_changes(&self, statuses: &[StatusChange]) -> Result<usize> {
        if statuses.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO status_changes (system_id, from_id, site_id, online, timestamp)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(system_id, timestamp) DO NOTHING",
            )?;
            for status in statuses {
                inserted += stmt.execute(params![
                    status.system_id,
                    status.from_id,
                    status.site_id,
                    status.online,
                    status.timestamp.timestamp(),
                ])?;
            }
        }
        tx.commit().context("Failed to commit status batch")?;
        Ok(inserted)
    }

    /// Latest status change for `site_id` at or before `at`.
    ///
    /// With `online_only` the search is restricted to `online = 1` rows,
    /// which is the as-of lookup used for chat/email classification.
    /// Rows sharing the latest timestamp resolve online first, then by
    /// lowest `system_id`.
    pub fn latest_status_at_or_before(
        &self,
        site_id: i64,
        at: DateTime<Utc>,
        online_only: bool,
    ) -> Result<Option<StatusChange>> {
        let sql = if online_only {
            "SELECT system_id, from_id, site_id, online, timestamp
             FROM status_changes
             WHERE site_id = ?1 AND online = 1 AND timestamp <= ?2
             ORDER BY timestamp DESC, system_id ASC
             LIMIT 1"
        } else {
            "SELECT system_id, from_id, site_id, online, timestamp
             FROM status_changes
             WHERE site_id = ?1 AND timestamp <= ?2
             ORDER BY timestamp DESC, online DESC, system_id ASC
             LIMIT 1"
        };

        let mut stmt = self.conn.prepare_cached(sql)?;
        stmt.query_row(params![site_id, at.timestamp()], status_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Number of distinct senders for a site, from messages (visitors) or
    /// status changes (operators)
    pub fn count_distinct_senders(&self, site_id: i64, kind: EventKind) -> Result<u64> {
        let sql = match kind {
            EventKind::Message => "SELECT COUNT(DISTINCT from_id) FROM messages WHERE site_id = ?",
            EventKind::Status => {
                "SELECT COUNT(DISTINCT from_id) FROM status_changes WHERE site_id = ?"
            }
        };

        let mut stmt = self.conn.prepare_cached(sql)?;
        let n: i64 = stmt.query_row(params![site_id], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Every message that has no classification yet, oldest first
    pub fn unclassified_messages(&self) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT m.system_id, m.from_id, m.site_id, m.timestamp
               FROM messages m
               LEFT JOIN classifications c
                 ON c.message_system_id = m.system_id
                AND c.message_timestamp = m.timestamp
               WHERE c.message_system_id IS NULL
               ORDER BY m.site_id, m.timestamp"#,
        )?;

        let rows = stmt.query_map([], message_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ============================================
    // SITES
    // ============================================

    /// Distinct site ids across messages and status changes
    pub fn distinct_site_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT site_id FROM messages
             UNION
             SELECT site_id FROM status_changes
             ORDER BY site_id",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Bring the sites table up to date with the raw event tables.
    ///
    /// Returns the number of newly added sites.
    pub fn rebuild_sites(&self) -> Result<usize> {
        let site_ids = self.distinct_site_ids()?;

        let tx = self.conn.unchecked_transaction()?;
        let mut added = 0;
        {
            let mut stmt = tx.prepare_cached("INSERT OR IGNORE INTO sites (site_id) VALUES (?)")?;
            for site_id in site_ids {
                added += stmt.execute(params![site_id])?;
            }
        }
        tx.commit().context("Failed to commit sites")?;
        Ok(added)
    }

    pub fn sites(&self) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT site_id FROM sites ORDER BY site_id ASC")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ============================================
    // CLASSIFICATIONS
    // ============================================

    /// Insert classifications that do not exist yet, in one transaction.
    ///
    /// Existing rows are left untouched; returns how many were written.
    pub fn insert_classifications(&self, classifications: &[Classification]) -> Result<usize> {
        if classifications.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO classifications (message_system_id, message_timestamp, site_id, is_chat)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(message_system_id, message_timestamp) DO NOTHING",
            )?;
            for c in classifications {
                inserted += stmt.execute(params![
                    c.message_system_id,
                    c.message_timestamp.timestamp(),
                    c.site_id,
                    c.is_chat,
                ])?;
            }
        }
        tx.commit().context("Failed to commit classifications")?;
        Ok(inserted)
    }

    pub fn classification_for(
        &self,
        system_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<Classification>> {
        self.conn
            .query_row(
                "SELECT message_system_id, message_timestamp, site_id, is_chat
                 FROM classifications
                 WHERE message_system_id = ? AND message_timestamp = ?",
                params![system_id, timestamp.timestamp()],
                |row| {
                    Ok(Classification {
                        message_system_id: row.get(0)?,
                        message_timestamp: timestamp_from_row(row, 1)?,
                        site_id: row.get(2)?,
                        is_chat: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// (emails, chats) classified for a site
    pub fn classification_counts(&self, site_id: i64) -> Result<(u64, u64)> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT COALESCE(SUM(CASE WHEN is_chat = 0 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN is_chat = 1 THEN 1 ELSE 0 END), 0)
             FROM classifications
             WHERE site_id = ?",
        )?;
        let (emails, chats): (i64, i64) =
            stmt.query_row(params![site_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok((emails as u64, chats as u64))
    }

    // ============================================
    // QUERIES
    // ============================================

    pub fn stats(&self) -> Result<StoreStats> {
        let count = |table: &str| -> Result<u64> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            Ok(n as u64)
        };

        Ok(StoreStats {
            messages: count("messages")?,
            status_changes: count("status_changes")?,
            sites: count("sites")?,
            classifications: count("classifications")?,
        })
    }
}

fn timestamp_from_row(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
}

fn message_from_row(row: &Row) -> rusqlite::Result<Message> {
    Ok(Message {
        system_id: row.get(0)?,
        from_id: row.get(1)?,
        site_id: row.get(2)?,
        timestamp: timestamp_from_row(row, 3)?,
    })
}

fn status_from_row(row: &Row) -> rusqlite::Result<StatusChange> {
    Ok(StatusChange {
        system_id: row.get(0)?,
        from_id: row.get(1)?,
        site_id: row.get(2)?,
        online: row.get(3)?,
        timestamp: timestamp_from_row(row, 4)?,
    })
}

// ============================================
// ROW TYPES
// ============================================

/// Chat/email verdict for one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub message_system_id: String,
    pub message_timestamp: DateTime<Utc>,
    pub site_id: i64,
    pub is_chat: bool,
}

/// Row counts for every table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub messages: u64,
    pub status_changes: u64,
    pub sites: u64,
    pub classifications: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn message(id: &str, from: &str, site_id: i64, ts: i64) -> Message {
        Message {
            system_id: id.to_string(),
            from_id: from.to_string(),
            site_id,
            timestamp: at(ts),
        }
    }

    fn status(id: &str, from: &str, site_id: i64, online: bool, ts: i64) -> StatusChange {
        StatusChange {
            system_id: id.to_string(),
            from_id: from.to_string(),
            site_id,
            online,
            timestamp: at(ts),
        }
    }

    #[test]
    fn test_duplicate_messages_are_ignored() {
        let store = EventStore::open_in_memory().unwrap();
        let msg = message("1", "1", 1, 1429026448);

        assert_eq!(store.insert_messages(&[msg.clone(), msg.clone()]).unwrap(), 1);
        assert_eq!(store.insert_messages(&[msg]).unwrap(), 0);
        assert_eq!(store.stats().unwrap().messages, 1);
    }

    #[test]
    fn test_duplicate_statuses_are_ignored() {
        let store = EventStore::open_in_memory().unwrap();
        let st = status("1", "1", 1, false, 1429026448);

        for _ in 0..3 {
            store.insert_status_changes(&[st.clone()]).unwrap();
        }
        assert_eq!(store.stats().unwrap().status_changes, 1);
    }

    #[test]
    fn test_identity_is_id_and_timestamp() {
        let store = EventStore::open_in_memory().unwrap();
        store
            .insert_messages(&[message("m1", "v1", 1, 100), message("m1", "v1", 1, 200)])
            .unwrap();
        assert_eq!(store.stats().unwrap().messages, 2);
    }

    #[test]
    fn test_message_and_status_ids_do_not_collide() {
        let store = EventStore::open_in_memory().unwrap();
        store.insert_messages(&[message("x", "v1", 1, 100)]).unwrap();
        store
            .insert_status_changes(&[status("x", "op1", 1, true, 100)])
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.messages, 1);
        assert_eq!(stats.status_changes, 1);
    }

    #[test]
    fn test_empty_batches_are_noops() {
        let store = EventStore::open_in_memory().unwrap();
        assert_eq!(store.insert_messages(&[]).unwrap(), 0);
        assert_eq!(store.insert_status_changes(&[]).unwrap(), 0);
        assert_eq!(store.insert_classifications(&[]).unwrap(), 0);
    }

    #[test]
    fn test_latest_status_lookup() {
        let store = EventStore::open_in_memory().unwrap();
        store
            .insert_status_changes(&[
                status("s1", "op1", 1, true, 50),
                status("s2", "op1", 1, false, 80),
                status("s3", "op1", 1, true, 150),
                status("s4", "op2", 2, true, 10),
            ])
            .unwrap();

        let online = store.latest_status_at_or_before(1, at(100), true).unwrap();
        assert_eq!(online.map(|s| s.system_id), Some("s1".to_string()));

        let any = store.latest_status_at_or_before(1, at(100), false).unwrap();
        assert_eq!(any.map(|s| s.system_id), Some("s2".to_string()));

        // Boundary is inclusive
        let exact = store.latest_status_at_or_before(1, at(150), true).unwrap();
        assert_eq!(exact.map(|s| s.system_id), Some("s3".to_string()));

        assert!(store
            .latest_status_at_or_before(1, at(49), true)
            .unwrap()
            .is_none());
        assert!(store
            .latest_status_at_or_before(3, at(1000), false)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_sites_are_union_of_event_tables() {
        let store = EventStore::open_in_memory().unwrap();
        store
            .insert_messages(&[message("m1", "v1", 3, 100), message("m2", "v2", 1, 100)])
            .unwrap();
        store
            .insert_status_changes(&[status("s1", "op1", 2, true, 10), status("s2", "op1", 3, true, 10)])
            .unwrap();

        assert_eq!(store.distinct_site_ids().unwrap(), vec![1, 2, 3]);
        assert_eq!(store.rebuild_sites().unwrap(), 3);
        assert_eq!(store.rebuild_sites().unwrap(), 0);
        assert_eq!(store.sites().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_classification_insert_if_absent() {
        let store = EventStore::open_in_memory().unwrap();
        store.insert_messages(&[message("m1", "v1", 1, 100)]).unwrap();

        let email = Classification {
            message_system_id: "m1".to_string(),
            message_timestamp: at(100),
            site_id: 1,
            is_chat: false,
        };
        let chat = Classification {
            is_chat: true,
            ..email.clone()
        };

        assert_eq!(store.insert_classifications(&[email.clone()]).unwrap(), 1);
        assert_eq!(store.insert_classifications(&[chat]).unwrap(), 0);
        assert_eq!(store.classification_for("m1", at(100)).unwrap(), Some(email));
        assert_eq!(store.classification_counts(1).unwrap(), (1, 0));
        assert!(store.unclassified_messages().unwrap().is_empty());
    }

    #[test]
    fn test_count_distinct_senders() {
        let store = EventStore::open_in_memory().unwrap();
        store
            .insert_messages(&[
                message("m1", "v2", 1, 100),
                message("m2", "v1", 1, 101),
                message("m3", "v1", 1, 102),
                message("m4", "v9", 2, 100),
            ])
            .unwrap();

        assert_eq!(store.count_distinct_senders(1, EventKind::Message).unwrap(), 2);
        assert_eq!(store.count_distinct_senders(2, EventKind::Message).unwrap(), 1);
        assert_eq!(store.count_distinct_senders(1, EventKind::Status).unwrap(), 0);
    }

    #[test]
    fn test_latest_status_tie_prefers_online() {
        let store = EventStore::open_in_memory().unwrap();
        store
            .insert_status_changes(&[
                status("b-off", "op1", 1, false, 100),
                status("a-off", "op2", 1, false, 100),
                status("c-on", "op3", 1, true, 100),
                status("z-on", "op4", 1, true, 100),
            ])
            .unwrap();

        let any = store.latest_status_at_or_before(1, at(100), false).unwrap();
        assert_eq!(any.map(|s| s.system_id), Some("c-on".to_string()));

        let online = store.latest_status_at_or_before(1, at(100), true).unwrap();
        assert_eq!(online.map(|s| s.system_id), Some("c-on".to_string()));
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/events.db");
        {
            let store = EventStore::open(&path).unwrap();
            store.insert_messages(&[message("m1", "v1", 1, 100)]).unwrap();
        }

        let reopened = EventStore::open(&path).unwrap();
        assert_eq!(reopened.stats().unwrap().messages, 1);
    }
}
