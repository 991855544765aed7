//! Offline queue and metadata store for TMarks.
//!
//! Pending bookmark saves live in the `metadata` table under keys of the form
//! `pending_<timestamp>` (milliseconds) with a serialized `BookmarkInput` as
//! value. Records have no TTL; they are removed only after the remote side
//! confirmed persistence.

use rusqlite::{params, Connection, OptionalExtension};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::bookmark::{BookmarkInput, PendingRecord};
use crate::types::errors::StoreError;

pub const PENDING_PREFIX: &str = "pending_";
pub const LAST_SYNC_KEY: &str = "last_sync_at";

/// Trait defining metadata and offline queue operations.
pub trait PendingQueueTrait {
    fn get_meta(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set_meta(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn delete_meta(&mut self, key: &str) -> Result<bool, StoreError>;
    /// Appends a bookmark to the queue. Returns the record key.
    fn enqueue(&mut self, input: &BookmarkInput) -> Result<String, StoreError>;
    /// Queued records in key (insertion timestamp) order.
    fn list_pending(&self) -> Result<Vec<PendingRecord>, StoreError>;
    fn pending_count(&self) -> Result<i64, StoreError>;
}

/// Metadata/queue store backed by a SQLite connection.
pub struct PendingQueue<'a> {
    conn: &'a Connection,
}

impl<'a> PendingQueue<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn now_millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }

    /// Numeric suffix of a pending key, used for ordering.
    fn key_timestamp(key: &str) -> i64 {
        key.trim_start_matches(PENDING_PREFIX).parse().unwrap_or(0)
    }
}

impl<'a> PendingQueueTrait for PendingQueue<'a> {
    fn get_meta(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_meta(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, Self::now_millis()],
        )?;
        Ok(())
    }

    fn delete_meta(&mut self, key: &str) -> Result<bool, StoreError> {
        let affected = self
            .conn
            .execute("DELETE FROM metadata WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    fn enqueue(&mut self, input: &BookmarkInput) -> Result<String, StoreError> {
        let payload = serde_json::to_string(input)?;
        let now = Self::now_millis();
        // Two saves in the same millisecond get consecutive keys.
        let mut timestamp = now;
        loop {
            let key = format!("{}{}", PENDING_PREFIX, timestamp);
            let inserted = self.conn.execute(
                "INSERT OR IGNORE INTO metadata (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![key, payload, now],
            )?;
            if inserted == 1 {
                return Ok(key);
            }
            timestamp += 1;
        }
    }

    fn list_pending(&self) -> Result<Vec<PendingRecord>, StoreError> {
        let pattern = format!("{}*", PENDING_PREFIX);
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM metadata WHERE key GLOB ?1")?;
        let rows = stmt.query_map(params![pattern], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (key, value) = row?;
            let input: BookmarkInput = serde_json::from_str(&value)?;
            records.push(PendingRecord { key, input });
        }
        records.sort_by_key(|r| Self::key_timestamp(&r.key));
        Ok(records)
    }

    fn pending_count(&self) -> Result<i64, StoreError> {
        let pattern = format!("{}*", PENDING_PREFIX);
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM metadata WHERE key GLOB ?1",
            params![pattern],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
