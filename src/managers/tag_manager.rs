//! Tag Manager for TMarks.
//!
//! Local mirror of the user's tags with usage counters, backed by SQLite.

use rusqlite::{params, Connection, OptionalExtension};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::types::bookmark::Tag;
use crate::types::errors::StoreError;
use crate::types::remote::RemoteTag;

/// Trait defining tag mirror operations.
pub trait TagManagerTrait {
    /// All tags, most used first.
    fn list_tags(&self) -> Result<Vec<Tag>, StoreError>;
    /// Names of the `limit` most used tags.
    fn top_tag_names(&self, limit: usize) -> Result<Vec<String>, StoreError>;
    fn find_by_name(&self, name: &str) -> Result<Option<Tag>, StoreError>;
    /// Bumps the usage counter, creating the tag with `count = 1` if absent.
    fn increment_usage(&mut self, name: &str) -> Result<Tag, StoreError>;
    /// Replaces the whole mirror with the remote tag list.
    fn replace_all(&mut self, tags: &[RemoteTag]) -> Result<(), StoreError>;
    fn clear(&mut self) -> Result<(), StoreError>;
    fn count(&self) -> Result<i64, StoreError>;
}

/// Tag mirror backed by a SQLite connection.
pub struct TagManager<'a> {
    conn: &'a Connection,
}

impl<'a> TagManager<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }

    fn row_to_tag(row: &rusqlite::Row) -> rusqlite::Result<Tag> {
        Ok(Tag {
            id: row.get(0)?,
            name: row.get(1)?,
            color: row.get(2)?,
            count: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

impl<'a> TagManagerTrait for TagManager<'a> {
    fn list_tags(&self) -> Result<Vec<Tag>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, color, count, created_at FROM tags ORDER BY count DESC, name ASC",
        )?;
        let rows = stmt.query_map([], Self::row_to_tag)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    fn top_tag_names(&self, limit: usize) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM tags ORDER BY count DESC, name ASC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;

        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Tag>, StoreError> {
        let tag = self
            .conn
            .query_row(
                "SELECT id, name, color, count, created_at FROM tags WHERE name = ?1",
                params![name],
                Self::row_to_tag,
            )
            .optional()?;
        Ok(tag)
    }

    // Read-increment-write, not atomic across concurrent writers. The local
    // mirror has a single writer.
    fn increment_usage(&mut self, name: &str) -> Result<Tag, StoreError> {
        match self.find_by_name(name)? {
            Some(mut tag) => {
                tag.count += 1;
                self.conn.execute(
                    "UPDATE tags SET count = ?1 WHERE id = ?2",
                    params![tag.count, tag.id],
                )?;
                Ok(tag)
            }
            None => {
                let tag = Tag {
                    id: Uuid::new_v4().to_string(),
                    name: name.to_string(),
                    color: None,
                    count: 1,
                    created_at: Self::now(),
                };
                self.conn.execute(
                    "INSERT INTO tags (id, name, color, count, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![tag.id, tag.name, tag.color, tag.count, tag.created_at],
                )?;
                Ok(tag)
            }
        }
    }

    fn replace_all(&mut self, tags: &[RemoteTag]) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM tags", [])?;
        let now = Self::now();
        for tag in tags {
            tx.execute(
                "INSERT OR REPLACE INTO tags (id, name, color, count, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![tag.id, tag.name, tag.color, tag.count.max(0), now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM tags", [])?;
        Ok(())
    }

    fn count(&self) -> Result<i64, StoreError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))?;
        Ok(count)
    }
}
