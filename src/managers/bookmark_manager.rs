//! Bookmark Manager for TMarks.
//!
//! Local mirror of saved bookmarks, backed by SQLite via `rusqlite`. Tags are
//! stored as a JSON array of names.

use rusqlite::{params, Connection, OptionalExtension};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::types::bookmark::{Bookmark, BookmarkInput};
use crate::types::errors::StoreError;
use crate::types::remote::RemoteBookmark;

const BOOKMARK_COLUMNS: &str =
    "id, url, title, description, tags, created_at, remote_id, is_public";

/// Trait defining bookmark mirror operations.
pub trait BookmarkManagerTrait {
    /// Stores a bookmark. Returns the generated local ID.
    fn add_bookmark(&mut self, input: &BookmarkInput, remote_id: Option<&str>) -> Result<String, StoreError>;
    fn get_bookmark(&self, id: &str) -> Result<Option<Bookmark>, StoreError>;
    fn find_by_url(&self, url: &str) -> Result<Option<Bookmark>, StoreError>;
    /// Most recent first.
    fn recent_bookmarks(&self, limit: usize) -> Result<Vec<Bookmark>, StoreError>;
    /// Replaces the whole mirror with remote bookmarks.
    fn replace_all(&mut self, bookmarks: &[RemoteBookmark]) -> Result<(), StoreError>;
    fn clear(&mut self) -> Result<(), StoreError>;
    fn count(&self) -> Result<i64, StoreError>;
}

/// Bookmark mirror backed by a SQLite connection.
pub struct BookmarkManager<'a> {
    conn: &'a Connection,
}

impl<'a> BookmarkManager<'a> {
    /// Creates a new `BookmarkManager` using the provided database connection.
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Returns the current UNIX timestamp in milliseconds.
    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }

    /// Reads a single `Bookmark` row into a struct.
    fn row_to_bookmark(row: &rusqlite::Row) -> rusqlite::Result<Bookmark> {
        let tags_json: String = row.get(4)?;
        let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
        Ok(Bookmark {
            id: row.get(0)?,
            url: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            tags,
            created_at: row.get(5)?,
            remote_id: row.get(6)?,
            is_public: row.get::<_, i64>(7)? != 0,
        })
    }

    fn insert(&self, bookmark: &Bookmark) -> Result<(), StoreError> {
        let tags_json = serde_json::to_string(&bookmark.tags)?;
        self.conn.execute(
            "INSERT INTO bookmarks (id, url, title, description, tags, created_at, remote_id, is_public) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                bookmark.id,
                bookmark.url,
                bookmark.title,
                bookmark.description,
                tags_json,
                bookmark.created_at,
                bookmark.remote_id,
                bookmark.is_public as i64,
            ],
        )?;
        Ok(())
    }
}

impl<'a> BookmarkManagerTrait for BookmarkManager<'a> {
    fn add_bookmark(&mut self, input: &BookmarkInput, remote_id: Option<&str>) -> Result<String, StoreError> {
        let bookmark = Bookmark {
            id: Uuid::new_v4().to_string(),
            url: input.url.clone(),
            title: input.title.clone(),
            description: input.description.clone(),
            tags: input.tags.clone(),
            created_at: Self::now(),
            remote_id: remote_id.map(str::to_string),
            is_public: input.is_public,
        };
        self.insert(&bookmark)?;
        Ok(bookmark.id)
    }

    fn get_bookmark(&self, id: &str) -> Result<Option<Bookmark>, StoreError> {
        let sql = format!("SELECT {} FROM bookmarks WHERE id = ?1", BOOKMARK_COLUMNS);
        let bookmark = self
            .conn
            .query_row(&sql, params![id], Self::row_to_bookmark)
            .optional()?;
        Ok(bookmark)
    }

    fn find_by_url(&self, url: &str) -> Result<Option<Bookmark>, StoreError> {
        let sql = format!(
            "SELECT {} FROM bookmarks WHERE url = ?1 ORDER BY created_at DESC LIMIT 1",
            BOOKMARK_COLUMNS
        );
        let bookmark = self
            .conn
            .query_row(&sql, params![url], Self::row_to_bookmark)
            .optional()?;
        Ok(bookmark)
    }

    fn recent_bookmarks(&self, limit: usize) -> Result<Vec<Bookmark>, StoreError> {
        let sql = format!(
            "SELECT {} FROM bookmarks ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            BOOKMARK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], Self::row_to_bookmark)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    fn replace_all(&mut self, bookmarks: &[RemoteBookmark]) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM bookmarks", [])?;
        let now = Self::now();
        // Remote pages arrive newest first; keep that order in created_at.
        for (index, remote) in bookmarks.iter().enumerate() {
            let tags: Vec<String> = remote.tags.iter().map(|t| t.name.clone()).collect();
            let tags_json = serde_json::to_string(&tags)?;
            tx.execute(
                "INSERT INTO bookmarks (id, url, title, description, tags, created_at, remote_id, is_public) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    Uuid::new_v4().to_string(),
                    remote.url,
                    remote.title,
                    remote.description,
                    tags_json,
                    now - index as i64,
                    remote.id,
                    remote.is_public as i64,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM bookmarks", [])?;
        Ok(())
    }

    fn count(&self) -> Result<i64, StoreError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM bookmarks", [], |row| row.get(0))?;
        Ok(count)
    }
}
