//! Tab Group Manager for TMarks.
//!
//! Local staging of tab groups and their items, backed by SQLite. Item
//! positions are kept 0-based and contiguous per group.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::types::errors::StoreError;
use crate::types::tab_group::{TabGroup, TabGroupItem, TabGroupNode, TabInput};

const GROUP_COLUMNS: &str = "id, title, created_at, remote_id, parent_id, is_folder, parent_remote_id";
const ITEM_COLUMNS: &str = "id, group_id, title, url, favicon, position, created_at";

/// Trait defining tab group staging operations.
pub trait TabGroupManagerTrait {
    fn create_group(&mut self, title: &str, parent_id: Option<&str>, is_folder: bool) -> Result<TabGroup, StoreError>;
    /// Stages a group under a folder known only by its remote id.
    fn create_under_remote_folder(&mut self, title: &str, parent_remote_id: &str) -> Result<TabGroup, StoreError>;
    /// Appends tabs after the group's last position.
    fn add_items(&mut self, group_id: &str, tabs: &[TabInput]) -> Result<Vec<TabGroupItem>, StoreError>;
    /// Inserts an item with its position as given.
    fn insert_item(&mut self, item: &TabGroupItem) -> Result<(), StoreError>;
    /// Removes an item and closes the gap it leaves.
    fn remove_item(&mut self, item_id: &str) -> Result<(), StoreError>;
    fn get_group(&self, id: &str) -> Result<Option<TabGroup>, StoreError>;
    fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<TabGroup>, StoreError>;
    fn list_groups(&self) -> Result<Vec<TabGroup>, StoreError>;
    /// Items ordered by position.
    fn list_items(&self, group_id: &str) -> Result<Vec<TabGroupItem>, StoreError>;
    /// Groups without a remote id, folders first, oldest first.
    fn unsynced_groups(&self) -> Result<Vec<TabGroup>, StoreError>;
    fn set_remote_id(&mut self, id: &str, remote_id: &str) -> Result<(), StoreError>;
    /// Deletes a group; its items go with it.
    fn delete_group(&mut self, id: &str) -> Result<(), StoreError>;
    /// URLs to reopen, in position order.
    fn restore_urls(&self, group_id: &str) -> Result<Vec<String>, StoreError>;
}

/// Tab group store backed by a SQLite connection.
pub struct TabGroupManager<'a> {
    conn: &'a Connection,
}

impl<'a> TabGroupManager<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }

    fn row_to_group(row: &rusqlite::Row) -> rusqlite::Result<TabGroup> {
        Ok(TabGroup {
            id: row.get(0)?,
            title: row.get(1)?,
            created_at: row.get(2)?,
            remote_id: row.get(3)?,
            parent_id: row.get(4)?,
            is_folder: row.get::<_, i64>(5)? != 0,
            parent_remote_id: row.get(6)?,
        })
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<TabGroupItem> {
        Ok(TabGroupItem {
            id: row.get(0)?,
            group_id: row.get(1)?,
            title: row.get(2)?,
            url: row.get(3)?,
            favicon: row.get(4)?,
            position: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn next_position(&self, group_id: &str) -> Result<i64, StoreError> {
        let pos = self.conn.query_row(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM tab_group_items WHERE group_id = ?1",
            params![group_id],
            |row| row.get(0),
        )?;
        Ok(pos)
    }

    fn insert_row(conn: &Connection, item: &TabGroupItem) -> Result<(), StoreError> {
        conn.execute(
            "INSERT INTO tab_group_items (id, group_id, title, url, favicon, position, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![item.id, item.group_id, item.title, item.url, item.favicon, item.position, item.created_at],
        )?;
        Ok(())
    }

    fn insert_group(&self, group: &TabGroup) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO tab_groups (id, title, created_at, remote_id, parent_id, is_folder, parent_remote_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                group.id,
                group.title,
                group.created_at,
                group.remote_id,
                group.parent_id,
                group.is_folder as i64,
                group.parent_remote_id
            ],
        )?;
        Ok(())
    }

    fn query_groups(&self, sql: &str) -> Result<Vec<TabGroup>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], Self::row_to_group)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

impl<'a> TabGroupManagerTrait for TabGroupManager<'a> {
    fn create_group(&mut self, title: &str, parent_id: Option<&str>, is_folder: bool) -> Result<TabGroup, StoreError> {
        let group = TabGroup {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            created_at: Self::now(),
            remote_id: None,
            parent_id: parent_id.map(str::to_string),
            parent_remote_id: None,
            is_folder,
        };
        self.insert_group(&group)?;
        Ok(group)
    }

    fn create_under_remote_folder(&mut self, title: &str, parent_remote_id: &str) -> Result<TabGroup, StoreError> {
        let group = TabGroup {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            created_at: Self::now(),
            remote_id: None,
            parent_id: None,
            parent_remote_id: Some(parent_remote_id.to_string()),
            is_folder: false,
        };
        self.insert_group(&group)?;
        Ok(group)
    }

    fn add_items(&mut self, group_id: &str, tabs: &[TabInput]) -> Result<Vec<TabGroupItem>, StoreError> {
        if self.get_group(group_id)?.is_none() {
            return Err(StoreError::NotFound(group_id.to_string()));
        }

        let conn = self.conn;
        let tx = conn.unchecked_transaction()?;
        let start = self.next_position(group_id)?;
        let now = Self::now();
        let mut items = Vec::with_capacity(tabs.len());
        for (offset, tab) in tabs.iter().enumerate() {
            let item = TabGroupItem {
                id: Uuid::new_v4().to_string(),
                group_id: group_id.to_string(),
                title: tab.title.clone(),
                url: tab.url.clone(),
                favicon: tab.favicon.clone(),
                position: start + offset as i64,
                created_at: now,
            };
            Self::insert_row(conn, &item)?;
            items.push(item);
        }
        tx.commit()?;
        Ok(items)
    }

    fn insert_item(&mut self, item: &TabGroupItem) -> Result<(), StoreError> {
        Self::insert_row(self.conn, item)
    }

    fn remove_item(&mut self, item_id: &str) -> Result<(), StoreError> {
        let found: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT group_id, position FROM tab_group_items WHERE id = ?1",
                params![item_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (group_id, position) = found.ok_or_else(|| StoreError::NotFound(item_id.to_string()))?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM tab_group_items WHERE id = ?1", params![item_id])?;
        // Shift through negative positions so UNIQUE(group_id, position) holds per row.
        tx.execute(
            "UPDATE tab_group_items SET position = -position WHERE group_id = ?1 AND position > ?2",
            params![group_id, position],
        )?;
        tx.execute(
            "UPDATE tab_group_items SET position = -position - 1 WHERE group_id = ?1 AND position < 0",
            params![group_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_group(&self, id: &str) -> Result<Option<TabGroup>, StoreError> {
        let sql = format!("SELECT {} FROM tab_groups WHERE id = ?1", GROUP_COLUMNS);
        let group = self
            .conn
            .query_row(&sql, params![id], Self::row_to_group)
            .optional()?;
        Ok(group)
    }

    fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<TabGroup>, StoreError> {
        let sql = format!("SELECT {} FROM tab_groups WHERE remote_id = ?1 LIMIT 1", GROUP_COLUMNS);
        let group = self
            .conn
            .query_row(&sql, params![remote_id], Self::row_to_group)
            .optional()?;
        Ok(group)
    }

    fn list_groups(&self) -> Result<Vec<TabGroup>, StoreError> {
        self.query_groups(&format!(
            "SELECT {} FROM tab_groups ORDER BY created_at ASC, rowid ASC",
            GROUP_COLUMNS
        ))
    }

    fn list_items(&self, group_id: &str) -> Result<Vec<TabGroupItem>, StoreError> {
        let sql = format!(
            "SELECT {} FROM tab_group_items WHERE group_id = ?1 ORDER BY position ASC",
            ITEM_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![group_id], Self::row_to_item)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    fn unsynced_groups(&self) -> Result<Vec<TabGroup>, StoreError> {
        self.query_groups(&format!(
            "SELECT {} FROM tab_groups WHERE remote_id IS NULL ORDER BY is_folder DESC, created_at ASC, rowid ASC",
            GROUP_COLUMNS
        ))
    }

    fn set_remote_id(&mut self, id: &str, remote_id: &str) -> Result<(), StoreError> {
        let affected = self.conn.execute(
            "UPDATE tab_groups SET remote_id = ?1 WHERE id = ?2",
            params![remote_id, id],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn delete_group(&mut self, id: &str) -> Result<(), StoreError> {
        let affected = self
            .conn
            .execute("DELETE FROM tab_groups WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn restore_urls(&self, group_id: &str) -> Result<Vec<String>, StoreError> {
        if self.get_group(group_id)?.is_none() {
            return Err(StoreError::NotFound(group_id.to_string()));
        }
        Ok(self
            .list_items(group_id)?
            .into_iter()
            .map(|item| item.url)
            .collect())
    }
}

/// Builds the folder hierarchy from a flat group list.
///
/// Groups whose parent is missing from the list (or that point at
/// themselves) become roots. Groups caught in a parent cycle are promoted to
/// roots as well, so every input group appears exactly once. Input order is
/// kept among siblings.
pub fn build_tree(groups: &[TabGroup]) -> Vec<TabGroupNode> {
    let ids: HashSet<&str> = groups.iter().map(|g| g.id.as_str()).collect();
    let mut children: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();

    for (index, group) in groups.iter().enumerate() {
        match group.parent_id.as_deref() {
            Some(parent) if parent != group.id && ids.contains(parent) => {
                children.entry(parent).or_default().push(index);
            }
            _ => roots.push(index),
        }
    }

    let mut visited = vec![false; groups.len()];
    let mut tree: Vec<TabGroupNode> = roots
        .into_iter()
        .map(|index| build_node(index, groups, &children, &mut visited))
        .collect();

    for index in 0..groups.len() {
        if !visited[index] {
            tree.push(build_node(index, groups, &children, &mut visited));
        }
    }
    tree
}

fn build_node(
    index: usize,
    groups: &[TabGroup],
    children: &HashMap<&str, Vec<usize>>,
    visited: &mut Vec<bool>,
) -> TabGroupNode {
    visited[index] = true;
    let mut nodes = Vec::new();
    if let Some(kids) = children.get(groups[index].id.as_str()) {
        for &child in kids {
            if !visited[child] {
                nodes.push(build_node(child, groups, children, visited));
            }
        }
    }
    TabGroupNode {
        group: groups[index].clone(),
        children: nodes,
    }
}
