use serde::{Deserialize, Serialize};

/// Locally staged tab group. Folders hold child groups instead of items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TabGroup {
    pub id: String,
    pub title: String,
    pub created_at: i64,
    pub remote_id: Option<String>,
    pub parent_id: Option<String>,
    /// Remote id of the parent folder when it has no local row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_remote_id: Option<String>,
    pub is_folder: bool,
}

/// Tab saved in a group. `position` is 0-based and contiguous per group; it
/// defines both display and restore order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TabGroupItem {
    pub id: String,
    pub group_id: String,
    pub title: String,
    pub url: String,
    pub favicon: Option<String>,
    pub position: i64,
    pub created_at: i64,
}

/// Open tab handed over by the extension for collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TabInput {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

/// Where collected tabs go.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CollectMode {
    /// New standalone group.
    New { title: String },
    /// Append to a group that already exists remotely.
    Existing { remote_group_id: String },
    /// New group placed under a folder.
    Folder { title: String, folder: FolderTarget },
}

/// Folder a group is filed under in `Folder` mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FolderTarget {
    /// Remote id of an existing folder.
    Existing(String),
    /// Name of a folder to create first.
    New(String),
}

/// Outcome of collecting tabs into a group.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub items_added: usize,
    #[serde(default)]
    pub offline: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Summary of a replay over unsynced groups.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupSyncReport {
    pub synced: usize,
    pub failed: usize,
}

/// Group with its children, as produced by `build_tree`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TabGroupNode {
    pub group: TabGroup,
    pub children: Vec<TabGroupNode>,
}
