//! Wire types of the TMarks remote API.

use serde::{Deserialize, Serialize};

/// Tag as returned by the remote API.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RemoteTag {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, alias = "bookmark_count")]
    pub count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Bookmark as returned by the remote API.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RemoteBookmark {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<RemoteTag>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Result of `addBookmark`.
#[derive(Debug, Clone, PartialEq)]
pub struct AddBookmarkOutcome {
    pub id: String,
    pub is_existing: bool,
    pub existing_bookmark: Option<RemoteBookmark>,
}

/// One page of `getBookmarks`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookmarkPage {
    pub bookmarks: Vec<RemoteBookmark>,
    #[serde(default)]
    pub has_more: bool,
}

/// Inlined image captured alongside a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotImage {
    pub hash: String,
    /// Base64 payload, optionally prefixed with a `data:` URI header.
    pub data: String,
    #[serde(rename = "type")]
    pub mime_type: String,
}

/// Body of `createSnapshotV2`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotPayload {
    pub html_content: String,
    pub title: String,
    pub url: String,
    pub images: Vec<SnapshotImage>,
}

/// Tab entry submitted to the remote tab-group endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteTabItem {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

/// Body of `createTabGroup`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CreateTabGroupInput {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub is_folder: bool,
    #[serde(default)]
    pub items: Vec<RemoteTabItem>,
}
