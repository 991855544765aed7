use serde::{Deserialize, Serialize};

use super::remote::RemoteBookmark;

/// Locally mirrored tag with its usage counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub count: i64,
    pub created_at: i64,
}

/// Locally mirrored bookmark. `remote_id == None` means not yet synced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bookmark {
    pub id: String,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub remote_id: Option<String>,
    pub is_public: bool,
}

/// User-confirmed bookmark payload, as submitted to the remote API and
/// as serialized into pending-sync records.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkInput {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub create_snapshot: bool,
}

impl BookmarkInput {
    /// Trimmed, non-blank tag names, first occurrence of each kept.
    ///
    /// Names stay case-sensitive, as the tag mirror stores them.
    pub fn normalized_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::with_capacity(self.tags.len());
        for tag in self.tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if !tags.iter().any(|seen| seen == tag) {
                tags.push(tag.to_string());
            }
        }
        tags
    }

    /// Copy of this input carrying [`BookmarkInput::normalized_tags`].
    pub fn normalized(&self) -> Self {
        Self {
            tags: self.normalized_tags(),
            ..self.clone()
        }
    }
}

/// Outcome of a bookmark save.
///
/// Offline saves report `success == true` with `offline == true`; existing
/// bookmarks report `is_existing == true` and ask the UI to show its dialog.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaveBookmarkResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark_id: Option<String>,
    #[serde(default)]
    pub offline: bool,
    #[serde(default)]
    pub is_existing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_bookmark: Option<RemoteBookmark>,
    #[serde(default)]
    pub show_existing_dialog: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A queued bookmark awaiting remote persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingRecord {
    /// Metadata key of the form `pending_<timestamp>`.
    pub key: String,
    pub input: BookmarkInput,
}

/// Summary of a pending-queue replay.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PendingSyncReport {
    pub synced: usize,
    pub failed: usize,
    pub remaining: usize,
}

/// Counters describing the local mirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CacheStatus {
    pub tags: i64,
    pub bookmarks: i64,
    pub pending: i64,
    pub last_sync_at: Option<i64>,
}
