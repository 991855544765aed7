//! Bookmark sync service for TMarks.
//!
//! Saves go to the remote API first. A confirmed new bookmark is mirrored into
//! the local cache and folded into the recommendation context; an existing
//! one is reported back for the UI's dialog. Network failures put the payload
//! into the offline queue and report an offline success; credential and other
//! failures surface to the caller.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::database::Database;
use crate::managers::bookmark_manager::{BookmarkManager, BookmarkManagerTrait};
use crate::managers::pending_queue::{PendingQueue, PendingQueueTrait, LAST_SYNC_KEY};
use crate::managers::tag_manager::{TagManager, TagManagerTrait};
use crate::services::context_cache::ContextCache;
use crate::services::page_capture::{build_snapshot_payload, capture_page, PageCapturer, CAPTURE_HARD_TIMEOUT};
use crate::services::tmarks_client::BookmarkApi;
use crate::types::bookmark::{BookmarkInput, CacheStatus, PendingSyncReport, SaveBookmarkResult};
use crate::types::capture::CaptureOptions;
use crate::types::errors::{ApiError, FailureClass, StoreError, SyncError};

/// Page size used when pulling the remote bookmark list.
pub const FULL_SYNC_PAGE_SIZE: u32 = 100;
/// Safety stop for servers that keep reporting `has_more`.
const FULL_SYNC_MAX_PAGES: u32 = 1000;

const AUTH_CODES: [&str; 5] = [
    "INVALID_API_KEY",
    "MISSING_API_KEY",
    "INSUFFICIENT_PERMISSIONS",
    "UNAUTHORIZED",
    "FORBIDDEN",
];
const NETWORK_CODES: [&str; 2] = ["NETWORK_ERROR", "TIMEOUT"];
const AUTH_MESSAGE_HINTS: [&str; 4] = ["API Key", "权限", "未授权", "无效"];
const NETWORK_MESSAGE_HINTS: [&str; 3] = ["网络", "network", "Failed to fetch"];

/// Decides what a remote failure means for persistence.
///
/// Structured status and code are checked first; message substrings are a
/// legacy fallback for servers that send neither. Auth wins over network.
pub fn classify_api_error(error: &ApiError) -> FailureClass {
    let code = error.code.as_deref().unwrap_or_default();
    let auth = matches!(error.status, Some(401) | Some(403))
        || AUTH_CODES.contains(&code)
        || AUTH_MESSAGE_HINTS.iter().any(|hint| error.message.contains(hint));
    if auth {
        return FailureClass::Auth;
    }

    let network = error.status == Some(0)
        || NETWORK_CODES.contains(&code)
        || NETWORK_MESSAGE_HINTS.iter().any(|hint| error.message.contains(hint));
    if network {
        return FailureClass::Network;
    }
    FailureClass::Other
}

/// Maps a remote failure that cannot be queued to a caller-facing error.
pub fn surface_api_error(error: ApiError) -> SyncError {
    match classify_api_error(&error) {
        FailureClass::Auth => SyncError::Auth(error),
        _ => SyncError::Remote(error),
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn validate_input(input: &BookmarkInput) -> Result<(), SyncError> {
    if input.url.trim().is_empty() {
        return Err(SyncError::Validation("书签 URL 不能为空".to_string()));
    }
    if !input.tags.iter().any(|t| !t.trim().is_empty()) {
        return Err(SyncError::Validation("请至少选择一个标签".to_string()));
    }
    Ok(())
}

/// Snapshot capture requested alongside a save.
#[derive(Clone)]
pub struct SnapshotRequest {
    pub capturer: Arc<dyn PageCapturer>,
    pub options: CaptureOptions,
}

/// Persists bookmarks remotely with a local mirror and an offline queue.
pub struct BookmarkSyncService {
    db: Arc<Database>,
    api: Arc<dyn BookmarkApi>,
    context: Arc<ContextCache>,
    capture_timeout: Duration,
    snapshots: Mutex<Vec<JoinHandle<()>>>,
}

impl BookmarkSyncService {
    pub fn new(db: Arc<Database>, api: Arc<dyn BookmarkApi>, context: Arc<ContextCache>) -> Self {
        Self {
            db,
            api,
            context,
            capture_timeout: CAPTURE_HARD_TIMEOUT,
            snapshots: Mutex::new(Vec::new()),
        }
    }

    /// Overrides the hard snapshot capture timeout.
    pub fn with_capture_timeout(mut self, timeout: Duration) -> Self {
        self.capture_timeout = timeout;
        self
    }

    /// Saves a bookmark. See the module docs for the failure policy.
    ///
    /// When `snapshot` is given and the remote side returned a bookmark id,
    /// a capture-and-upload task is started in the background; its failure
    /// never affects the returned result.
    pub async fn save_bookmark(
        &self,
        input: BookmarkInput,
        snapshot: Option<SnapshotRequest>,
    ) -> Result<SaveBookmarkResult, SyncError> {
        validate_input(&input)?;
        let input = input.normalized();

        match self.api.add_bookmark(&input).await {
            Ok(outcome) if outcome.is_existing => {
                info!(bookmark_id = %outcome.id, url = %input.url, "bookmark already exists remotely");
                if let Some(snapshot) = snapshot {
                    self.spawn_snapshot(&outcome.id, &input, snapshot);
                }
                Ok(SaveBookmarkResult {
                    success: true,
                    bookmark_id: Some(outcome.id),
                    is_existing: true,
                    existing_bookmark: outcome.existing_bookmark,
                    show_existing_dialog: true,
                    message: Some("书签已存在".to_string()),
                    ..Default::default()
                })
            }
            Ok(outcome) => {
                info!(bookmark_id = %outcome.id, url = %input.url, "bookmark saved");
                self.mirror_saved(&input, &outcome.id).await;
                self.context.patch_after_save(&input.title, &input.tags);
                if let Some(snapshot) = snapshot {
                    self.spawn_snapshot(&outcome.id, &input, snapshot);
                }
                Ok(SaveBookmarkResult {
                    success: true,
                    bookmark_id: Some(outcome.id),
                    message: Some("书签已保存".to_string()),
                    ..Default::default()
                })
            }
            Err(error) => match classify_api_error(&error) {
                FailureClass::Network => {
                    let queued = input.clone();
                    let key = self
                        .db
                        .run_blocking(move |conn| PendingQueue::new(conn).enqueue(&queued))
                        .await?;
                    warn!(pending_key = %key, error = %error, "network failure, bookmark queued for later sync");
                    Ok(SaveBookmarkResult {
                        success: true,
                        offline: true,
                        message: Some("网络不可用，书签已保存到本地，将在联网后同步".to_string()),
                        ..Default::default()
                    })
                }
                FailureClass::Auth => Err(SyncError::Auth(error)),
                FailureClass::Other => Err(SyncError::Remote(error)),
            },
        }
    }

    /// Mirrors a remotely confirmed bookmark and bumps its tag counters.
    /// `input` must carry normalized tags. Failures are logged; the remote
    /// copy is authoritative.
    async fn mirror_saved(&self, input: &BookmarkInput, remote_id: &str) {
        let input = input.clone();
        let remote_id = remote_id.to_string();
        let mirrored = self
            .db
            .run_blocking(move |conn| {
                if let Err(e) = BookmarkManager::new(conn).add_bookmark(&input, Some(&remote_id)) {
                    warn!(bookmark_id = %remote_id, error = %e, "failed to mirror bookmark locally");
                }
                // One read-increment-write per tag, not atomic across tags.
                let mut tags = TagManager::new(conn);
                for tag in &input.tags {
                    if let Err(e) = tags.increment_usage(tag) {
                        warn!(tag = %tag, error = %e, "failed to update tag usage");
                    }
                }
                Ok(())
            })
            .await;
        if let Err(e) = mirrored {
            warn!(error = %e, "local mirror task failed");
        }
    }

    fn spawn_snapshot(&self, bookmark_id: &str, input: &BookmarkInput, snapshot: SnapshotRequest) {
        let api = self.api.clone();
        let timeout = self.capture_timeout;
        let bookmark_id = bookmark_id.to_string();
        let title = input.title.clone();
        let url = input.url.clone();

        let handle = tokio::spawn(async move {
            let max_image_size = snapshot.options.max_image_size;
            let page = match capture_page(snapshot.capturer.as_ref(), &url, snapshot.options, timeout).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(bookmark_id = %bookmark_id, error = %e, "snapshot capture failed");
                    return;
                }
            };
            let payload = build_snapshot_payload(page, &title, &url, max_image_size);
            match api.create_snapshot_v2(&bookmark_id, &payload).await {
                Ok(()) => info!(bookmark_id = %bookmark_id, images = payload.images.len(), "snapshot uploaded"),
                Err(e) => warn!(bookmark_id = %bookmark_id, error = %e, "snapshot upload failed"),
            }
        });

        let mut handles = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Waits for every snapshot task started so far.
    pub async fn wait_for_snapshots(&self) {
        let handles = std::mem::take(&mut *self.snapshots.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "snapshot task panicked");
            }
        }
    }

    /// Replays the offline queue in insertion order.
    ///
    /// A record is deleted once the remote side confirmed it (new or
    /// existing). Network and other failures keep the record and move on;
    /// an auth failure stops the replay and is returned.
    pub async fn sync_pending_bookmarks(&self) -> Result<PendingSyncReport, SyncError> {
        let records = self
            .db
            .run_blocking(|conn| PendingQueue::new(conn).list_pending())
            .await?;

        let mut report = PendingSyncReport::default();
        for record in records {
            let input = record.input.normalized();
            match self.api.add_bookmark(&input).await {
                Ok(outcome) => {
                    if !outcome.is_existing {
                        self.mirror_saved(&input, &outcome.id).await;
                        self.context.patch_after_save(&input.title, &input.tags);
                    }
                    let key = record.key.clone();
                    self.db
                        .run_blocking(move |conn| PendingQueue::new(conn).delete_meta(&key))
                        .await?;
                    report.synced += 1;
                }
                Err(error) => {
                    let class = classify_api_error(&error);
                    warn!(pending_key = %record.key, class = %class, error = %error, "pending bookmark replay failed");
                    if class == FailureClass::Auth {
                        return Err(SyncError::Auth(error));
                    }
                    report.failed += 1;
                }
            }
        }

        report.remaining = self
            .db
            .run_blocking(|conn| PendingQueue::new(conn).pending_count())
            .await? as usize;
        info!(synced = report.synced, failed = report.failed, remaining = report.remaining, "pending sync finished");
        Ok(report)
    }

    /// Pulls tags and all bookmarks from the remote side, replaces the local
    /// mirror and invalidates the recommendation context.
    pub async fn refresh_from_remote(&self) -> Result<CacheStatus, SyncError> {
        let tags = self.api.get_tags().await.map_err(surface_api_error)?;

        let mut bookmarks = Vec::new();
        let mut page = 1;
        loop {
            let batch = self
                .api
                .get_bookmarks(page, FULL_SYNC_PAGE_SIZE)
                .await
                .map_err(surface_api_error)?;
            let received = batch.bookmarks.len();
            bookmarks.extend(batch.bookmarks);
            if !batch.has_more || received == 0 || page >= FULL_SYNC_MAX_PAGES {
                break;
            }
            page += 1;
        }

        let (tag_count, bookmark_count) = (tags.len(), bookmarks.len());
        self.db
            .run_blocking(move |conn| {
                TagManager::new(conn).replace_all(&tags)?;
                BookmarkManager::new(conn).replace_all(&bookmarks)?;
                PendingQueue::new(conn).set_meta(LAST_SYNC_KEY, &now_millis().to_string())
            })
            .await?;
        self.context.invalidate();
        info!(tags = tag_count, bookmarks = bookmark_count, "local cache refreshed from remote");

        Ok(self.cache_status().await?)
    }

    /// Wipes the local tag/bookmark mirror. Pending records are kept.
    pub async fn clear_local_cache(&self) -> Result<(), SyncError> {
        self.db
            .run_blocking(|conn| {
                TagManager::new(conn).clear()?;
                BookmarkManager::new(conn).clear()?;
                PendingQueue::new(conn).delete_meta(LAST_SYNC_KEY)
            })
            .await?;
        self.context.invalidate();
        info!("local cache cleared");
        Ok(())
    }

    pub async fn cache_status(&self) -> Result<CacheStatus, StoreError> {
        self.db
            .run_blocking(|conn| {
                let queue = PendingQueue::new(conn);
                Ok(CacheStatus {
                    tags: TagManager::new(conn).count()?,
                    bookmarks: BookmarkManager::new(conn).count()?,
                    pending: queue.pending_count()?,
                    last_sync_at: queue.get_meta(LAST_SYNC_KEY)?.and_then(|v| v.parse().ok()),
                })
            })
            .await
    }
}
