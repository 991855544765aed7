//! In-memory recommendation context for TMarks.
//!
//! Holds one shared snapshot of the most used tag names and the most recent
//! bookmarks. The snapshot is loaded lazily from the local store; concurrent
//! callers arriving while a load is in flight await that same load. The
//! snapshot is dropped wholesale on invalidation and patched in place after
//! each successful bookmark save.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use rusqlite::Connection;
use tracing::debug;

use crate::database::Database;
use crate::managers::bookmark_manager::{BookmarkManager, BookmarkManagerTrait};
use crate::managers::tag_manager::{TagManager, TagManagerTrait};
use crate::types::ai::{AiContext, RecentBookmark};
use crate::types::errors::StoreError;

/// Max tag names held in the context.
pub const MAX_CONTEXT_TAGS: usize = 200;
/// Max recent bookmarks held in the context.
pub const MAX_RECENT_BOOKMARKS: usize = 20;

type ContextLoad = Shared<BoxFuture<'static, Result<Arc<AiContext>, StoreError>>>;

enum Slot {
    Empty,
    Loading(ContextLoad),
    Ready(Arc<AiContext>),
}

struct CacheState {
    /// Bumped on every invalidation; a load started under an older
    /// generation never lands in the slot.
    generation: u64,
    slot: Slot,
}

enum Lookup {
    Ready(Arc<AiContext>),
    Wait(u64, ContextLoad),
}

/// Reads the context snapshot straight from the local store.
pub fn load_context(conn: &Connection) -> Result<AiContext, StoreError> {
    let existing_tags = TagManager::new(conn).top_tag_names(MAX_CONTEXT_TAGS)?;
    let recent_bookmarks = BookmarkManager::new(conn)
        .recent_bookmarks(MAX_RECENT_BOOKMARKS)?
        .into_iter()
        .map(|b| RecentBookmark {
            title: b.title,
            tags: b.tags,
        })
        .collect();
    Ok(AiContext {
        existing_tags,
        recent_bookmarks,
    })
}

/// Process-wide context cache.
pub struct ContextCache {
    db: Arc<Database>,
    state: Mutex<CacheState>,
    loads: AtomicUsize,
}

impl ContextCache {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            state: Mutex::new(CacheState {
                generation: 0,
                slot: Slot::Empty,
            }),
            loads: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self) -> Lookup {
        let mut state = self.lock();
        let generation = state.generation;
        match &state.slot {
            Slot::Ready(context) => return Lookup::Ready(context.clone()),
            Slot::Loading(load) => return Lookup::Wait(generation, load.clone()),
            Slot::Empty => {}
        }

        self.loads.fetch_add(1, Ordering::SeqCst);
        let db = self.db.clone();
        let load = async move {
            db.run_blocking(load_context).await.map(Arc::new)
        }
        .boxed()
        .shared();
        state.slot = Slot::Loading(load.clone());
        Lookup::Wait(generation, load)
    }

    fn settle(&self, generation: u64, result: &Result<Arc<AiContext>, StoreError>) {
        let mut state = self.lock();
        if state.generation != generation || !matches!(state.slot, Slot::Loading(_)) {
            debug!(generation, "discarding stale context load");
            return;
        }
        state.slot = match result {
            Ok(context) => Slot::Ready(context.clone()),
            Err(_) => Slot::Empty,
        };
    }

    /// Returns the context, loading it on first use.
    pub async fn get(&self) -> Result<Arc<AiContext>, StoreError> {
        let (generation, load) = match self.lookup() {
            Lookup::Ready(context) => return Ok(context),
            Lookup::Wait(generation, load) => (generation, load),
        };
        let result = load.await;
        self.settle(generation, &result);
        result
    }

    /// Drops the snapshot; the next `get` reloads from the store.
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.slot = Slot::Empty;
    }

    /// Folds a freshly saved bookmark into the snapshot.
    ///
    /// Tag names not yet present (exact match) are appended and the list is
    /// cut back to the newest `MAX_CONTEXT_TAGS`; the bookmark summary goes to
    /// the front of the recent list. An in-flight load is abandoned since it
    /// may predate the save.
    pub fn patch_after_save(&self, title: &str, tags: &[String]) {
        let mut guard = self.lock();
        let state = &mut *guard;
        match &mut state.slot {
            Slot::Ready(context) => {
                let context = Arc::make_mut(context);
                for tag in tags {
                    if !context.existing_tags.iter().any(|t| t == tag) {
                        context.existing_tags.push(tag.clone());
                    }
                }
                let len = context.existing_tags.len();
                if len > MAX_CONTEXT_TAGS {
                    context.existing_tags.drain(..len - MAX_CONTEXT_TAGS);
                }
                context.recent_bookmarks.insert(
                    0,
                    RecentBookmark {
                        title: title.to_string(),
                        tags: tags.to_vec(),
                    },
                );
                context.recent_bookmarks.truncate(MAX_RECENT_BOOKMARKS);
            }
            Slot::Loading(_) => {
                state.generation += 1;
                state.slot = Slot::Empty;
            }
            Slot::Empty => {}
        }
    }

    /// Current snapshot without triggering a load.
    pub fn peek(&self) -> Option<Arc<AiContext>> {
        match &self.lock().slot {
            Slot::Ready(context) => Some(context.clone()),
            _ => None,
        }
    }

    /// Number of store loads started so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}
