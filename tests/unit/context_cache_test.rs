//! Unit tests for the shared recommendation context cache.

use std::sync::Arc;

use tmarks::database::Database;
use tmarks::managers::bookmark_manager::{BookmarkManager, BookmarkManagerTrait};
use tmarks::managers::tag_manager::{TagManager, TagManagerTrait};
use tmarks::services::context_cache::{load_context, ContextCache, MAX_CONTEXT_TAGS, MAX_RECENT_BOOKMARKS};
use tmarks::types::bookmark::BookmarkInput;

fn seeded_db() -> Arc<Database> {
    let db = Arc::new(Database::open_in_memory().unwrap());
    {
        let conn = db.connection();
        let mut tags = TagManager::new(&conn);
        for _ in 0..3 {
            tags.increment_usage("rust").unwrap();
        }
        tags.increment_usage("web").unwrap();

        let mut bookmarks = BookmarkManager::new(&conn);
        bookmarks
            .add_bookmark(
                &BookmarkInput {
                    url: "https://doc.rust-lang.org".to_string(),
                    title: "Rust docs".to_string(),
                    tags: vec!["rust".to_string()],
                    ..Default::default()
                },
                Some("r1"),
            )
            .unwrap();
    }
    db
}

fn tags(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[test]
fn test_load_context_orders_tags_by_usage() {
    let db = seeded_db();
    let context = load_context(&db.connection()).unwrap();

    assert_eq!(context.existing_tags, tags(&["rust", "web"]));
    assert_eq!(context.recent_bookmarks.len(), 1);
    assert_eq!(context.recent_bookmarks[0].title, "Rust docs");
}

#[tokio::test]
async fn test_get_loads_once_and_reuses_snapshot() {
    let cache = ContextCache::new(seeded_db());
    assert!(cache.peek().is_none());

    let first = cache.get().await.unwrap();
    let second = cache.get().await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.load_count(), 1);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_load() {
    let cache = ContextCache::new(seeded_db());

    let (a, b) = tokio::join!(cache.get(), cache.get());

    assert_eq!(a.unwrap().existing_tags, b.unwrap().existing_tags);
    assert_eq!(cache.load_count(), 1);
}

#[tokio::test]
async fn test_invalidate_forces_reload() {
    let db = seeded_db();
    let cache = ContextCache::new(db.clone());
    cache.get().await.unwrap();

    {
        let conn = db.connection();
        TagManager::new(&conn).increment_usage("fresh").unwrap();
    }
    cache.invalidate();
    assert!(cache.peek().is_none());

    let context = cache.get().await.unwrap();
    assert!(context.existing_tags.contains(&"fresh".to_string()));
    assert_eq!(cache.load_count(), 2);
}

#[tokio::test]
async fn test_patch_after_save_updates_ready_snapshot() {
    let cache = ContextCache::new(seeded_db());
    cache.get().await.unwrap();

    cache.patch_after_save("Axum guide", &tags(&["rust", "axum"]));

    let context = cache.peek().unwrap();
    assert_eq!(context.existing_tags, tags(&["rust", "web", "axum"]));
    assert_eq!(context.recent_bookmarks[0].title, "Axum guide");
    assert_eq!(context.recent_bookmarks[0].tags, tags(&["rust", "axum"]));
    assert_eq!(cache.load_count(), 1, "patching must not reload");
}

#[tokio::test]
async fn test_patch_keeps_snapshots_handed_out_unchanged() {
    let cache = ContextCache::new(seeded_db());
    let before = cache.get().await.unwrap();

    cache.patch_after_save("New", &tags(&["new"]));

    assert!(!before.existing_tags.contains(&"new".to_string()));
    assert!(cache.peek().unwrap().existing_tags.contains(&"new".to_string()));
}

#[tokio::test]
async fn test_patch_respects_bounds() {
    let cache = ContextCache::new(Arc::new(Database::open_in_memory().unwrap()));
    cache.get().await.unwrap();

    for i in 0..(MAX_CONTEXT_TAGS + 10) {
        cache.patch_after_save(&format!("bookmark {}", i), &[format!("tag-{}", i)]);
    }

    let context = cache.peek().unwrap();
    assert_eq!(context.existing_tags.len(), MAX_CONTEXT_TAGS);
    assert_eq!(context.existing_tags.last().unwrap(), &format!("tag-{}", MAX_CONTEXT_TAGS + 9));
    assert_eq!(context.existing_tags[0], "tag-10");
    assert_eq!(context.recent_bookmarks.len(), MAX_RECENT_BOOKMARKS);
    assert_eq!(context.recent_bookmarks[0].title, format!("bookmark {}", MAX_CONTEXT_TAGS + 9));
}

#[test]
fn test_patch_without_snapshot_is_noop() {
    let cache = ContextCache::new(seeded_db());
    cache.patch_after_save("Ignored", &tags(&["x"]));
    assert!(cache.peek().is_none());
    assert_eq!(cache.load_count(), 0);
}
