//! Unit tests for the local tag/bookmark mirror and the offline queue.
//!
//! These tests exercise `BookmarkManagerTrait`, `TagManagerTrait` and
//! `PendingQueueTrait` against an in-memory SQLite database.

use tmarks::database::Database;
use tmarks::managers::bookmark_manager::{BookmarkManager, BookmarkManagerTrait};
use tmarks::managers::pending_queue::{PendingQueue, PendingQueueTrait, LAST_SYNC_KEY, PENDING_PREFIX};
use tmarks::managers::tag_manager::{TagManager, TagManagerTrait};
use tmarks::types::bookmark::BookmarkInput;
use tmarks::types::remote::{RemoteBookmark, RemoteTag};

fn input(url: &str, tags: &[&str]) -> BookmarkInput {
    BookmarkInput {
        url: url.to_string(),
        title: format!("Title of {}", url),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    }
}

// ─── Bookmarks ───

#[test]
fn test_add_and_get_bookmark_keeps_tags_and_remote_id() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection();
    let mut mgr = BookmarkManager::new(&conn);

    let id = mgr.add_bookmark(&input("https://example.com", &["rust", "web"]), Some("r1")).unwrap();
    let bookmark = mgr.get_bookmark(&id).unwrap().unwrap();

    assert_eq!(bookmark.tags, vec!["rust", "web"]);
    assert_eq!(bookmark.remote_id.as_deref(), Some("r1"));
    assert_eq!(mgr.find_by_url("https://example.com").unwrap().unwrap().id, id);
    assert!(mgr.find_by_url("https://other.example").unwrap().is_none());
}

#[test]
fn test_unsynced_bookmark_has_no_remote_id() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection();
    let mut mgr = BookmarkManager::new(&conn);

    let id = mgr.add_bookmark(&input("https://example.com", &["rust"]), None).unwrap();

    assert_eq!(mgr.get_bookmark(&id).unwrap().unwrap().remote_id, None);
}

#[test]
fn test_recent_bookmarks_newest_first_and_limited() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection();
    let mut mgr = BookmarkManager::new(&conn);
    for i in 0..5 {
        mgr.add_bookmark(&input(&format!("https://example.com/{}", i), &["t"]), None).unwrap();
    }

    let recent = mgr.recent_bookmarks(3).unwrap();

    let urls: Vec<&str> = recent.iter().map(|b| b.url.as_str()).collect();
    assert_eq!(urls, vec!["https://example.com/4", "https://example.com/3", "https://example.com/2"]);
}

#[test]
fn test_replace_all_keeps_remote_order() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection();
    let mut mgr = BookmarkManager::new(&conn);
    mgr.add_bookmark(&input("https://stale.example", &["old"]), None).unwrap();

    let remote: Vec<RemoteBookmark> = ["newest", "older"]
        .iter()
        .map(|id| RemoteBookmark {
            id: id.to_string(),
            url: format!("https://{}.example", id),
            title: id.to_string(),
            tags: vec![RemoteTag { id: "t".to_string(), name: "rust".to_string(), ..Default::default() }],
            ..Default::default()
        })
        .collect();
    mgr.replace_all(&remote).unwrap();

    assert_eq!(mgr.count().unwrap(), 2);
    let recent = mgr.recent_bookmarks(10).unwrap();
    assert_eq!(recent[0].remote_id.as_deref(), Some("newest"));
    assert_eq!(recent[0].tags, vec!["rust"]);
    assert!(mgr.find_by_url("https://stale.example").unwrap().is_none());

    mgr.clear().unwrap();
    assert_eq!(mgr.count().unwrap(), 0);
}

// ─── Tags ───

#[test]
fn test_increment_usage_creates_then_counts() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection();
    let mut tags = TagManager::new(&conn);

    let first = tags.increment_usage("rust").unwrap();
    let second = tags.increment_usage("rust").unwrap();

    assert_eq!(first.count, 1);
    assert_eq!(second.count, 2);
    assert_eq!(first.id, second.id);
    assert_eq!(tags.count().unwrap(), 1);
}

#[test]
fn test_top_tag_names_orders_by_count_then_name() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection();
    let mut tags = TagManager::new(&conn);
    for name in ["web", "rust", "rust", "async", "async"] {
        tags.increment_usage(name).unwrap();
    }

    assert_eq!(tags.top_tag_names(10).unwrap(), vec!["async", "rust", "web"]);
    assert_eq!(tags.top_tag_names(1).unwrap(), vec!["async"]);
}

#[test]
fn test_tag_replace_all_clamps_negative_counts() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection();
    let mut tags = TagManager::new(&conn);
    tags.increment_usage("stale").unwrap();

    tags.replace_all(&[
        RemoteTag { id: "1".to_string(), name: "rust".to_string(), count: 4, ..Default::default() },
        RemoteTag { id: "2".to_string(), name: "odd".to_string(), count: -3, ..Default::default() },
    ])
    .unwrap();

    assert!(tags.find_by_name("stale").unwrap().is_none());
    assert_eq!(tags.find_by_name("odd").unwrap().unwrap().count, 0);
    assert_eq!(tags.list_tags().unwrap().len(), 2);
}

// ─── Pending queue ───

#[test]
fn test_enqueue_lists_in_insertion_order() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection();
    let mut queue = PendingQueue::new(&conn);

    let first = queue.enqueue(&input("https://a.example", &["a"])).unwrap();
    let second = queue.enqueue(&input("https://b.example", &["b"])).unwrap();

    assert!(first.starts_with(PENDING_PREFIX));
    assert_ne!(first, second);
    let records = queue.list_pending().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].input.url, "https://a.example");
    assert_eq!(records[1].input.url, "https://b.example");
}

#[test]
fn test_metadata_is_not_counted_as_pending() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection();
    let mut queue = PendingQueue::new(&conn);

    queue.set_meta(LAST_SYNC_KEY, "1700000000000").unwrap();
    let key = queue.enqueue(&input("https://a.example", &["a"])).unwrap();

    assert_eq!(queue.pending_count().unwrap(), 1);
    assert_eq!(queue.get_meta(LAST_SYNC_KEY).unwrap().as_deref(), Some("1700000000000"));

    assert!(queue.delete_meta(&key).unwrap());
    assert!(!queue.delete_meta(&key).unwrap());
    assert_eq!(queue.pending_count().unwrap(), 0);
}
