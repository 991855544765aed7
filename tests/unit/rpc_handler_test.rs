//! Dispatch tests for the JSON-RPC method handler.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use tmarks::app::App;
use tmarks::database::Database;
use tmarks::rpc_handler::handle_method;
use tmarks::services::ai_adapter::{AiTransport, HttpReply, VendorRequest};
use tmarks::services::settings_engine::SettingsEngine;
use tmarks::services::tmarks_client::BookmarkApi;
use tmarks::types::bookmark::BookmarkInput;
use tmarks::types::errors::{AdapterError, ApiError};
use tmarks::types::remote::{
    AddBookmarkOutcome, BookmarkPage, CreateTabGroupInput, RemoteTabItem, RemoteTag, SnapshotPayload,
};

struct TagTransport;

#[async_trait]
impl AiTransport for TagTransport {
    async fn post_json(&self, _request: &VendorRequest) -> Result<HttpReply, AdapterError> {
        let content = json!({"suggestedTags": [{"name": "rust", "isNew": false, "confidence": 0.9}]}).to_string();
        Ok(HttpReply {
            status: 200,
            body: json!({"choices": [{"message": {"content": content}}]}).to_string(),
        })
    }
}

#[derive(Default)]
struct RecordingApi {
    snapshots: Mutex<Vec<String>>,
}

#[async_trait]
impl BookmarkApi for RecordingApi {
    async fn add_bookmark(&self, _input: &BookmarkInput) -> Result<AddBookmarkOutcome, ApiError> {
        Ok(AddBookmarkOutcome { id: "srv-1".to_string(), is_existing: false, existing_bookmark: None })
    }

    async fn get_tags(&self) -> Result<Vec<RemoteTag>, ApiError> {
        Ok(Vec::new())
    }

    async fn get_bookmarks(&self, _page: u32, _page_size: u32) -> Result<BookmarkPage, ApiError> {
        Ok(BookmarkPage::default())
    }

    async fn create_snapshot_v2(&self, bookmark_id: &str, _payload: &SnapshotPayload) -> Result<(), ApiError> {
        self.snapshots.lock().unwrap().push(bookmark_id.to_string());
        Ok(())
    }

    async fn create_tab_group(&self, _input: &CreateTabGroupInput) -> Result<String, ApiError> {
        Ok("g-1".to_string())
    }

    async fn add_items_to_group(&self, _group_id: &str, _items: &[RemoteTabItem]) -> Result<(), ApiError> {
        Ok(())
    }
}

fn test_app() -> (App, Arc<RecordingApi>, TempDir) {
    let dir = TempDir::new().unwrap();
    let settings_path = dir.path().join("settings.json").to_string_lossy().to_string();
    let db = Arc::new(Database::open_in_memory().unwrap());
    let api = Arc::new(RecordingApi::default());
    let app = App::with_collaborators(db, SettingsEngine::new(Some(settings_path)), Arc::new(TagTransport), api.clone())
        .unwrap();
    (app, api, dir)
}

async fn call(app: &App, method: &str, params: Value) -> Result<Value, String> {
    handle_method(app, method, &params).await
}

#[tokio::test]
async fn test_ping() {
    let (app, _api, _dir) = test_app();
    let result = call(&app, "ping", json!({})).await.unwrap();
    assert_eq!(result["ok"], true);
    assert_eq!(result["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_unknown_method() {
    let (app, _api, _dir) = test_app();
    let err = call(&app, "bookmark.nuke", json!({})).await.unwrap_err();
    assert_eq!(err, "unknown method: bookmark.nuke");
}

#[tokio::test]
async fn test_ai_providers_lists_every_vendor() {
    let (app, _api, _dir) = test_app();
    let result = call(&app, "ai.providers", json!({})).await.unwrap();
    assert_eq!(result.as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn test_recommend_without_key_uses_fallback() {
    let (app, _api, _dir) = test_app();
    let result = call(&app, "ai.recommend", json!({"title": "Rust book", "url": "https://example.com"}))
        .await
        .unwrap();
    assert_eq!(result["source"], "fallback");
}

#[tokio::test]
async fn test_recommend_with_stored_key_uses_provider() {
    let (app, _api, _dir) = test_app();
    call(&app, "ai.set_key", json!({"provider": "openai", "api_key": "sk-test"}))
        .await
        .unwrap();

    let result = call(&app, "ai.recommend", json!({"title": "Rust book", "url": "https://example.com"}))
        .await
        .unwrap();

    assert_eq!(result["source"], "ai");
    assert_eq!(result["suggestions"][0]["name"], "rust");
}

#[tokio::test]
async fn test_recommend_requires_title_or_url() {
    let (app, _api, _dir) = test_app();
    let err = call(&app, "ai.recommend", json!({"title": " ", "url": ""})).await.unwrap_err();
    assert_eq!(err, "missing title or url");
}

#[tokio::test]
async fn test_set_key_validates_params() {
    let (app, _api, _dir) = test_app();
    assert!(call(&app, "ai.set_key", json!({"provider": "nope", "api_key": "k"})).await.is_err());
    assert_eq!(
        call(&app, "ai.set_key", json!({"provider": "openai"})).await.unwrap_err(),
        "missing api_key"
    );
}

#[tokio::test]
async fn test_ai_test_with_explicit_key() {
    let (app, _api, _dir) = test_app();
    let result = call(&app, "ai.test", json!({"provider": "deepseek", "api_key": "sk"})).await.unwrap();
    assert_eq!(result["provider"], "deepseek");
}

#[tokio::test]
async fn test_save_bookmark_updates_cache_status() {
    let (app, _api, _dir) = test_app();
    let result = call(
        &app,
        "bookmark.save",
        json!({"bookmark": {"url": "https://example.com", "title": "Example", "tags": ["rust"]}}),
    )
    .await
    .unwrap();
    assert_eq!(result["bookmarkId"], "srv-1");

    let status = call(&app, "cache.status", json!({})).await.unwrap();
    assert_eq!(status["tags"], 1);
    assert_eq!(status["bookmarks"], 1);
    assert_eq!(status["pending"], 0);

    call(&app, "cache.clear", json!({})).await.unwrap();
    let status = call(&app, "cache.status", json!({})).await.unwrap();
    assert_eq!(status["bookmarks"], 0);
}

#[tokio::test]
async fn test_save_bookmark_with_capture_uploads_snapshot() {
    let (app, api, _dir) = test_app();
    call(
        &app,
        "bookmark.save",
        json!({
            "bookmark": {"url": "https://example.com", "title": "Example", "tags": ["rust"], "createSnapshot": true},
            "capture": {"html": "<html/>", "images": []}
        }),
    )
    .await
    .unwrap();

    app.bookmark_sync.wait_for_snapshots().await;
    assert_eq!(*api.snapshots.lock().unwrap(), vec!["srv-1".to_string()]);
}

#[tokio::test]
async fn test_save_bookmark_validation_error() {
    let (app, _api, _dir) = test_app();
    assert_eq!(call(&app, "bookmark.save", json!({})).await.unwrap_err(), "missing bookmark");
    let err = call(&app, "bookmark.save", json!({"bookmark": {"url": "https://example.com", "title": "x"}}))
        .await
        .unwrap_err();
    assert!(err.starts_with("Validation error"));
}

#[tokio::test]
async fn test_tab_group_collect_restore_and_tree() {
    let (app, _api, _dir) = test_app();
    let result = call(
        &app,
        "tab_group.collect",
        json!({
            "mode": "new",
            "title": "Reading",
            "tabs": [
                {"title": "A", "url": "https://a.example"},
                {"title": "B", "url": "https://b.example"}
            ]
        }),
    )
    .await
    .unwrap();
    assert_eq!(result["remoteId"], "g-1");
    let group_id = result["groupId"].as_str().unwrap().to_string();

    let restored = call(&app, "tab_group.restore", json!({"id": group_id})).await.unwrap();
    assert_eq!(restored["urls"], json!(["https://a.example", "https://b.example"]));

    let tree = call(&app, "tab_group.tree", json!({})).await.unwrap();
    assert_eq!(tree[0]["group"]["title"], "Reading");
}

#[tokio::test]
async fn test_tab_group_collect_requires_tabs() {
    let (app, _api, _dir) = test_app();
    let err = call(&app, "tab_group.collect", json!({"mode": "new", "title": "Reading"}))
        .await
        .unwrap_err();
    assert_eq!(err, "missing tabs");
}

#[tokio::test]
async fn test_settings_set_and_get() {
    let (app, _api, _dir) = test_app();
    call(&app, "settings.set", json!({"key": "preferences.max_suggested_tags", "value": 8}))
        .await
        .unwrap();

    let settings = call(&app, "settings.get", json!({})).await.unwrap();
    assert_eq!(settings["preferences"]["max_suggested_tags"], 8);

    assert!(call(&app, "settings.set", json!({"key": "nope.nothing", "value": 1})).await.is_err());
}
