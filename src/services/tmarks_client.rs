//! Remote TMarks API client.
//!
//! [`BookmarkApi`] is the remote system of record the sync services talk to;
//! [`TmarksClient`] implements it over HTTP with `reqwest`. Every failure is
//! surfaced as an [`ApiError`]; transport failures carry status 0 and the
//! `NETWORK_ERROR` code.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use crate::types::bookmark::BookmarkInput;
use crate::types::errors::ApiError;
use crate::types::remote::{
    AddBookmarkOutcome, BookmarkPage, CreateTabGroupInput, RemoteBookmark, RemoteTabItem, RemoteTag,
    SnapshotPayload,
};

/// Operations of the remote bookmark/tab-group service.
#[async_trait]
pub trait BookmarkApi: Send + Sync {
    async fn add_bookmark(&self, input: &BookmarkInput) -> Result<AddBookmarkOutcome, ApiError>;
    async fn get_tags(&self) -> Result<Vec<RemoteTag>, ApiError>;
    /// `page` is 1-based.
    async fn get_bookmarks(&self, page: u32, page_size: u32) -> Result<BookmarkPage, ApiError>;
    async fn create_snapshot_v2(&self, bookmark_id: &str, payload: &SnapshotPayload) -> Result<(), ApiError>;
    /// Returns the remote id of the created group.
    async fn create_tab_group(&self, input: &CreateTabGroupInput) -> Result<String, ApiError>;
    async fn add_items_to_group(&self, group_id: &str, items: &[RemoteTabItem]) -> Result<(), ApiError>;
}

/// Builds an [`ApiError`] from a non-2xx response body.
///
/// Understands `{"error": {"code", "message"}}`, `{"error": "..."}` and
/// `{"message": "..."}`; anything else falls back to the HTTP status.
pub fn api_error_from_body(status: u16, body: &str) -> ApiError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let error = parsed.get("error");
    let code = error
        .and_then(|e| e.get("code"))
        .or_else(|| parsed.get("code"))
        .and_then(Value::as_str);
    let message = error
        .and_then(|e| e.get("message").and_then(Value::as_str).or_else(|| e.as_str()))
        .or_else(|| parsed.get("message").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status));
    ApiError::new(message, code, Some(status))
}

fn payload(body: &Value) -> &Value {
    body.get("data").unwrap_or(body)
}

fn invalid_response(what: &str) -> ApiError {
    ApiError::new(format!("Invalid {} response", what), Some("INVALID_RESPONSE"), None)
}

/// Interprets an `addBookmark` response.
pub fn parse_add_bookmark(body: &Value) -> Result<AddBookmarkOutcome, ApiError> {
    let data = payload(body);
    let is_existing = data
        .get("is_existing")
        .or_else(|| data.get("isExisting"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let bookmark_value = data
        .get("bookmark")
        .or_else(|| data.get("existing_bookmark"))
        .or_else(|| data.get("existingBookmark"))
        .ok_or_else(|| invalid_response("addBookmark"))?;
    let bookmark: RemoteBookmark =
        serde_json::from_value(bookmark_value.clone()).map_err(|_| invalid_response("addBookmark"))?;

    Ok(AddBookmarkOutcome {
        id: bookmark.id.clone(),
        is_existing,
        existing_bookmark: if is_existing { Some(bookmark) } else { None },
    })
}

/// HTTP implementation of [`BookmarkApi`].
pub struct TmarksClient {
    client: reqwest::Client,
    base_url: RwLock<String>,
    api_key: RwLock<Option<String>>,
}

impl TmarksClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: RwLock::new(base_url.trim_end_matches('/').to_string()),
            api_key: RwLock::new(api_key),
        }
    }

    pub fn set_base_url(&self, base_url: &str) {
        *self.base_url.write().unwrap_or_else(PoisonError::into_inner) =
            base_url.trim_end_matches('/').to_string();
    }

    pub fn set_api_key(&self, api_key: Option<String>) {
        *self.api_key.write().unwrap_or_else(PoisonError::into_inner) =
            api_key.filter(|k| !k.trim().is_empty());
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, ApiError> {
        let url = format!(
            "{}{}",
            self.base_url.read().unwrap_or_else(PoisonError::into_inner),
            path
        );
        let api_key = self
            .api_key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| ApiError::new("TMarks API Key 未配置", Some("MISSING_API_KEY"), None))?;

        debug!(%method, %url, "TMarks API request");
        let mut builder = self
            .client
            .request(method, &url)
            .header("X-API-Key", api_key);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::network(format!("网络请求失败: {}", e)))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::network(format!("网络请求失败: {}", e)))?;

        if !(200..300).contains(&status) {
            return Err(api_error_from_body(status, &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|_| invalid_response(path))
    }
}

#[async_trait]
impl BookmarkApi for TmarksClient {
    async fn add_bookmark(&self, input: &BookmarkInput) -> Result<AddBookmarkOutcome, ApiError> {
        let body = json!({
            "url": input.url,
            "title": input.title,
            "description": input.description,
            "tags": input.tags,
            "cover_image": input.cover_image,
            "is_public": input.is_public,
        });
        let response = self.request(Method::POST, "/tab/bookmarks", Some(body)).await?;
        parse_add_bookmark(&response)
    }

    async fn get_tags(&self) -> Result<Vec<RemoteTag>, ApiError> {
        let response = self.request(Method::GET, "/tab/tags", None).await?;
        let tags = payload(&response)
            .get("tags")
            .cloned()
            .ok_or_else(|| invalid_response("getTags"))?;
        serde_json::from_value(tags).map_err(|_| invalid_response("getTags"))
    }

    async fn get_bookmarks(&self, page: u32, page_size: u32) -> Result<BookmarkPage, ApiError> {
        let path = format!("/tab/bookmarks?page={}&page_size={}", page, page_size);
        let response = self.request(Method::GET, &path, None).await?;
        let data = payload(&response);
        let bookmarks: Vec<RemoteBookmark> = data
            .get("bookmarks")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|_| invalid_response("getBookmarks"))?
            .unwrap_or_default();
        let has_more = data
            .get("has_more")
            .or_else(|| data.pointer("/meta/has_more"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(BookmarkPage { bookmarks, has_more })
    }

    async fn create_snapshot_v2(&self, bookmark_id: &str, payload: &SnapshotPayload) -> Result<(), ApiError> {
        let body = serde_json::to_value(payload).map_err(|_| invalid_response("createSnapshotV2"))?;
        let path = format!("/tab/bookmarks/{}/snapshots-v2", bookmark_id);
        self.request(Method::POST, &path, Some(body)).await?;
        Ok(())
    }

    async fn create_tab_group(&self, input: &CreateTabGroupInput) -> Result<String, ApiError> {
        let body = serde_json::to_value(input).map_err(|_| invalid_response("createTabGroup"))?;
        let response = self.request(Method::POST, "/tab/tab-groups", Some(body)).await?;
        payload(&response)
            .pointer("/tab_group/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| invalid_response("createTabGroup"))
    }

    async fn add_items_to_group(&self, group_id: &str, items: &[RemoteTabItem]) -> Result<(), ApiError> {
        let path = format!("/tab/tab-groups/{}/items", group_id);
        self.request(Method::POST, &path, Some(json!({ "items": items })))
            .await?;
        Ok(())
    }
}
