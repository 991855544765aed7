//! RPC method handler for the TMarks JSON-RPC protocol.
//!
//! Extracted from `rpc_server.rs` so it can be unit-tested independently.
//! The `handle_method` function dispatches JSON-RPC method calls to the
//! appropriate services via the `App` struct.

use std::sync::{Arc, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::app::App;
use crate::services::ai_adapter::provider_catalog;
use crate::services::ai_config::AiRuntimeConfig;
use crate::services::bookmark_sync::SnapshotRequest;
use crate::services::page_capture::PrecapturedPage;
use crate::services::settings_engine::SettingsEngineTrait;
use crate::types::ai::ProviderKind;
use crate::types::bookmark::BookmarkInput;
use crate::types::capture::{CaptureOptions, CapturedPage};
use crate::types::page::PageInfo;
use crate::types::tab_group::{CollectMode, TabInput};

fn parse<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, String> {
    serde_json::from_value(value).map_err(|e| format!("invalid {}: {}", what, e))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

fn provider_param(params: &Value) -> Result<Option<ProviderKind>, String> {
    params
        .get("provider")
        .and_then(|v| v.as_str())
        .map(str::parse)
        .transpose()
}

/// Dispatch a JSON-RPC method call to the appropriate handler.
///
/// Returns `Ok(Value)` on success or `Err(String)` with an error message.
pub async fn handle_method(app: &App, method: &str, params: &Value) -> Result<Value, String> {
    match method {
        "ping" => Ok(json!({"ok": true, "version": env!("CARGO_PKG_VERSION")})),

        // ─── AI ───
        "ai.providers" => to_json(&provider_catalog()),
        "ai.set_key" => {
            let provider = provider_param(params)?.ok_or("missing provider")?;
            let api_key = params
                .get("api_key")
                .and_then(|v| v.as_str())
                .ok_or("missing api_key")?
                .to_string();
            app.with_vault(move |vault| vault.set_ai_key(provider, &api_key))
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }
        "ai.test" => {
            let mut settings = app
                .settings
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get_settings()
                .clone();
            if let Some(provider) = provider_param(params)? {
                settings.ai.provider = provider;
            }
            let api_key = match params.get("api_key").and_then(|v| v.as_str()) {
                Some(key) => Some(key.to_string()),
                None => {
                    let provider = settings.ai.provider;
                    app.with_vault(move |vault| vault.ai_key(provider))
                        .await
                        .map_err(|e| e.to_string())?
                }
            };
            let call = AiRuntimeConfig::from_settings(&settings, api_key)
                .provider_call()
                .ok_or("missing api_key")?;
            app.recommender
                .provider()
                .test_connection(&call)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({"ok": true, "provider": call.kind}))
        }
        "ai.recommend" => {
            let page: PageInfo = parse(params.clone(), "page")?;
            if page.title.trim().is_empty() && page.url.trim().is_empty() {
                return Err("missing title or url".to_string());
            }
            let result = app.recommender.recommend(&page).await;
            to_json(&result)
        }

        // ─── Bookmarks ───
        "bookmark.save" => {
            let input: BookmarkInput = parse(params.get("bookmark").cloned().ok_or("missing bookmark")?, "bookmark")?;
            let snapshot = match params.get("capture").cloned() {
                Some(capture) if input.create_snapshot => {
                    let page: CapturedPage = parse(capture, "capture")?;
                    let options: CaptureOptions = match params.get("capture_options").cloned() {
                        Some(options) => parse(options, "capture_options")?,
                        None => CaptureOptions::default(),
                    };
                    Some(SnapshotRequest {
                        capturer: Arc::new(PrecapturedPage::new(page)),
                        options,
                    })
                }
                _ => None,
            };
            let result = app
                .bookmark_sync
                .save_bookmark(input, snapshot)
                .await
                .map_err(|e| e.to_string())?;
            to_json(&result)
        }
        "bookmark.sync_pending" => {
            let report = app
                .bookmark_sync
                .sync_pending_bookmarks()
                .await
                .map_err(|e| e.to_string())?;
            to_json(&report)
        }

        // ─── Local cache ───
        "cache.full_sync" => {
            let status = app
                .bookmark_sync
                .refresh_from_remote()
                .await
                .map_err(|e| e.to_string())?;
            to_json(&status)
        }
        "cache.clear" => {
            app.bookmark_sync.clear_local_cache().await.map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }
        "cache.status" => {
            let status = app.bookmark_sync.cache_status().await.map_err(|e| e.to_string())?;
            to_json(&status)
        }

        // ─── Tab groups ───
        "tab_group.collect" => {
            let mode: CollectMode = parse(params.clone(), "mode")?;
            let tabs: Vec<TabInput> = parse(params.get("tabs").cloned().ok_or("missing tabs")?, "tabs")?;
            let result = app
                .tab_groups
                .collect_tabs(mode, tabs)
                .await
                .map_err(|e| e.to_string())?;
            to_json(&result)
        }
        "tab_group.sync" => {
            let report = app
                .tab_groups
                .sync_unsynced_groups()
                .await
                .map_err(|e| e.to_string())?;
            to_json(&report)
        }
        "tab_group.restore" => {
            let id = params.get("id").and_then(|v| v.as_str()).ok_or("missing id")?;
            let urls = app.tab_groups.restore_tab_group(id).await.map_err(|e| e.to_string())?;
            Ok(json!({"urls": urls}))
        }
        "tab_group.tree" => {
            let tree = app.tab_groups.group_tree().await.map_err(|e| e.to_string())?;
            to_json(&tree)
        }

        // ─── TMarks remote ───
        "tmarks.set_key" => {
            let api_key = params.get("api_key").and_then(|v| v.as_str()).ok_or("missing api_key")?;
            app.set_tmarks_key(api_key).await.map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }

        // ─── Settings ───
        "settings.get" => {
            let settings = app.settings.read().unwrap_or_else(PoisonError::into_inner);
            to_json(settings.get_settings())
        }
        "settings.set" => {
            let key = params.get("key").and_then(|v| v.as_str()).ok_or("missing key")?;
            let value = params.get("value").cloned().ok_or("missing value")?;
            {
                let mut settings = app.settings.write().unwrap_or_else(PoisonError::into_inner);
                settings.set_value(key, value).map_err(|e| e.to_string())?;
            }
            if key.starts_with("tmarks.") {
                app.apply_remote_settings();
            }
            Ok(json!({"ok": true}))
        }

        _ => Err(format!("unknown method: {}", method)),
    }
}
