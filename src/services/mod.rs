// TMarks services
// Services provide the AI recommendation pipeline, remote sync, key storage and settings.

pub mod ai_adapter;
pub mod ai_config;
pub mod ai_provider;
pub mod bookmark_sync;
pub mod context_cache;
pub mod key_vault;
pub mod page_capture;
pub mod settings_engine;
pub mod tab_group_sync;
pub mod tag_recommender;
pub mod tmarks_client;
