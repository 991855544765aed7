//! App Core for TMarks.
//!
//! Central struct wiring the local store, settings, key vault, recommendation
//! pipeline and sync services together.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{info, warn};

use crate::database::Database;
use crate::services::ai_adapter::{AiTransport, ReqwestTransport};
use crate::services::ai_config::StoredAiConfig;
use crate::services::bookmark_sync::BookmarkSyncService;
use crate::services::context_cache::ContextCache;
use crate::services::key_vault::{KeyVault, INSTALL_SECRET_FILE};
use crate::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use crate::services::tab_group_sync::TabGroupSyncService;
use crate::services::tag_recommender::TagRecommender;
use crate::services::tmarks_client::{BookmarkApi, TmarksClient};
use crate::types::errors::{StoreError, VaultError};

/// Central application struct holding all services.
///
/// Managers are created on demand from `db.connection()` because they borrow
/// the connection with a lifetime.
pub struct App {
    pub db: Arc<Database>,
    pub settings: Arc<RwLock<SettingsEngine>>,
    pub vault: Arc<KeyVault>,
    pub context: Arc<ContextCache>,
    pub recommender: TagRecommender,
    pub bookmark_sync: BookmarkSyncService,
    pub tab_groups: TabGroupSyncService,
    /// HTTP client behind the sync services, absent when a custom
    /// [`BookmarkApi`] was injected.
    pub client: Option<Arc<TmarksClient>>,
}

impl App {
    /// Creates a new App with the HTTP collaborators.
    pub fn new(db_path: &str, settings_path: Option<String>) -> Result<Self, Box<dyn std::error::Error>> {
        let db = Arc::new(Database::open(db_path)?);
        let mut settings = SettingsEngine::new(settings_path);
        if let Err(e) = settings.load() {
            warn!(error = %e, "failed to load settings, using defaults");
        }

        let secret_path = Path::new(db_path).with_file_name(INSTALL_SECRET_FILE);
        let vault = Arc::new(
            KeyVault::open_with_secret_file(db.clone(), &secret_path)
                .map_err(|e| format!("KeyVault init failed: {}", e))?,
        );
        let tmarks_key = vault.tmarks_key().unwrap_or_else(|e| {
            warn!(error = %e, "failed to read TMarks API key");
            None
        });
        let client = Arc::new(TmarksClient::new(&settings.get_settings().tmarks.api_url, tmarks_key));

        let mut app = Self::assemble(db, settings, vault, Arc::new(ReqwestTransport::new()), client.clone());
        app.client = Some(client);
        info!(database = %db_path, "TMarks initialized");
        Ok(app)
    }

    /// Creates an App around caller-supplied collaborators.
    ///
    /// The key vault uses an in-memory install secret, so keys stored through
    /// this App are not readable by any other instance.
    pub fn with_collaborators(
        db: Arc<Database>,
        settings: SettingsEngine,
        transport: Arc<dyn AiTransport>,
        api: Arc<dyn BookmarkApi>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let vault = Arc::new(KeyVault::ephemeral(db.clone()).map_err(|e| format!("KeyVault init failed: {}", e))?);
        Ok(Self::assemble(db, settings, vault, transport, api))
    }

    fn assemble(
        db: Arc<Database>,
        settings: SettingsEngine,
        vault: Arc<KeyVault>,
        transport: Arc<dyn AiTransport>,
        api: Arc<dyn BookmarkApi>,
    ) -> Self {
        let settings = Arc::new(RwLock::new(settings));
        let context = Arc::new(ContextCache::new(db.clone()));
        let config = Arc::new(StoredAiConfig::new(settings.clone(), vault.clone()));
        let recommender = TagRecommender::new(db.clone(), context.clone(), config, transport);
        let bookmark_sync = BookmarkSyncService::new(db.clone(), api.clone(), context.clone());
        let tab_groups = TabGroupSyncService::new(db.clone(), api);

        Self {
            db,
            settings,
            vault,
            context,
            recommender,
            bookmark_sync,
            tab_groups,
            client: None,
        }
    }

    /// Re-applies the remote service URL after a settings change.
    pub fn apply_remote_settings(&self) {
        if let Some(client) = &self.client {
            let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner);
            client.set_base_url(&settings.get_settings().tmarks.api_url);
        }
    }

    /// Runs a key vault call on the blocking pool.
    pub async fn with_vault<T, F>(&self, f: F) -> Result<T, VaultError>
    where
        F: FnOnce(&KeyVault) -> Result<T, VaultError> + Send + 'static,
        T: Send + 'static,
    {
        let vault = self.vault.clone();
        tokio::task::spawn_blocking(move || f(&vault))
            .await
            .map_err(|e| VaultError::Storage(StoreError::Database(format!("vault task failed: {}", e))))?
    }

    /// Stores the TMarks API key and hands it to the HTTP client.
    pub async fn set_tmarks_key(&self, api_key: &str) -> Result<(), VaultError> {
        let stored = api_key.to_string();
        self.with_vault(move |vault| vault.set_tmarks_key(&stored)).await?;
        if let Some(client) = &self.client {
            client.set_api_key(Some(api_key.to_string()));
        }
        Ok(())
    }
}
