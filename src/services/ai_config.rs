//! Runtime AI configuration for TMarks.
//!
//! The recommender asks an [`AiConfigSource`] for the provider selection,
//! credentials and tuning on every request. [`StoredAiConfig`] reads them from
//! the settings file and the key vault.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::services::ai_adapter::vendor_profile;
use crate::services::ai_provider::ProviderCall;
use crate::services::key_vault::KeyVault;
use crate::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use crate::types::ai::{ProviderKind, RecommendOptions};
use crate::types::errors::VaultError;
use crate::types::settings::AssistantSettings;

/// Everything one recommendation needs to reach a vendor.
#[derive(Debug, Clone)]
pub struct AiRuntimeConfig {
    pub provider: ProviderKind,
    /// `None` when no key is configured for `provider`.
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: Option<String>,
    pub custom_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Total attempts, including the first.
    pub max_retries: u32,
    /// Per-attempt budget; 0 disables the timeout.
    pub timeout_ms: u64,
    pub options: RecommendOptions,
}

impl AiRuntimeConfig {
    pub fn from_settings(settings: &AssistantSettings, api_key: Option<String>) -> Self {
        let ai = &settings.ai;
        let provider = ai.provider;
        let id = provider.as_str();
        let model = ai
            .models
            .get(id)
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .unwrap_or(vendor_profile(provider).default_model)
            .to_string();
        let api_url = ai
            .api_urls
            .get(id)
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        let custom_prompt = if ai.custom_prompt_enabled && !ai.custom_prompt.trim().is_empty() {
            Some(ai.custom_prompt.clone())
        } else {
            None
        };

        Self {
            provider,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model,
            api_url,
            custom_prompt,
            temperature: ai.temperature,
            max_tokens: ai.max_tokens,
            max_retries: ai.max_retries,
            timeout_ms: ai.timeout_ms,
            options: RecommendOptions {
                max_tags: settings.preferences.max_suggested_tags,
                prefer_existing: settings.preferences.prefer_existing_tags,
            },
        }
    }

    /// Vendor call parameters; `None` without an API key.
    pub fn provider_call(&self) -> Option<ProviderCall> {
        let api_key = self.api_key.clone()?;
        Some(ProviderCall {
            kind: self.provider,
            api_key,
            model: self.model.clone(),
            api_url: self.api_url.clone(),
            custom_prompt: self.custom_prompt.clone(),
            temperature: Some(self.temperature),
            max_tokens: self.max_tokens,
        })
    }
}

/// Source of the runtime AI configuration.
#[async_trait]
pub trait AiConfigSource: Send + Sync {
    async fn load(&self) -> Result<AiRuntimeConfig, VaultError>;
}

/// Settings file plus key vault.
pub struct StoredAiConfig {
    settings: Arc<RwLock<SettingsEngine>>,
    vault: Arc<KeyVault>,
}

impl StoredAiConfig {
    pub fn new(settings: Arc<RwLock<SettingsEngine>>, vault: Arc<KeyVault>) -> Self {
        Self { settings, vault }
    }
}

#[async_trait]
impl AiConfigSource for StoredAiConfig {
    async fn load(&self) -> Result<AiRuntimeConfig, VaultError> {
        let settings = self
            .settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get_settings()
            .clone();
        let vault = self.vault.clone();
        let provider = settings.ai.provider;
        let api_key = tokio::task::spawn_blocking(move || vault.ai_key(provider))
            .await
            .map_err(|e| VaultError::Decryption(format!("key lookup task failed: {}", e)))??;
        Ok(AiRuntimeConfig::from_settings(&settings, api_key))
    }
}
