use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ai::ProviderKind;

/// Top-level assistant settings container.
///
/// API keys are not part of this struct; they live encrypted in the key vault.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AssistantSettings {
    #[serde(default)]
    pub ai: AiSettings,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub tmarks: TmarksSettings,
}

/// AI provider selection and invocation tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiSettings {
    pub provider: ProviderKind,
    /// Model override per provider id; vendor default otherwise.
    #[serde(default)]
    pub models: HashMap<String, String>,
    /// Base URL or full endpoint override per provider id.
    #[serde(default)]
    pub api_urls: HashMap<String, String>,
    #[serde(default)]
    pub custom_prompt_enabled: bool,
    #[serde(default)]
    pub custom_prompt: String,
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Total attempts per recommendation, including the first.
    pub max_retries: u32,
    /// Per-attempt budget in milliseconds; 0 disables the timeout.
    pub timeout_ms: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAI,
            models: HashMap::new(),
            api_urls: HashMap::new(),
            custom_prompt_enabled: false,
            custom_prompt: String::new(),
            temperature: 0.7,
            max_tokens: None,
            max_retries: 3,
            timeout_ms: 30_000,
        }
    }
}

/// User preferences for capture and recommendation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preferences {
    pub max_suggested_tags: usize,
    pub prefer_existing_tags: bool,
    pub default_public: bool,
    pub create_snapshot: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            max_suggested_tags: 5,
            prefer_existing_tags: true,
            default_public: false,
            create_snapshot: false,
        }
    }
}

/// Remote TMarks service location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TmarksSettings {
    pub api_url: String,
}

impl Default for TmarksSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8787/api".to_string(),
        }
    }
}
