use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::page::PageInfo;

/// Supported AI vendors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Anthropic,
    DeepSeek,
    Zhipu,
    ModelScope,
    SiliconFlow,
    IFlow,
    Custom,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 8] = [
        ProviderKind::OpenAI,
        ProviderKind::Anthropic,
        ProviderKind::DeepSeek,
        ProviderKind::Zhipu,
        ProviderKind::ModelScope,
        ProviderKind::SiliconFlow,
        ProviderKind::IFlow,
        ProviderKind::Custom,
    ];

    /// Stable identifier used in settings, key storage and RPC params.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Zhipu => "zhipu",
            ProviderKind::ModelScope => "modelscope",
            ProviderKind::SiliconFlow => "siliconflow",
            ProviderKind::IFlow => "iflow",
            ProviderKind::Custom => "custom",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown AI provider: {}", s))
    }
}

/// Summary of a previously saved bookmark, fed to the model as context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecentBookmark {
    pub title: String,
    pub tags: Vec<String>,
}

/// Grounding context for a recommendation.
///
/// `existing_tags` is ordered most-used first (at most 200 entries);
/// `recent_bookmarks` is ordered most-recent first (at most 20 entries).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiContext {
    pub existing_tags: Vec<String>,
    pub recent_bookmarks: Vec<RecentBookmark>,
}

/// Per-request tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendOptions {
    pub max_tags: usize,
    pub prefer_existing: bool,
}

impl Default for RecommendOptions {
    fn default() -> Self {
        Self {
            max_tags: 5,
            prefer_existing: true,
        }
    }
}

/// A fully built recommendation request. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiRequest {
    pub page: PageInfo,
    pub context: AiContext,
    pub options: RecommendOptions,
}

/// Single tag suggested by a provider or by the keyword fallback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TagSuggestion {
    pub name: String,
    pub is_new: bool,
    pub confidence: f64,
}

/// Parsed provider output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiResponse {
    pub suggested_tags: Vec<TagSuggestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_description: Option<String>,
}

/// Where a recommendation came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationSource {
    Ai,
    Fallback,
}

/// Final, validated recommendation handed to the UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResult {
    pub suggestions: Vec<TagSuggestion>,
    pub source: RecommendationSource,
    /// Why the fallback was used; only set when `source == Fallback`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_description: Option<String>,
}

/// Catalog entry describing a vendor for the settings UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub kind: ProviderKind,
    pub display_name: String,
    pub default_base_url: Option<String>,
    pub default_model: String,
    pub default_max_tokens: u32,
}
