//! Tag recommendation engine for TMarks.
//!
//! Per request: load configuration and context concurrently, call the
//! configured vendor with retry and a per-attempt timeout, then validate the
//! suggestions against the user's existing tags. Any failure on the way ends
//! in the keyword fallback, so `recommend` itself never fails.
//!
//! A timed-out attempt is dropped, which cancels its in-flight HTTP request;
//! late results therefore never reach shared state.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::database::Database;
use crate::managers::tag_manager::{TagManager, TagManagerTrait};
use crate::services::ai_adapter::{AiAdapter, AiTransport};
use crate::services::ai_config::AiConfigSource;
use crate::services::ai_provider::{ProviderCall, ProviderClient};
use crate::services::context_cache::ContextCache;
use crate::types::ai::{AiRequest, AiResponse, RecommendationResult, RecommendationSource, TagSuggestion};
use crate::types::bookmark::Tag;
use crate::types::errors::AiError;
use crate::types::page::PageInfo;

/// Delay before the second attempt; doubles for each further attempt.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

pub const FALLBACK_CONFIDENCE: f64 = 0.6;
pub const FALLBACK_MAX_SUGGESTIONS: usize = 3;
pub const FALLBACK_MAX_TOKENS: usize = 20;

/// Whitespace and Unicode punctuation, CJK punctuation included.
pub const TOKEN_SEPARATOR_PATTERN: &str = r"[\s\p{P}]+";

static TOKEN_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(TOKEN_SEPARATOR_PATTERN).expect("token separator pattern is valid"));

/// Case-insensitive, whitespace-trimmed tag identity.
pub fn normalize_tag(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Removes duplicate names (first occurrence wins) and sorts by confidence,
/// highest first. Ties keep their relative order.
pub fn dedupe_and_sort(suggestions: Vec<TagSuggestion>) -> Vec<TagSuggestion> {
    let mut seen = HashSet::new();
    let mut unique: Vec<TagSuggestion> = suggestions
        .into_iter()
        .filter(|s| seen.insert(normalize_tag(&s.name)))
        .collect();
    unique.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    unique
}

/// Post-validation of vendor output.
///
/// Blank names are dropped, `is_new` is recomputed against `existing_tags`
/// regardless of what the vendor claimed, confidences are clamped to
/// `[0, 1]`, then the list is deduplicated, sorted and cut to `max_tags`.
pub fn validate_suggestions(
    suggestions: Vec<TagSuggestion>,
    existing_tags: &[String],
    max_tags: usize,
) -> Vec<TagSuggestion> {
    let existing: HashSet<String> = existing_tags.iter().map(|t| normalize_tag(t)).collect();
    let checked = suggestions
        .into_iter()
        .filter(|s| !s.name.trim().is_empty())
        .map(|s| {
            let name = s.name.trim().to_string();
            TagSuggestion {
                is_new: !existing.contains(&normalize_tag(&name)),
                confidence: if s.confidence.is_nan() {
                    0.5
                } else {
                    s.confidence.clamp(0.0, 1.0)
                },
                name,
            }
        })
        .collect();

    let mut result = dedupe_and_sort(checked);
    if max_tags > 0 {
        result.truncate(max_tags);
    }
    result
}

/// Splits text into lowercase keyword tokens longer than one character.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_SEPARATOR
        .split(&lowered)
        .filter(|token| token.chars().count() > 1)
        .take(FALLBACK_MAX_TOKENS)
        .map(str::to_string)
        .collect()
}

/// Keyword fallback: tags overlapping a title/description token by
/// case-insensitive substring in either direction, most used first.
pub fn keyword_match(page: &PageInfo, tags: &[Tag]) -> Vec<TagSuggestion> {
    let text = format!("{} {}", page.title, page.description.as_deref().unwrap_or_default());
    let tokens = tokenize(&text);
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut matched: Vec<&Tag> = tags
        .iter()
        .filter(|tag| {
            let name = normalize_tag(&tag.name);
            !name.is_empty()
                && tokens
                    .iter()
                    .any(|token| name.contains(token.as_str()) || token.contains(name.as_str()))
        })
        .collect();
    matched.sort_by(|a, b| b.count.cmp(&a.count));

    matched
        .into_iter()
        .take(FALLBACK_MAX_SUGGESTIONS)
        .map(|tag| TagSuggestion {
            name: tag.name.clone(),
            is_new: false,
            confidence: FALLBACK_CONFIDENCE,
        })
        .collect()
}

/// Orchestrates one recommendation per call.
pub struct TagRecommender {
    db: Arc<Database>,
    context: Arc<ContextCache>,
    config: Arc<dyn AiConfigSource>,
    provider: ProviderClient,
    backoff_base: Duration,
}

impl TagRecommender {
    pub fn new(
        db: Arc<Database>,
        context: Arc<ContextCache>,
        config: Arc<dyn AiConfigSource>,
        transport: Arc<dyn AiTransport>,
    ) -> Self {
        Self {
            db,
            context,
            config,
            provider: ProviderClient::new(AiAdapter::new(transport)),
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    /// Overrides the retry backoff base delay.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn provider(&self) -> &ProviderClient {
        &self.provider
    }

    /// Recommends tags for `page`. Never fails; see the module docs.
    pub async fn recommend(&self, page: &PageInfo) -> RecommendationResult {
        let (config, context) = tokio::join!(self.config.load(), self.context.get());

        let config = match config {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "failed to load AI configuration");
                return self.fallback(page, format!("AI 配置读取失败: {}", e)).await;
            }
        };
        let call = match config.provider_call() {
            Some(call) => call,
            None => {
                debug!(provider = %config.provider, "no API key configured, using keyword fallback");
                return self.fallback(page, "未配置 AI API Key，已使用关键词匹配".to_string()).await;
            }
        };
        let context = match context {
            Ok(context) => context,
            Err(e) => {
                warn!(error = %e, "failed to load recommendation context");
                return self.fallback(page, format!("上下文加载失败: {}", e)).await;
            }
        };

        let request = AiRequest {
            page: page.clone(),
            context: context.as_ref().clone(),
            options: config.options.clone(),
        };

        match self
            .invoke_with_retry(&request, &call, config.max_retries, config.timeout_ms)
            .await
        {
            Ok(response) => {
                let suggestions = validate_suggestions(
                    response.suggested_tags,
                    &request.context.existing_tags,
                    request.options.max_tags,
                );
                info!(provider = %call.kind, count = suggestions.len(), "AI tag recommendation succeeded");
                RecommendationResult {
                    suggestions,
                    source: RecommendationSource::Ai,
                    reason: None,
                    reasoning: response.reasoning,
                    translated_title: response.translated_title,
                    translated_description: response.translated_description,
                }
            }
            Err(e) => {
                warn!(provider = %call.kind, error = %e, "AI recommendation failed, using keyword fallback");
                self.fallback(page, format!("AI 推荐失败: {}", e)).await
            }
        }
    }

    async fn attempt(
        &self,
        request: &AiRequest,
        call: &ProviderCall,
        timeout_ms: u64,
    ) -> Result<AiResponse, AiError> {
        if timeout_ms == 0 {
            return self.provider.analyze(request, call).await;
        }
        match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.provider.analyze(request, call),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AiError::Timeout(timeout_ms)),
        }
    }

    /// Serialized attempts with exponential backoff between them.
    async fn invoke_with_retry(
        &self,
        request: &AiRequest,
        call: &ProviderCall,
        max_attempts: u32,
        timeout_ms: u64,
    ) -> Result<AiResponse, AiError> {
        let attempts = max_attempts.max(1);
        let mut last_error = AiError::service(call.kind.as_str(), "no attempt made");

        for attempt in 0..attempts {
            match self.attempt(request, call, timeout_ms).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(provider = %call.kind, attempt = attempt + 1, of = attempts, error = %e, "AI attempt failed");
                    last_error = e;
                }
            }
            if attempt + 1 < attempts {
                let delay = self.backoff_base.saturating_mul(2u32.saturating_pow(attempt));
                tokio::time::sleep(delay).await;
            }
        }
        Err(last_error)
    }

    async fn fallback(&self, page: &PageInfo, reason: String) -> RecommendationResult {
        let tags = self
            .db
            .run_blocking(|conn| TagManager::new(conn).list_tags())
            .await;

        let suggestions = match tags {
            Ok(tags) => keyword_match(page, &tags),
            Err(e) => {
                warn!(error = %e, "keyword fallback could not read tags");
                Vec::new()
            }
        };

        RecommendationResult {
            suggestions,
            source: RecommendationSource::Fallback,
            reason: Some(reason),
            reasoning: None,
            translated_title: None,
            translated_description: None,
        }
    }
}
