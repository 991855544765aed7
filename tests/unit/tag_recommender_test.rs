//! Unit tests for the tag recommendation engine: validation helpers, keyword
//! fallback, retry/timeout policy and the end-to-end `recommend` flow.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use tmarks::database::Database;
use tmarks::managers::tag_manager::{TagManager, TagManagerTrait};
use tmarks::services::ai_adapter::{AiTransport, HttpReply, VendorRequest};
use tmarks::services::ai_config::{AiConfigSource, AiRuntimeConfig};
use tmarks::services::context_cache::ContextCache;
use tmarks::services::tag_recommender::{
    dedupe_and_sort, keyword_match, tokenize, validate_suggestions, TagRecommender, FALLBACK_CONFIDENCE,
    TOKEN_SEPARATOR_PATTERN,
};
use tmarks::types::ai::{RecommendationSource, TagSuggestion};
use tmarks::types::bookmark::Tag;
use tmarks::types::errors::{AdapterError, VaultError};
use tmarks::types::page::PageInfo;
use tmarks::types::settings::AssistantSettings;

// ─── Fakes ───

struct ScriptedTransport {
    replies: Mutex<VecDeque<HttpReply>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    fn new(replies: Vec<HttpReply>) -> Arc<Self> {
        Self::delayed(replies, Duration::ZERO)
    }

    fn delayed(replies: Vec<HttpReply>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiTransport for ScriptedTransport {
    async fn post_json(&self, _request: &VendorRequest) -> Result<HttpReply, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        Ok(next.unwrap_or(HttpReply { status: 500, body: "exhausted".to_string() }))
    }
}

struct StaticConfig(Option<AiRuntimeConfig>);

#[async_trait]
impl AiConfigSource for StaticConfig {
    async fn load(&self) -> Result<AiRuntimeConfig, VaultError> {
        self.0
            .clone()
            .ok_or_else(|| VaultError::Decryption("corrupt".to_string()))
    }
}

fn config(api_key: Option<&str>, max_retries: u32, timeout_ms: u64) -> AiRuntimeConfig {
    let mut config = AiRuntimeConfig::from_settings(&AssistantSettings::default(), api_key.map(str::to_string));
    config.max_retries = max_retries;
    config.timeout_ms = timeout_ms;
    config
}

fn ai_reply(tags: serde_json::Value) -> HttpReply {
    let content = json!({"suggestedTags": tags, "reasoning": "matches the page"}).to_string();
    HttpReply {
        status: 200,
        body: json!({"choices": [{"message": {"content": content}}]}).to_string(),
    }
}

fn error_reply(status: u16) -> HttpReply {
    HttpReply { status, body: "{\"error\":\"nope\"}".to_string() }
}

fn seeded_db() -> Arc<Database> {
    let db = Arc::new(Database::open_in_memory().unwrap());
    {
        let conn = db.connection();
        let mut tags = TagManager::new(&conn);
        for _ in 0..3 {
            tags.increment_usage("rust").unwrap();
        }
        tags.increment_usage("web").unwrap();
        tags.increment_usage("cooking").unwrap();
    }
    db
}

fn recommender(config: Option<AiRuntimeConfig>, transport: Arc<ScriptedTransport>) -> TagRecommender {
    let db = seeded_db();
    let context = Arc::new(ContextCache::new(db.clone()));
    TagRecommender::new(db, context, Arc::new(StaticConfig(config)), transport)
        .with_backoff_base(Duration::from_millis(1))
}

fn page() -> PageInfo {
    PageInfo::new("Learning Rust web frameworks", "https://example.com/rust-web")
}

fn suggestion(name: &str, is_new: bool, confidence: f64) -> TagSuggestion {
    TagSuggestion { name: name.to_string(), is_new, confidence }
}

fn names(suggestions: &[TagSuggestion]) -> Vec<&str> {
    suggestions.iter().map(|s| s.name.as_str()).collect()
}

// ─── Validation helpers ───

#[test]
fn test_validate_overrides_is_new_from_existing_tags() {
    let existing = vec!["Rust".to_string(), "web".to_string()];
    let validated = validate_suggestions(
        vec![suggestion(" rust ", true, 0.8), suggestion("tokio", false, 0.7)],
        &existing,
        5,
    );

    assert_eq!(names(&validated), vec!["rust", "tokio"]);
    assert!(!validated[0].is_new, "existing tag must be marked not new");
    assert!(validated[1].is_new, "unknown tag must be marked new");
}

#[test]
fn test_validate_drops_blank_names_and_clamps() {
    let validated = validate_suggestions(
        vec![
            suggestion("  ", true, 0.9),
            suggestion("a", true, 3.0),
            suggestion("b", true, -1.0),
            suggestion("c", true, f64::NAN),
        ],
        &[],
        10,
    );

    assert_eq!(names(&validated), vec!["a", "c", "b"]);
    assert_eq!(validated[0].confidence, 1.0);
    assert_eq!(validated[1].confidence, 0.5);
    assert_eq!(validated[2].confidence, 0.0);
}

#[test]
fn test_validate_truncates_to_max_tags() {
    let input = (0..10).map(|i| suggestion(&format!("t{}", i), true, i as f64 / 10.0)).collect();
    let validated = validate_suggestions(input, &[], 3);
    assert_eq!(names(&validated), vec!["t9", "t8", "t7"]);
}

#[test]
fn test_dedupe_keeps_first_occurrence_and_stable_ties() {
    let result = dedupe_and_sort(vec![
        suggestion("A", true, 0.5),
        suggestion("b", true, 0.9),
        suggestion("a", false, 0.99),
        suggestion("c", true, 0.5),
    ]);

    assert_eq!(names(&result), vec!["b", "A", "c"]);
    assert_eq!(result[1].confidence, 0.5);
}

// ─── Keyword fallback ───

#[test]
fn test_tokenize_splits_on_punctuation_and_drops_short_tokens() {
    assert_eq!(tokenize("Rust, a Web-framework!"), vec!["rust", "web", "framework"]);
}

#[test]
fn test_token_separator_pattern_compiles() {
    assert!(regex::Regex::new(TOKEN_SEPARATOR_PATTERN).is_ok());
}

#[test]
fn test_tokenize_splits_on_cjk_punctuation() {
    assert_eq!(tokenize("Rust，异步。编程、指南"), vec!["rust", "异步", "编程", "指南"]);
}

#[test]
fn test_tokenize_caps_token_count() {
    let text = (0..50).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ");
    assert_eq!(tokenize(&text).len(), 20);
}

fn tag(name: &str, count: i64) -> Tag {
    Tag { id: name.to_string(), name: name.to_string(), color: None, count, created_at: 0 }
}

#[test]
fn test_keyword_match_orders_by_usage_and_caps_at_three() {
    let tags = vec![tag("web", 1), tag("rust", 5), tag("frameworks", 2), tag("learn", 9), tag("cooking", 50)];
    let result = keyword_match(&page(), &tags);

    assert_eq!(names(&result), vec!["learn", "rust", "frameworks"]);
    assert!(result.iter().all(|s| !s.is_new && s.confidence == FALLBACK_CONFIDENCE));
}

#[test]
fn test_keyword_match_uses_description() {
    let page = PageInfo::new("Untitled", "https://example.com").with_description("Sourdough baking notes");
    let result = keyword_match(&page, &[tag("baking", 1), tag("rust", 1)]);
    assert_eq!(names(&result), vec!["baking"]);
}

#[test]
fn test_keyword_match_without_tokens_is_empty() {
    let page = PageInfo::new("!", "https://example.com");
    assert!(keyword_match(&page, &[tag("rust", 1)]).is_empty());
}

// ─── recommend ───

#[tokio::test]
async fn test_recommend_uses_ai_and_validates_output() {
    let transport = ScriptedTransport::new(vec![ai_reply(json!([
        {"name": "Rust", "isNew": true, "confidence": 0.7},
        {"name": "tokio", "isNew": false, "confidence": 0.9},
        {"name": "rust", "isNew": true, "confidence": 0.99},
        {"name": "  ", "confidence": 1.0}
    ]))]);
    let engine = recommender(Some(config(Some("sk"), 3, 5_000)), transport.clone());

    let result = engine.recommend(&page()).await;

    assert_eq!(result.source, RecommendationSource::Ai);
    assert!(result.reason.is_none());
    assert_eq!(result.reasoning.as_deref(), Some("matches the page"));
    assert_eq!(names(&result.suggestions), vec!["tokio", "Rust"]);
    assert!(result.suggestions[0].is_new);
    assert!(!result.suggestions[1].is_new);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_recommend_without_api_key_falls_back() {
    let transport = ScriptedTransport::new(vec![]);
    let engine = recommender(Some(config(None, 3, 5_000)), transport.clone());

    let result = engine.recommend(&page()).await;

    assert_eq!(result.source, RecommendationSource::Fallback);
    assert!(result.reason.is_some());
    assert_eq!(names(&result.suggestions), vec!["rust", "web"]);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_recommend_config_error_falls_back() {
    let transport = ScriptedTransport::new(vec![]);
    let engine = recommender(None, transport.clone());

    let result = engine.recommend(&page()).await;

    assert_eq!(result.source, RecommendationSource::Fallback);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_recommend_retries_until_success() {
    let transport = ScriptedTransport::new(vec![
        error_reply(500),
        error_reply(429),
        ai_reply(json!([{"name": "rust", "confidence": 0.8}])),
    ]);
    let engine = recommender(Some(config(Some("sk"), 3, 5_000)), transport.clone());

    let result = engine.recommend(&page()).await;

    assert_eq!(result.source, RecommendationSource::Ai);
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn test_recommend_exhausted_retries_fall_back() {
    let transport = ScriptedTransport::new(vec![error_reply(401), error_reply(401)]);
    let engine = recommender(Some(config(Some("sk"), 2, 5_000)), transport.clone());

    let result = engine.recommend(&page()).await;

    assert_eq!(result.source, RecommendationSource::Fallback);
    assert_eq!(transport.calls(), 2);
    assert_eq!(names(&result.suggestions), vec!["rust", "web"]);
}

#[tokio::test]
async fn test_zero_retries_still_attempts_once() {
    let transport = ScriptedTransport::new(vec![error_reply(500)]);
    let engine = recommender(Some(config(Some("sk"), 0, 5_000)), transport.clone());

    let result = engine.recommend(&page()).await;

    assert_eq!(result.source, RecommendationSource::Fallback);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_slow_provider_times_out_into_fallback() {
    let transport = ScriptedTransport::delayed(
        vec![ai_reply(json!([{"name": "late"}]))],
        Duration::from_millis(500),
    );
    let engine = recommender(Some(config(Some("sk"), 1, 20)), transport.clone());

    let result = engine.recommend(&page()).await;

    assert_eq!(result.source, RecommendationSource::Fallback);
    assert!(result.suggestions.iter().all(|s| s.name != "late"));
    assert!(result.reason.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_malformed_output_falls_back() {
    let transport = ScriptedTransport::new(vec![HttpReply {
        status: 200,
        body: json!({"choices": [{"message": {"content": "I cannot help with that"}}]}).to_string(),
    }]);
    let engine = recommender(Some(config(Some("sk"), 1, 5_000)), transport);

    let result = engine.recommend(&page()).await;

    assert_eq!(result.source, RecommendationSource::Fallback);
}
