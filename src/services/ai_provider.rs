//! Provider abstraction for TMarks.
//!
//! Shared contract of every AI vendor: prompt construction, error
//! classification and tolerant parsing of the model output. [`ProviderClient`]
//! glues these around the [`AiAdapter`].

use serde_json::Value;

use crate::services::ai_adapter::{AiAdapter, CompletionRequest};
use crate::types::ai::{AiRequest, AiResponse, ProviderKind, TagSuggestion};
use crate::types::errors::{AdapterError, AiError};

/// Max characters of page content placed in a prompt.
pub const PROMPT_CONTENT_CHARS: usize = 500;
/// Max existing tags placed in a prompt.
pub const PROMPT_EXISTING_TAGS: usize = 100;
/// Max recent bookmarks placed in a prompt.
pub const PROMPT_RECENT_BOOKMARKS: usize = 10;

const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Per-call vendor selection and credentials.
#[derive(Debug, Clone)]
pub struct ProviderCall {
    pub kind: ProviderKind,
    pub api_key: String,
    pub model: String,
    pub api_url: Option<String>,
    pub custom_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

struct PromptFields {
    title: String,
    url: String,
    description: String,
    content: String,
    existing_tags: String,
    recent_bookmarks: String,
    max_tags: String,
    prefer_existing: &'static str,
}

impl PromptFields {
    fn from_request(request: &AiRequest) -> Self {
        let page = &request.page;
        let existing_tags = request
            .context
            .existing_tags
            .iter()
            .take(PROMPT_EXISTING_TAGS)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let recent_bookmarks = request
            .context
            .recent_bookmarks
            .iter()
            .take(PROMPT_RECENT_BOOKMARKS)
            .map(|b| format!("- {} [{}]", b.title, b.tags.join(", ")))
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            title: page.title.clone(),
            url: page.url.clone(),
            description: page.description.clone().unwrap_or_default(),
            content: page
                .content
                .as_deref()
                .unwrap_or_default()
                .chars()
                .take(PROMPT_CONTENT_CHARS)
                .collect(),
            existing_tags,
            recent_bookmarks,
            max_tags: request.options.max_tags.to_string(),
            prefer_existing: if request.options.prefer_existing {
                "优先"
            } else {
                "可以"
            },
        }
    }

    fn get(&self, token: &str) -> Option<&str> {
        let value: &str = match token {
            "title" => &self.title,
            "url" => &self.url,
            "description" => &self.description,
            "content" => &self.content,
            "existingTags" => &self.existing_tags,
            "recentBookmarks" => &self.recent_bookmarks,
            "maxTags" => &self.max_tags,
            "preferExisting" => self.prefer_existing,
            _ => return None,
        };
        Some(value)
    }
}

/// Builds the prompt for a recommendation request.
///
/// A custom template has its placeholders substituted in a single pass, so
/// substituted values are never re-expanded. Without a template the default
/// structured prompt is used.
pub fn build_prompt(request: &AiRequest, custom_prompt: Option<&str>) -> String {
    let fields = PromptFields::from_request(request);
    match custom_prompt {
        Some(template) => substitute(template, &fields),
        None => default_prompt(&fields),
    }
}

fn substitute(template: &str, fields: &PromptFields) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after
            .find('}')
            .and_then(|close| fields.get(&after[..close]).map(|value| (value, close)));
        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn default_prompt(fields: &PromptFields) -> String {
    let mut prompt = String::from("请为以下网页推荐合适的书签标签。\n\n");
    prompt.push_str(&format!("标题: {}\n", fields.title));
    prompt.push_str(&format!("网址: {}\n", fields.url));
    if !fields.description.is_empty() {
        prompt.push_str(&format!("描述: {}\n", fields.description));
    }
    if !fields.content.is_empty() {
        prompt.push_str(&format!("内容摘要: {}\n", fields.content));
    }
    if !fields.existing_tags.is_empty() {
        prompt.push_str(&format!(
            "\n用户已有的标签（{}使用）: {}\n",
            fields.prefer_existing, fields.existing_tags
        ));
    }
    if !fields.recent_bookmarks.is_empty() {
        prompt.push_str(&format!("\n最近的书签:\n{}\n", fields.recent_bookmarks));
    }
    prompt.push_str(&format!(
        "\n要求:\n1. 推荐不超过 {} 个标签\n2. {}使用已有标签，必要时可以创建新标签\n3. 标签简洁，一般 2-6 个字\n",
        fields.max_tags, fields.prefer_existing
    ));
    prompt.push_str(
        "\n请严格按以下 JSON 格式返回:\n\
         {\"suggestedTags\":[{\"name\":\"标签名\",\"isNew\":false,\"confidence\":0.9}],\"reasoning\":\"推荐理由\"}\n",
    );
    prompt
}

/// Maps a raw adapter failure onto the shared error taxonomy.
pub fn classify_error(provider: &str, error: AdapterError) -> AiError {
    match error {
        AdapterError::Classified(classified) => classified,
        AdapterError::Transport(message) => AiError::Network(message),
        AdapterError::Status { status, message } => match status {
            401 | 403 => AiError::InvalidApiKey(message),
            429 => AiError::RateLimit(message),
            _ => AiError::service(provider, message),
        },
        AdapterError::Other(message) => AiError::service(provider, message),
    }
}

/// Returns the first balanced `{...}` object in `text`, skipping braces
/// inside JSON strings. Starts that never balance or fail to parse are
/// skipped in favour of the next `{`.
pub fn find_json_object(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut end = None;

        for (i, &b) in bytes.iter().enumerate().skip(start) {
            if in_string {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    in_string = false;
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }

        if let Some(end) = end {
            if let Ok(value) = serde_json::from_str::<Value>(&text[start..=end]) {
                if value.is_object() {
                    return Some(value);
                }
            }
        }
        search_from = start + 1;
    }
    None
}

fn coerce_suggestion(value: &Value) -> TagSuggestion {
    let object = match value.as_object() {
        Some(object) => object,
        None => {
            return TagSuggestion {
                name: String::new(),
                is_new: true,
                confidence: DEFAULT_CONFIDENCE,
            }
        }
    };
    TagSuggestion {
        name: object
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        is_new: object.get("isNew").and_then(Value::as_bool).unwrap_or(true),
        confidence: object
            .get("confidence")
            .and_then(Value::as_f64)
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(DEFAULT_CONFIDENCE),
    }
}

fn optional_text(object: &Value, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// Parses model output into an [`AiResponse`].
///
/// Fails with a service error when no JSON object carrying a
/// `suggestedTags` array can be found.
pub fn parse_response(provider: &str, raw: &str) -> Result<AiResponse, AiError> {
    let object = find_json_object(raw)
        .ok_or_else(|| AiError::service(provider, "Invalid response format"))?;
    let tags = object
        .get("suggestedTags")
        .and_then(Value::as_array)
        .ok_or_else(|| AiError::service(provider, "Invalid response format"))?;

    Ok(AiResponse {
        suggested_tags: tags.iter().map(coerce_suggestion).collect(),
        reasoning: optional_text(&object, "reasoning"),
        translated_title: optional_text(&object, "translatedTitle"),
        translated_description: optional_text(&object, "translatedDescription"),
    })
}

/// Runs recommendation requests against the configured vendor.
#[derive(Clone)]
pub struct ProviderClient {
    adapter: AiAdapter,
}

impl ProviderClient {
    pub fn new(adapter: AiAdapter) -> Self {
        Self { adapter }
    }

    fn completion(call: &ProviderCall, prompt: String) -> CompletionRequest {
        CompletionRequest {
            prompt,
            api_key: call.api_key.clone(),
            model: call.model.clone(),
            api_url: call.api_url.clone(),
            temperature: call.temperature,
            max_tokens: call.max_tokens,
        }
    }

    /// One attempt: build prompt, call the vendor, parse the output.
    pub async fn analyze(&self, request: &AiRequest, call: &ProviderCall) -> Result<AiResponse, AiError> {
        let provider = call.kind.as_str();
        let prompt = build_prompt(request, call.custom_prompt.as_deref());
        let text = self
            .adapter
            .complete(call.kind, &Self::completion(call, prompt))
            .await
            .map_err(|e| classify_error(provider, e))?;
        parse_response(provider, &text)
    }

    /// Sends a minimal prompt to check credentials and endpoint.
    pub async fn test_connection(&self, call: &ProviderCall) -> Result<(), AiError> {
        let prompt = "请只回复 JSON: {\"ok\":true}".to_string();
        self.adapter
            .complete(call.kind, &Self::completion(call, prompt))
            .await
            .map(|_| ())
            .map_err(|e| classify_error(call.kind.as_str(), e))
    }
}
