//! AI invocation adapter for TMarks.
//!
//! Translates a vendor-neutral completion call into the HTTP request shape of
//! each supported AI vendor and pulls the textual completion back out of the
//! vendor's response. Vendors are described by a static strategy table keyed
//! by [`ProviderKind`]; the HTTP layer sits behind [`AiTransport`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::types::ai::{ProviderInfo, ProviderKind};
use crate::types::errors::AdapterError;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Max characters of a vendor body quoted in an error message.
const BODY_EXCERPT_CHARS: usize = 200;

pub const SYSTEM_PROMPT: &str =
    "你是一个专业的书签标签推荐助手。请只返回有效的 JSON，不要包含其他说明文字。";

/// Request/response family a vendor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFamily {
    /// OpenAI-compatible `/chat/completions`.
    ChatCompletions,
    /// Anthropic `/messages`.
    AnthropicMessages,
}

impl RequestFamily {
    pub fn path(&self) -> &'static str {
        match self {
            RequestFamily::ChatCompletions => "/chat/completions",
            RequestFamily::AnthropicMessages => "/messages",
        }
    }
}

/// Strategy table entry for one vendor.
#[derive(Debug)]
pub struct VendorProfile {
    pub kind: ProviderKind,
    pub display_name: &'static str,
    pub family: RequestFamily,
    pub default_base_url: Option<&'static str>,
    pub default_model: &'static str,
    pub default_max_tokens: u32,
    /// Sends `response_format: {type: json_object}`.
    pub json_mode: bool,
    /// Sends `stream: false`.
    pub disable_stream: bool,
    /// Sends `result_format` with this value.
    pub result_format: Option<&'static str>,
}

static VENDORS: [VendorProfile; 8] = [
    VendorProfile {
        kind: ProviderKind::OpenAI,
        display_name: "OpenAI",
        family: RequestFamily::ChatCompletions,
        default_base_url: Some("https://api.openai.com/v1"),
        default_model: "gpt-4o-mini",
        default_max_tokens: DEFAULT_MAX_TOKENS,
        json_mode: true,
        disable_stream: false,
        result_format: None,
    },
    VendorProfile {
        kind: ProviderKind::Anthropic,
        display_name: "Anthropic",
        family: RequestFamily::AnthropicMessages,
        default_base_url: Some("https://api.anthropic.com/v1"),
        default_model: "claude-3-5-haiku-20241022",
        default_max_tokens: DEFAULT_MAX_TOKENS,
        json_mode: false,
        disable_stream: false,
        result_format: None,
    },
    VendorProfile {
        kind: ProviderKind::DeepSeek,
        display_name: "DeepSeek",
        family: RequestFamily::ChatCompletions,
        default_base_url: Some("https://api.deepseek.com/v1"),
        default_model: "deepseek-chat",
        default_max_tokens: 1000,
        json_mode: true,
        disable_stream: false,
        result_format: None,
    },
    VendorProfile {
        kind: ProviderKind::Zhipu,
        display_name: "智谱 AI",
        family: RequestFamily::ChatCompletions,
        default_base_url: Some("https://open.bigmodel.cn/api/paas/v4"),
        default_model: "glm-4-flash",
        default_max_tokens: 1024,
        json_mode: false,
        disable_stream: false,
        result_format: None,
    },
    VendorProfile {
        kind: ProviderKind::ModelScope,
        display_name: "ModelScope",
        family: RequestFamily::ChatCompletions,
        default_base_url: Some("https://api-inference.modelscope.cn/v1"),
        default_model: "Qwen/Qwen2.5-72B-Instruct",
        default_max_tokens: DEFAULT_MAX_TOKENS,
        json_mode: false,
        disable_stream: true,
        result_format: Some("message"),
    },
    VendorProfile {
        kind: ProviderKind::SiliconFlow,
        display_name: "硅基流动",
        family: RequestFamily::ChatCompletions,
        default_base_url: Some("https://api.siliconflow.cn/v1"),
        default_model: "Qwen/Qwen2.5-7B-Instruct",
        default_max_tokens: 1024,
        json_mode: false,
        disable_stream: true,
        result_format: None,
    },
    VendorProfile {
        kind: ProviderKind::IFlow,
        display_name: "iFlow",
        family: RequestFamily::ChatCompletions,
        default_base_url: Some("https://apis.iflow.cn/v1"),
        default_model: "qwen3-max",
        default_max_tokens: DEFAULT_MAX_TOKENS,
        json_mode: false,
        disable_stream: true,
        result_format: None,
    },
    VendorProfile {
        kind: ProviderKind::Custom,
        display_name: "自定义",
        family: RequestFamily::ChatCompletions,
        default_base_url: None,
        default_model: "gpt-4o-mini",
        default_max_tokens: DEFAULT_MAX_TOKENS,
        json_mode: false,
        disable_stream: false,
        result_format: None,
    },
];

/// Looks up the strategy table entry of a vendor.
pub fn vendor_profile(kind: ProviderKind) -> &'static VendorProfile {
    VENDORS
        .iter()
        .find(|profile| profile.kind == kind)
        .unwrap_or(&VENDORS[VENDORS.len() - 1])
}

/// Catalog of all vendors for the settings UI.
pub fn provider_catalog() -> Vec<ProviderInfo> {
    VENDORS
        .iter()
        .map(|profile| ProviderInfo {
            kind: profile.kind,
            display_name: profile.display_name.to_string(),
            default_base_url: profile.default_base_url.map(str::to_string),
            default_model: profile.default_model.to_string(),
            default_max_tokens: profile.default_max_tokens,
        })
        .collect()
}

/// Vendor-neutral completion call.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub prompt: String,
    pub api_key: String,
    pub model: String,
    /// Base URL or full endpoint; vendor default when `None`.
    pub api_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Fully resolved HTTP request for one vendor.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

/// Raw HTTP reply; any status code.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// HTTP seam of the adapter.
///
/// Implementations return `AdapterError::Transport` when no HTTP response
/// was received and an `HttpReply` for every received response, 2xx or not.
#[async_trait]
pub trait AiTransport: Send + Sync {
    async fn post_json(&self, request: &VendorRequest) -> Result<HttpReply, AdapterError>;
}

/// `reqwest`-backed transport.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AiTransport for ReqwestTransport {
    async fn post_json(&self, request: &VendorRequest) -> Result<HttpReply, AdapterError> {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        Ok(HttpReply { status, body })
    }
}

/// Resolves the request URL from a configured base.
///
/// A base that already contains `path` is used as is; otherwise `path` is
/// appended after stripping one trailing slash.
pub fn resolve_endpoint(base: &str, path: &str) -> String {
    let base = base.trim();
    if base.contains(path) {
        return base.to_string();
    }
    format!("{}{}", base.strip_suffix('/').unwrap_or(base), path)
}

/// Builds the vendor-specific HTTP request.
pub fn build_vendor_request(
    kind: ProviderKind,
    call: &CompletionRequest,
) -> Result<VendorRequest, AdapterError> {
    let profile = vendor_profile(kind);
    let base = call
        .api_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .or(profile.default_base_url)
        .ok_or_else(|| {
            AdapterError::Other(format!("{} requires an API URL", profile.display_name))
        })?;

    let url = resolve_endpoint(base, profile.family.path());
    let temperature = call.temperature.unwrap_or(DEFAULT_TEMPERATURE);
    let max_tokens = call.max_tokens.unwrap_or(profile.default_max_tokens);

    let (headers, body) = match profile.family {
        RequestFamily::ChatCompletions => {
            let mut body = Map::new();
            body.insert("model".into(), json!(call.model));
            body.insert(
                "messages".into(),
                json!([
                    {"role": "system", "content": SYSTEM_PROMPT},
                    {"role": "user", "content": call.prompt},
                ]),
            );
            body.insert("temperature".into(), json!(temperature));
            body.insert("max_tokens".into(), json!(max_tokens));
            if profile.json_mode {
                body.insert("response_format".into(), json!({"type": "json_object"}));
            }
            if profile.disable_stream {
                body.insert("stream".into(), json!(false));
            }
            if let Some(format) = profile.result_format {
                body.insert("result_format".into(), json!(format));
            }
            let headers = vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Authorization".to_string(), format!("Bearer {}", call.api_key)),
            ];
            (headers, Value::Object(body))
        }
        RequestFamily::AnthropicMessages => {
            let body = json!({
                "model": call.model,
                "max_tokens": max_tokens,
                "temperature": temperature,
                "system": SYSTEM_PROMPT,
                "messages": [{"role": "user", "content": call.prompt}],
            });
            let headers = vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("x-api-key".to_string(), call.api_key.clone()),
                ("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
            ];
            (headers, body)
        }
    };

    Ok(VendorRequest { url, headers, body })
}

fn non_empty(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Text of one content part: a plain string, or an object carrying
/// `text`, `content` or `value` (possibly one level nested).
fn part_text(part: &Value) -> Option<String> {
    match part {
        Value::String(s) => non_empty(s),
        Value::Object(map) => ["text", "content", "value"]
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(|field| match field {
                Value::String(s) => non_empty(s),
                Value::Object(inner) => inner
                    .get("value")
                    .or_else(|| inner.get("text"))
                    .and_then(Value::as_str)
                    .and_then(non_empty),
                _ => None,
            }),
        _ => None,
    }
}

fn str_at(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(Value::as_str).and_then(non_empty)
}

/// Extracts the completion text from a vendor response.
///
/// Chat completions are tried in order: string `message.content`, array
/// content parts, `message.text`, `output_text`, `output.text`. Anthropic
/// responses yield the first non-empty text block.
pub fn extract_content(family: RequestFamily, response: &Value) -> Option<String> {
    match family {
        RequestFamily::AnthropicMessages => response
            .get("content")
            .and_then(Value::as_array)?
            .iter()
            .filter(|block| {
                block.get("type").and_then(Value::as_str).unwrap_or("text") == "text"
            })
            .find_map(|block| block.get("text").and_then(Value::as_str).and_then(non_empty)),
        RequestFamily::ChatCompletions => {
            let message = response.pointer("/choices/0/message");
            let from_content = message.and_then(|m| m.get("content")).and_then(|content| {
                match content {
                    Value::String(s) => non_empty(s),
                    Value::Array(parts) => {
                        let joined: String = parts.iter().filter_map(part_text).collect();
                        non_empty(&joined)
                    }
                    _ => None,
                }
            });
            from_content
                .or_else(|| message.and_then(|m| m.get("text")).and_then(Value::as_str).and_then(non_empty))
                .or_else(|| str_at(response, "/output_text"))
                .or_else(|| str_at(response, "/output/text"))
        }
    }
}

pub(crate) fn excerpt(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Sends completion calls through the vendor strategy table.
#[derive(Clone)]
pub struct AiAdapter {
    transport: Arc<dyn AiTransport>,
}

impl AiAdapter {
    pub fn new(transport: Arc<dyn AiTransport>) -> Self {
        Self { transport }
    }

    /// Runs one completion against `kind` and returns the raw completion text.
    pub async fn complete(
        &self,
        kind: ProviderKind,
        call: &CompletionRequest,
    ) -> Result<String, AdapterError> {
        let profile = vendor_profile(kind);
        let request = build_vendor_request(kind, call)?;
        debug!(provider = %kind, url = %request.url, model = %call.model, "sending AI request");

        let reply = self.transport.post_json(&request).await?;
        if !(200..300).contains(&reply.status) {
            return Err(AdapterError::Status {
                status: reply.status,
                message: format!(
                    "{} API error ({}): {}",
                    profile.display_name,
                    reply.status,
                    excerpt(&reply.body, BODY_EXCERPT_CHARS)
                ),
            });
        }

        let parsed: Value = serde_json::from_str(&reply.body).map_err(|_| {
            AdapterError::Other(format!(
                "{} returned a non-JSON body: {}",
                profile.display_name,
                excerpt(&reply.body, BODY_EXCERPT_CHARS)
            ))
        })?;

        extract_content(profile.family, &parsed).ok_or_else(|| {
            AdapterError::Other(format!(
                "{} returned no content: {}",
                profile.display_name,
                excerpt(&reply.body, BODY_EXCERPT_CHARS)
            ))
        })
    }

    /// Dispatches by provider identifier (`"openai"`, `"zhipu"`, ...).
    pub async fn complete_by_name(
        &self,
        provider: &str,
        call: &CompletionRequest,
    ) -> Result<String, AdapterError> {
        let kind: ProviderKind = provider.parse().map_err(AdapterError::Other)?;
        self.complete(kind, call).await
    }

    pub async fn call_openai(&self, call: &CompletionRequest) -> Result<String, AdapterError> {
        self.complete(ProviderKind::OpenAI, call).await
    }

    pub async fn call_anthropic(&self, call: &CompletionRequest) -> Result<String, AdapterError> {
        self.complete(ProviderKind::Anthropic, call).await
    }

    pub async fn call_deepseek(&self, call: &CompletionRequest) -> Result<String, AdapterError> {
        self.complete(ProviderKind::DeepSeek, call).await
    }

    pub async fn call_zhipu(&self, call: &CompletionRequest) -> Result<String, AdapterError> {
        self.complete(ProviderKind::Zhipu, call).await
    }

    pub async fn call_modelscope(&self, call: &CompletionRequest) -> Result<String, AdapterError> {
        self.complete(ProviderKind::ModelScope, call).await
    }

    pub async fn call_siliconflow(&self, call: &CompletionRequest) -> Result<String, AdapterError> {
        self.complete(ProviderKind::SiliconFlow, call).await
    }

    pub async fn call_iflow(&self, call: &CompletionRequest) -> Result<String, AdapterError> {
        self.complete(ProviderKind::IFlow, call).await
    }

    pub async fn call_custom(&self, call: &CompletionRequest) -> Result<String, AdapterError> {
        self.complete(ProviderKind::Custom, call).await
    }
}
