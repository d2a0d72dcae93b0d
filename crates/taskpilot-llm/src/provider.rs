use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskpilot_core::{PromptMessage, Result};

/// A request to a language-inference provider.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// The model to use. The router strips the "provider/" prefix before the
    /// provider sees it.
    pub model: String,
    /// Ordered prompt, system message first.
    pub messages: Vec<PromptMessage>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    pub temperature: f32,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, messages: Vec<PromptMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: 1024,
            temperature: 0.7,
        }
    }

    /// Messages as the `[{role, content}]` array every supported backend accepts.
    pub fn messages_json(&self) -> Vec<Value> {
        self.messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect()
    }
}

/// A complete response, kept in the provider's own shape.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub raw: Value,
    pub usage: Usage,
}

impl LlmResponse {
    pub fn new(raw: Value) -> Self {
        Self {
            raw,
            usage: Usage::default(),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// The completion text, or `None` when the response has no usable content.
    pub fn text(&self) -> Option<String> {
        extract_completion_text(&self.raw)
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn merge(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Pull the completion text out of any supported response shape.
///
/// Candidates are tried in this order and the first non-blank string wins:
/// `response`, `result.response`, `choices[0].message.content`,
/// `choices[0].text`, `message.content`, `content[0].text`, then the value
/// itself if it is a bare string.
pub fn extract_completion_text(raw: &Value) -> Option<String> {
    const PATHS: [&str; 6] = [
        "/response",
        "/result/response",
        "/choices/0/message/content",
        "/choices/0/text",
        "/message/content",
        "/content/0/text",
    ];

    PATHS
        .iter()
        .filter_map(|p| raw.pointer(p))
        .chain(std::iter::once(raw))
        .filter_map(Value::as_str)
        .find(|s| !s.trim().is_empty())
        .map(|s| s.trim().to_string())
}

/// Trait implemented by each inference backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short routing name, matched against the "provider/" prefix of a model id.
    fn name(&self) -> &str;

    /// Models this provider is known to serve, for bare model ids.
    fn models(&self) -> Vec<String>;

    /// Send a non-streaming request.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Check if this provider is reachable and accepts our credentials.
    async fn health_check(&self) -> Result<()>;
}

/// Map a non-success HTTP response into the error the router knows how to retry.
pub(crate) async fn http_error(provider: &str, resp: reqwest::Response) -> taskpilot_core::TaskPilotError {
    let status = resp.status();
    if status.as_u16() == 429 {
        let retry_after_secs = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(1);
        return taskpilot_core::TaskPilotError::RateLimited { retry_after_secs };
    }
    let text = resp.text().await.unwrap_or_default();
    taskpilot_core::TaskPilotError::Inference(format!("HTTP {status}: {provider}: {text}"))
}
