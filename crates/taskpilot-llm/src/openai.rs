use async_trait::async_trait;
use taskpilot_core::{Result, TaskPilotError};

use crate::provider::*;

/// OpenAI-compatible chat completions API (OpenAI, Together, vLLM, ...).
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    provider_name: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.openai.com/v1".into(),
            provider_name: "openai".into(),
        }
    }

    /// Use a custom base URL for another OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_name(mut self, name: String) -> Self {
        self.provider_name = name;
        self
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn models(&self) -> Vec<String> {
        vec!["gpt-4o".into(), "gpt-4o-mini".into(), "gpt-4.1-mini".into()]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let mut body = serde_json::json!({
            "model": &request.model,
            "temperature": request.temperature,
            "messages": request.messages_json(),
        });

        // Reasoning models reject max_tokens
        if uses_max_completion_tokens(&request.model) {
            body["max_completion_tokens"] = serde_json::json!(request.max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(request.max_tokens);
        }

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TaskPilotError::Inference(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(http_error(&self.provider_name, resp).await);
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TaskPilotError::Inference(e.to_string()))?;

        let usage = Usage {
            input_tokens: data["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: data["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        };
        Ok(LlmResponse::new(data).with_usage(usage))
    }

    async fn health_check(&self) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| TaskPilotError::Inference(e.to_string()))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(http_error(&self.provider_name, resp).await)
        }
    }
}

fn uses_max_completion_tokens(model: &str) -> bool {
    let m = model.to_lowercase();
    m.starts_with("o1") || m.starts_with("o3") || m.starts_with("o4") || m.starts_with("gpt-5")
}
