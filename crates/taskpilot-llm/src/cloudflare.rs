use async_trait::async_trait;
use taskpilot_core::{Result, TaskPilotError};
use tracing::debug;

use crate::provider::*;

const API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Cloudflare Workers AI over its REST API.
///
/// Replies arrive as `{"result": {"response": "..."}, "success": true}`.
pub struct CloudflareProvider {
    client: reqwest::Client,
    account_id: String,
    api_token: String,
    base_url: String,
}

impl CloudflareProvider {
    pub fn new(account_id: String, api_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            account_id,
            api_token,
            base_url: API_BASE.into(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    fn run_url(&self, model: &str) -> String {
        format!(
            "{}/accounts/{}/ai/run/{}",
            self.base_url, self.account_id, model
        )
    }
}

#[async_trait]
impl LlmProvider for CloudflareProvider {
    fn name(&self) -> &str {
        "cloudflare"
    }

    fn models(&self) -> Vec<String> {
        vec![
            "@cf/meta/llama-3.1-8b-instruct".into(),
            "@cf/meta/llama-3.3-70b-instruct-fp8-fast".into(),
            "@cf/mistral/mistral-7b-instruct-v0.1".into(),
        ]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = serde_json::json!({
            "messages": request.messages_json(),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        debug!(model = %request.model, "cloudflare request");
        let resp = self
            .client
            .post(self.run_url(&request.model))
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| TaskPilotError::Inference(format!("cloudflare: {e}")))?;

        if !resp.status().is_success() {
            return Err(http_error("cloudflare", resp).await);
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TaskPilotError::Inference(e.to_string()))?;

        if data["success"].as_bool() == Some(false) {
            return Err(TaskPilotError::Inference(format!(
                "cloudflare: {}",
                data["errors"]
            )));
        }

        let usage = Usage {
            input_tokens: data["result"]["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: data["result"]["usage"]["completion_tokens"]
                .as_u64()
                .unwrap_or(0) as u32,
        };
        Ok(LlmResponse::new(data).with_usage(usage))
    }

    async fn health_check(&self) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/user/tokens/verify", self.base_url))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| TaskPilotError::Inference(format!("cloudflare: {e}")))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(http_error("cloudflare", resp).await)
        }
    }
}
