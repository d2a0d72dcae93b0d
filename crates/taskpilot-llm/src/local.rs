use async_trait::async_trait;
use taskpilot_core::{Result, TaskPilotError};

use crate::provider::*;

/// Ollama's native chat API.
pub struct LocalProvider {
    client: reqwest::Client,
    /// Address of the Ollama server (e.g. "http://127.0.0.1:11434")
    base_url: String,
    model_name: String,
}

impl LocalProvider {
    pub fn new(base_url: String, model_name: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model_name,
        }
    }

    /// Default Ollama instance
    pub fn ollama(model: &str) -> Self {
        Self::new("http://127.0.0.1:11434".into(), model.to_string())
    }
}

#[async_trait]
impl LlmProvider for LocalProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn models(&self) -> Vec<String> {
        vec![self.model_name.clone()]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = serde_json::json!({
            "model": &request.model,
            "messages": request.messages_json(),
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            }
        });

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| TaskPilotError::Inference(format!("ollama: {e}")))?;

        if !resp.status().is_success() {
            return Err(http_error("ollama", resp).await);
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TaskPilotError::Inference(e.to_string()))?;

        let usage = Usage {
            input_tokens: data["prompt_eval_count"].as_u64().unwrap_or(0) as u32,
            output_tokens: data["eval_count"].as_u64().unwrap_or(0) as u32,
        };
        Ok(LlmResponse::new(data).with_usage(usage))
    }

    async fn health_check(&self) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| TaskPilotError::Inference(format!("ollama not reachable: {e}")))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(TaskPilotError::Inference(format!(
                "ollama returned {}",
                resp.status()
            )))
        }
    }
}
