//! Mock provider for deterministic testing.
//!
//! Returns pre-configured responses without making any HTTP calls.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::provider::*;
use taskpilot_core::{Result, TaskPilotError};

/// A provider that replays queued responses.
///
/// # Example
/// ```
/// use taskpilot_llm::mock::MockProvider;
/// let provider = MockProvider::new("test")
///     .with_response("Hello, world!");
/// ```
pub struct MockProvider {
    responses: Arc<Mutex<Vec<MockResponse>>>,
    /// Track all requests received (for assertions in tests).
    pub requests: Arc<Mutex<Vec<LlmRequest>>>,
    name: String,
    healthy: bool,
}

/// A pre-configured response from the mock provider.
#[derive(Debug, Clone, Default)]
pub struct MockResponse {
    /// Body returned as-is; `None` with no error means "no usable content".
    pub raw: Option<Value>,
    /// If set, the provider will return this error instead.
    pub error: Option<String>,
    /// Sleep before answering, to exercise timeouts.
    pub delay: Option<Duration>,
}

impl MockResponse {
    /// A Workers AI style `{"response": text}` body.
    pub fn text(text: &str) -> Self {
        Self {
            raw: Some(serde_json::json!({ "response": text })),
            ..Default::default()
        }
    }

    /// An arbitrary response body.
    pub fn raw(value: Value) -> Self {
        Self {
            raw: Some(value),
            ..Default::default()
        }
    }

    pub fn error(msg: &str) -> Self {
        Self {
            error: Some(msg.to_string()),
            ..Default::default()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(vec![])),
            requests: Arc::new(Mutex::new(vec![])),
            name: name.into(),
            healthy: true,
        }
    }

    /// Queue a simple text response.
    pub fn with_response(self, text: &str) -> Self {
        self.with_mock_response(MockResponse::text(text))
    }

    /// Queue a raw JSON body.
    pub fn with_raw(self, value: Value) -> Self {
        self.with_mock_response(MockResponse::raw(value))
    }

    /// Queue an error response.
    pub fn with_error(self, error: &str) -> Self {
        self.with_mock_response(MockResponse::error(error))
    }

    /// Queue a fully custom response.
    pub fn with_mock_response(self, resp: MockResponse) -> Self {
        self.push(resp);
        self
    }

    /// Make `health_check` fail.
    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// Queue a response through a shared reference.
    pub fn push(&self, resp: MockResponse) {
        if let Ok(mut q) = self.responses.lock() {
            q.push(resp);
        }
    }

    /// Get all requests that were made to this provider.
    pub fn recorded_requests(&self) -> Arc<Mutex<Vec<LlmRequest>>> {
        Arc::clone(&self.requests)
    }

    /// Pop the next queued response, or a default "no response queued" reply.
    fn next_response(&self) -> MockResponse {
        match self.responses.lock() {
            Ok(mut q) if !q.is_empty() => q.remove(0),
            _ => MockResponse::text("(mock: no more queued responses)"),
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn models(&self) -> Vec<String> {
        vec!["mock/test-model".to_string()]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        if let Ok(mut reqs) = self.requests.lock() {
            reqs.push(request.clone());
        }
        let mock = self.next_response();

        if let Some(delay) = mock.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = mock.error {
            return Err(TaskPilotError::Inference(error));
        }

        let usage = Usage {
            input_tokens: request.messages.iter().map(|m| m.estimate_tokens() as u32).sum(),
            output_tokens: 50,
        };
        Ok(LlmResponse::new(mock.raw.unwrap_or(Value::Null)).with_usage(usage))
    }

    async fn health_check(&self) -> Result<()> {
        if self.healthy {
            Ok(())
        } else {
            Err(TaskPilotError::Inference(format!("{} is unhealthy", self.name)))
        }
    }
}
