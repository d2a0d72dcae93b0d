use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::provider::{LlmProvider, LlmRequest, LlmResponse};
use taskpilot_core::{Result, TaskPilotError};

/// Maximum retry attempts for transient errors (429, 500, 502, 503).
const MAX_RETRIES: u32 = 3;
/// Base delay for exponential backoff (doubles each retry).
const BASE_DELAY_MS: u64 = 1000;

// ── Circuit Breaker ────────────────────────────────────────────

/// Number of consecutive failures before opening the circuit.
const CIRCUIT_FAILURE_THRESHOLD: u32 = 5;
/// How long the circuit stays open before allowing a trial request.
const CIRCUIT_OPEN_DURATION: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open { since: Instant },
    /// One trial request is in flight.
    HalfOpen,
}

#[derive(Debug)]
struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
}

impl CircuitBreaker {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
        }
    }

    fn allow_request(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open { since } => {
                if since.elapsed() >= CIRCUIT_OPEN_DURATION {
                    self.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => false,
        }
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.state = CircuitState::Closed;
    }

    fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= CIRCUIT_FAILURE_THRESHOLD
            || self.state == CircuitState::HalfOpen
        {
            self.state = CircuitState::Open {
                since: Instant::now(),
            };
        }
    }

    fn is_open(&self) -> bool {
        matches!(self.state, CircuitState::Open { .. })
    }
}

/// Routes requests to the provider named by the model prefix, with retry and failover.
#[derive(Clone)]
pub struct ModelRouter {
    providers: Vec<Arc<dyn LlmProvider>>,
    /// Circuit breakers keyed by provider name.
    breakers: Arc<Mutex<HashMap<String, CircuitBreaker>>>,
    base_delay: Duration,
}

/// Check if an error is transient and worth retrying.
fn is_retryable(err: &TaskPilotError) -> bool {
    match err {
        TaskPilotError::RateLimited { .. } => true,
        TaskPilotError::Inference(msg) => {
            msg.starts_with("HTTP 500")
                || msg.starts_with("HTTP 502")
                || msg.starts_with("HTTP 503")
                || msg.starts_with("HTTP 504")
                || msg.contains("timed out")
                || msg.contains("connection reset")
                || msg.contains("connection closed")
        }
        _ => false,
    }
}

fn retry_after_hint(err: &TaskPilotError) -> Option<u64> {
    if let TaskPilotError::RateLimited { retry_after_secs } = err {
        Some(*retry_after_secs)
    } else {
        None
    }
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRouter {
    pub fn new() -> Self {
        Self {
            providers: vec![],
            breakers: Arc::new(Mutex::new(HashMap::new())),
            base_delay: Duration::from_millis(BASE_DELAY_MS),
        }
    }

    /// Override the first backoff step (tests use a few milliseconds).
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn add_provider(&mut self, provider: Arc<dyn LlmProvider>) {
        let name = provider.name().to_string();
        info!(provider = %name, "registered inference provider");
        self.breakers
            .lock()
            .entry(name)
            .or_insert_with(CircuitBreaker::new);
        self.providers.push(provider);
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    fn is_available(&self, provider_name: &str) -> bool {
        let mut breakers = self.breakers.lock();
        breakers
            .get_mut(provider_name)
            .is_none_or(|cb| cb.allow_request())
    }

    fn record_success(&self, provider_name: &str) {
        if let Some(cb) = self.breakers.lock().get_mut(provider_name) {
            cb.record_success();
        }
    }

    fn record_failure(&self, provider_name: &str) {
        let mut breakers = self.breakers.lock();
        if let Some(cb) = breakers.get_mut(provider_name) {
            let was_open = cb.is_open();
            cb.record_failure();
            if !was_open && cb.is_open() {
                warn!(
                    provider = provider_name,
                    failures = cb.consecutive_failures,
                    "circuit breaker open, provider disabled for {}s",
                    CIRCUIT_OPEN_DURATION.as_secs()
                );
            }
        }
    }

    /// Find the provider for a model string like "cloudflare/@cf/meta/llama-3.1-8b-instruct".
    fn resolve(&self, model: &str) -> Option<(Arc<dyn LlmProvider>, String)> {
        if let Some((prefix, model_name)) = model.split_once('/') {
            for p in &self.providers {
                if p.name().eq_ignore_ascii_case(prefix) {
                    return Some((Arc::clone(p), model_name.to_string()));
                }
            }
        }
        for p in &self.providers {
            if p.models().iter().any(|m| m == model) {
                return Some((Arc::clone(p), model.to_string()));
            }
        }
        None
    }

    /// Complete a request, retrying transient errors and failing over to `fallback_model`.
    pub async fn complete(
        &self,
        request: &LlmRequest,
        fallback_model: Option<&str>,
    ) -> Result<LlmResponse> {
        let mut primary_err = None;

        if let Some((provider, model_name)) = self.resolve(&request.model) {
            if self.is_available(provider.name()) {
                let mut req = request.clone();
                req.model = model_name;

                match self.complete_with_retry(&*provider, &req).await {
                    Ok(resp) => {
                        self.record_success(provider.name());
                        return Ok(resp);
                    }
                    Err(e) => {
                        self.record_failure(provider.name());
                        warn!(
                            provider = provider.name(),
                            error = %e,
                            "primary provider failed after retries, attempting failover"
                        );
                        primary_err = Some(e);
                    }
                }
            } else {
                warn!(
                    provider = provider.name(),
                    "circuit breaker is open, skipping to fallback"
                );
            }
        }

        if let Some(fallback) = fallback_model
            && let Some((provider, model_name)) = self.resolve(fallback)
            && self.is_available(provider.name())
        {
            let mut req = request.clone();
            req.model = model_name;
            return match self.complete_with_retry(&*provider, &req).await {
                Ok(resp) => {
                    self.record_success(provider.name());
                    Ok(resp)
                }
                Err(e) => {
                    self.record_failure(provider.name());
                    Err(e)
                }
            };
        }

        Err(primary_err.unwrap_or_else(|| TaskPilotError::ModelNotFound(request.model.clone())))
    }

    async fn complete_with_retry(
        &self,
        provider: &dyn LlmProvider,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        let mut attempt = 0;
        loop {
            match provider.complete(request).await {
                Ok(resp) => return Ok(resp),
                Err(e) if is_retryable(&e) && attempt < MAX_RETRIES => {
                    let delay = retry_after_hint(&e)
                        .map(Duration::from_secs)
                        .unwrap_or(self.base_delay * 2u32.pow(attempt));
                    warn!(
                        provider = provider.name(),
                        attempt = attempt + 1,
                        max = MAX_RETRIES,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Probe every registered provider.
    pub async fn health_check_all(&self) -> Vec<(String, Result<()>)> {
        let mut results = Vec::with_capacity(self.providers.len());
        for p in &self.providers {
            results.push((p.name().to_string(), p.health_check().await));
        }
        results
    }
}
