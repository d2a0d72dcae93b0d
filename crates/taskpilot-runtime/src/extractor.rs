//! Intent & action extraction.
//!
//! Every chat turn makes one inference call for the reply text. The action
//! comes from the intent classifiers, not from the reply. A create action
//! makes a second call that turns the user's recent messages into a task.

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use taskpilot_config::TaskPilotConfig;
use taskpilot_core::{
    Priority, PromptMessage, Result, Task, TaskDraft, TaskPilotError, TaskStatus,
};
use taskpilot_llm::{LlmRequest, ModelRouter};

use crate::intent::{Intent, IntentClassifier, KeywordClassifier, LlmIntentClassifier, REPLY_ONLY_CONFIDENCE};

// ── Inference client ───────────────────────────────────────────

/// Model parameters shared by every call the agent makes.
#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub model: String,
    pub fallback_model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl InferenceSettings {
    pub fn from_config(config: &TaskPilotConfig) -> Self {
        Self {
            model: config.agent.model.clone(),
            fallback_model: config.agent.fallback_model.clone(),
            max_tokens: config.agent.max_tokens,
            temperature: config.agent.temperature,
            timeout: Duration::from_secs(config.agent.request_timeout_secs),
        }
    }
}

/// A [`ModelRouter`] bound to one model, with a hard timeout per call.
pub struct InferenceClient {
    router: Arc<ModelRouter>,
    settings: InferenceSettings,
}

impl InferenceClient {
    pub fn new(router: Arc<ModelRouter>, settings: InferenceSettings) -> Self {
        Self { router, settings }
    }

    /// Completion text for `messages`. Timeouts and responses without usable
    /// text are errors.
    pub async fn complete_text(&self, messages: Vec<PromptMessage>) -> Result<String> {
        let mut request = LlmRequest::new(self.settings.model.clone(), messages);
        request.max_tokens = self.settings.max_tokens;
        request.temperature = self.settings.temperature;

        let call = self
            .router
            .complete(&request, self.settings.fallback_model.as_deref());
        let response = tokio::time::timeout(self.settings.timeout, call)
            .await
            .map_err(|_| TaskPilotError::InferenceTimeout {
                secs: self.settings.timeout.as_secs(),
            })??;

        debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "inference complete"
        );
        response.text().ok_or_else(|| {
            warn!(raw = %response.raw, "unrecognized inference response shape");
            TaskPilotError::Inference("no usable content in response".into())
        })
    }
}

// ── Extraction results ─────────────────────────────────────────

/// The outcome of one chat turn's inference.
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    pub reply: String,
    pub intent: Option<Intent>,
    /// Confidence of `intent`, or the reply-only default.
    pub confidence: f32,
    /// True when the reply is the canned fallback.
    pub degraded: bool,
}

/// Reply used when the inference service is unavailable or unintelligible.
pub fn canned_reply(message: &str) -> String {
    format!(
        "I'm your task assistant. You said: \"{message}\". I couldn't reach my language service just now, \
         but I can still create, update, and track tasks for you. What would you like to do?"
    )
}

fn system_prompt(user_id: &str, context: &[Task], now: DateTime<Utc>) -> String {
    let tasks = serde_json::to_string_pretty(context).unwrap_or_else(|_| "[]".into());
    format!(
        "You are a helpful AI task management assistant. You can help users:\n\
         1. Create new tasks\n\
         2. Update existing tasks\n\
         3. Delete tasks\n\
         4. Search and filter tasks\n\
         5. Set reminders and due dates\n\
         6. Organize tasks by priority and tags\n\n\
         Current user context:\n\
         - User ID: {user_id}\n\
         - Recent tasks: {tasks}\n\
         - Current time: {}\n\n\
         Be conversational and helpful. Ask for clarification if needed.",
        now.to_rfc3339()
    )
}

const EXTRACTION_SYSTEM: &str = "You are a task extraction assistant. Return only valid JSON.";

// ── Extractor ──────────────────────────────────────────────────

pub struct Extractor {
    client: Arc<InferenceClient>,
    keywords: KeywordClassifier,
    fallback: Option<Arc<dyn IntentClassifier>>,
}

impl Extractor {
    pub fn new(client: Arc<InferenceClient>) -> Self {
        Self {
            client,
            keywords: KeywordClassifier,
            fallback: None,
        }
    }

    /// Consult `classifier` when no keyword matches.
    pub fn with_fallback_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.fallback = Some(classifier);
        self
    }

    /// Build from config, enabling the model-backed intent fallback when configured.
    pub fn from_config(router: Arc<ModelRouter>, config: &TaskPilotConfig) -> Self {
        let client = Arc::new(InferenceClient::new(
            router,
            InferenceSettings::from_config(config),
        ));
        let extractor = Self::new(Arc::clone(&client));
        if config.agent.llm_intent_fallback {
            extractor.with_fallback_classifier(Arc::new(LlmIntentClassifier::new(client)))
        } else {
            extractor
        }
    }

    /// Produce the reply and the inferred action for one chat message.
    pub async fn infer(
        &self,
        user_id: &str,
        message: &str,
        context: &[Task],
        now: DateTime<Utc>,
    ) -> Inference {
        let prompt = vec![
            PromptMessage::system(system_prompt(user_id, context, now)),
            PromptMessage::user(message),
        ];

        let reply = match self.client.complete_text(prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "inference failed, using canned reply");
                return Inference {
                    reply: canned_reply(message),
                    intent: None,
                    confidence: REPLY_ONLY_CONFIDENCE,
                    degraded: true,
                };
            }
        };

        let mut intent = self.keywords.classify_sync(message, context);
        if intent.is_none()
            && let Some(fallback) = &self.fallback
        {
            intent = fallback.classify(message, context).await;
            if let Some(ref i) = intent {
                debug!(classifier = fallback.name(), action = %i.kind, "fallback classifier matched");
            }
        }

        let confidence = intent
            .as_ref()
            .map(|i| i.confidence)
            .unwrap_or(REPLY_ONLY_CONFIDENCE);
        Inference {
            reply,
            intent,
            confidence,
            degraded: false,
        }
    }

    /// Turn the user's recent messages into a task draft.
    ///
    /// A failed call falls back to a title derived from the latest message;
    /// a reply that is not a JSON object yields `None`.
    pub async fn extract_task(&self, recent_messages: &[String]) -> Option<TaskDraft> {
        let conversation = recent_messages.join("\n");
        let prompt = vec![
            PromptMessage::system(EXTRACTION_SYSTEM),
            PromptMessage::user(format!(
                "Extract task information from this conversation:\n{conversation}\n\n\
                 Return JSON with: title, description, priority (low/medium/high/urgent), \
                 dueDate (ISO string or null), tags (array)"
            )),
        ];

        match self.client.complete_text(prompt).await {
            Ok(text) => {
                let draft = parse_task_draft(&text);
                if draft.is_none() {
                    warn!(reply = %text, "failed to parse extracted task data");
                }
                draft
            }
            Err(e) => {
                let latest = recent_messages.last()?;
                let title = heuristic_title(latest)?;
                info!(error = %e, title = %title, "task extraction call failed, using heuristic title");
                Some(TaskDraft::titled(title))
            }
        }
    }
}

// ── Parsing helpers ────────────────────────────────────────────

/// The outermost `{…}` span of `raw`, which tolerates code fences and prose
/// around the JSON.
pub fn json_object_slice(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Parse a model's task JSON. Fields with unusable values are dropped rather
/// than failing the whole draft.
pub fn parse_task_draft(raw: &str) -> Option<TaskDraft> {
    let value: Value = serde_json::from_str(json_object_slice(raw)?).ok()?;
    let obj = value.as_object()?;

    let text = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Some(TaskDraft {
        title: text("title"),
        description: text("description"),
        priority: text("priority").and_then(|p| p.parse::<Priority>().ok()),
        status: text("status").and_then(|s| s.parse::<TaskStatus>().ok()),
        due_date: text("dueDate")
            .or_else(|| text("due_date"))
            .and_then(|d| parse_due_date(&d)),
        tags: obj.get("tags").and_then(Value::as_array).map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        }),
    })
}

/// Accepts RFC 3339 instants and bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_due_date(raw: &str) -> Option<DateTime<Utc>> {
    if raw.eq_ignore_ascii_case("null") || raw.eq_ignore_ascii_case("none") {
        return None;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

static LEADING_INTENT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:please\s+)?(?:can you\s+|could you\s+)?(?:create|add|make|new)\s+(?:me\s+)?(?:a\s+|an\s+)?(?:new\s+)?(?:(?:task|todo|to-do|item)\b)?\s*(?:(?:to|for|called|named)\b|:|-)?\s*",
    )
    .ok()
});

/// Derive a title by stripping the request phrasing:
/// "create a task to review the proposal" becomes "Review the proposal".
pub fn heuristic_title(message: &str) -> Option<String> {
    let stripped = match LEADING_INTENT.as_ref() {
        Some(re) => re.replace(message, "").into_owned(),
        None => message.to_string(),
    };
    let trimmed = stripped
        .trim()
        .trim_end_matches(['.', '!', '?'])
        .trim_matches('"')
        .trim();
    let mut chars = trimmed.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}
