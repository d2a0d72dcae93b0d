//! Intent classification: which action, if any, a chat message asks for.
//!
//! [`KeywordClassifier`] is the primary strategy. [`LlmIntentClassifier`]
//! asks the model and is consulted only when keywords find nothing.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use taskpilot_core::{ActionKind, Priority, PromptMessage, SearchCriteria, Task, TaskId, TaskStatus, TaskUpdate};

use crate::extractor::{InferenceClient, json_object_slice};

/// Confidence reported when no action was inferred.
pub const REPLY_ONLY_CONFIDENCE: f32 = 0.7;

/// An inferred action with the task it targets, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub kind: ActionKind,
    pub target_task_id: Option<TaskId>,
    pub confidence: f32,
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    fn name(&self) -> &str;

    /// Classify `message`. `context` holds the tasks the user is likely talking about.
    async fn classify(&self, message: &str, context: &[Task]) -> Option<Intent>;
}

// ── Keyword heuristics ─────────────────────────────────────────

static KEYWORD_RULES: LazyLock<Vec<(Regex, ActionKind, f32)>> = LazyLock::new(|| {
    [
        // Stems, so inflected forms match too.
        (r"\b(?:creat|add(?:s|ed|ing)?\b|new\b)", ActionKind::CreateTask, 0.8),
        (r"\b(?:updat|chang|modif)", ActionKind::UpdateTask, 0.7),
        (r"\b(?:delet|remov|cancel)", ActionKind::DeleteTask, 0.8),
        (r"\b(?:list|show|find)", ActionKind::SearchTasks, 0.9),
    ]
    .into_iter()
    .filter_map(|(pattern, kind, confidence)| {
        Regex::new(pattern).ok().map(|re| (re, kind, confidence))
    })
    .collect()
});

static TASK_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\btask_[A-Za-z0-9]+\b").ok());

/// Classifies by keyword stems in the lowercased message, first rule wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn classify_sync(&self, message: &str, context: &[Task]) -> Option<Intent> {
        let lowered = message.to_lowercase();
        let (_, kind, confidence) = KEYWORD_RULES.iter().find(|(re, _, _)| re.is_match(&lowered))?;
        Some(Intent {
            kind: *kind,
            target_task_id: find_target(message, context),
            confidence: *confidence,
        })
    }
}

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn classify(&self, message: &str, context: &[Task]) -> Option<Intent> {
        self.classify_sync(message, context)
    }
}

/// The task a message refers to: an explicit `task_…` id, otherwise the
/// context task with the longest title quoted in the message.
pub fn find_target(message: &str, context: &[Task]) -> Option<TaskId> {
    if let Some(m) = TASK_ID.as_ref().and_then(|re| re.find(message)) {
        return Some(m.as_str().to_string());
    }
    let lowered = message.to_lowercase();
    context
        .iter()
        .filter(|t| t.title.len() >= 3 && lowered.contains(&t.title.to_lowercase()))
        .max_by_key(|t| t.title.len())
        .map(|t| t.id.clone())
}

/// Status named in free text, e.g. "mark it done" or "in progress".
pub fn detect_status(message: &str) -> Option<TaskStatus> {
    let m = message.to_lowercase();
    if m.contains("in progress") || m.contains("in-progress") || m.contains("started") {
        Some(TaskStatus::InProgress)
    } else if m.contains("complete") || m.contains("done") || m.contains("finished") {
        Some(TaskStatus::Completed)
    } else if m.contains("cancelled") || m.contains("canceled") {
        Some(TaskStatus::Cancelled)
    } else if m.contains("pending") || m.contains("reopen") {
        Some(TaskStatus::Pending)
    } else {
        None
    }
}

/// Priority named in free text, e.g. "urgent" or "low priority".
pub fn detect_priority(message: &str) -> Option<Priority> {
    let m = message.to_lowercase();
    if m.contains("urgent") {
        Some(Priority::Urgent)
    } else if m.contains("high priority") || m.contains("high-priority") {
        Some(Priority::High)
    } else if m.contains("low priority") || m.contains("low-priority") {
        Some(Priority::Low)
    } else if m.contains("medium priority") {
        Some(Priority::Medium)
    } else {
        None
    }
}

/// Field changes a chat message asks for.
pub fn update_from_message(message: &str) -> TaskUpdate {
    TaskUpdate {
        status: detect_status(message),
        priority: detect_priority(message),
        ..Default::default()
    }
}

/// Filters a "show me …" message asks for.
pub fn criteria_from_message(message: &str) -> SearchCriteria {
    SearchCriteria {
        status: detect_status(message),
        priority: detect_priority(message),
        ..Default::default()
    }
}

// ── Model-backed fallback ──────────────────────────────────────

const INTENT_PROMPT: &str = "You classify task-management requests. Reply with only a JSON object \
{\"action\": one of create_task, update_task, delete_task, search_tasks, set_reminder or null, \
\"taskId\": the id of the task referred to or null, \"confidence\": number between 0 and 1}.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntentReply {
    action: Option<String>,
    task_id: Option<String>,
    confidence: Option<f32>,
}

/// Asks the inference service for a structured intent.
pub struct LlmIntentClassifier {
    client: Arc<InferenceClient>,
}

impl LlmIntentClassifier {
    pub fn new(client: Arc<InferenceClient>) -> Self {
        Self { client }
    }

    /// Parse the model's reply. Unknown or null actions yield `None`.
    pub fn parse_reply(raw: &str) -> Option<Intent> {
        let reply: IntentReply = serde_json::from_str(json_object_slice(raw)?).ok()?;
        let kind = reply.action?.parse::<ActionKind>().ok()?;
        Some(Intent {
            kind,
            target_task_id: reply.task_id.filter(|id| !id.is_empty()),
            confidence: reply.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
        })
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    fn name(&self) -> &str {
        "llm"
    }

    async fn classify(&self, message: &str, context: &[Task]) -> Option<Intent> {
        let tasks: Vec<String> = context
            .iter()
            .map(|t| format!("- {} \"{}\" ({})", t.id, t.title, t.status))
            .collect();
        let prompt = vec![
            PromptMessage::system(INTENT_PROMPT),
            PromptMessage::user(format!(
                "Known tasks:\n{}\n\nRequest: {}",
                tasks.join("\n"),
                message
            )),
        ];
        match self.client.complete_text(prompt).await {
            Ok(text) => {
                let intent = Self::parse_reply(&text);
                debug!(?intent, "model intent classification");
                intent
            }
            Err(e) => {
                warn!(error = %e, "intent classification call failed");
                None
            }
        }
    }
}
