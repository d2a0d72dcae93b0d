use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::action::ActionKind;

/// Unique identifier for a task (`task_<hex>`).
pub type TaskId = String;

/// Unique identifier for a user (`user_<hex>`).
pub type UserId = String;

/// Unique identifier for a chat message.
pub type MessageId = String;

/// Author recorded on reminder messages.
pub const SYSTEM_USER_ID: &str = "system";

/// Author recorded on messages from clients that did not identify themselves.
pub const ANONYMOUS_USER_ID: &str = "anonymous";

pub fn new_task_id() -> TaskId {
    format!("task_{}", Uuid::new_v4().simple())
}

pub fn new_user_id() -> UserId {
    format!("user_{}", Uuid::new_v4().simple())
}

fn new_message_id(prefix: &str) -> MessageId {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

/// Return a timestamp strictly greater than `prev`, preferring `now`.
///
/// Wall clocks can stand still or step backwards between two edits; the
/// `updatedAt` of a task must still advance on every mutation.
pub fn advance_timestamp(prev: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > prev {
        now
    } else {
        prev + Duration::microseconds(1)
    }
}

// ── Task ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" | "normal" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" | "critical" => Ok(Priority::Urgent),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
            "pending" | "todo" => Ok(TaskStatus::Pending),
            "in-progress" => Ok(TaskStatus::InProgress),
            "completed" | "done" => Ok(TaskStatus::Completed),
            "cancelled" | "canceled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// A unit of work tracked by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Task {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status != TaskStatus::Completed && self.due_date.is_some_and(|due| due < now)
    }
}

/// Partial task fields used to create a task. Missing fields take defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<DateTime<Utc>>,
    pub tags: Option<Vec<String>>,
}

impl TaskDraft {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

/// Partial task fields merged into an existing task. `id` and `createdAt`
/// are never part of an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<DateTime<Utc>>,
    pub tags: Option<Vec<String>>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self == &TaskUpdate::default()
    }
}

/// Conjunctive task filter. Empty criteria match every task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchCriteria {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    /// A task matches when it carries at least one of these tags.
    pub tags: Vec<String>,
    /// Case-insensitive substring over title and description.
    pub search: Option<String>,
}

impl SearchCriteria {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.priority.is_none()
            && self.tags.is_empty()
            && self.search.as_deref().is_none_or(str::is_empty)
    }

    pub fn matches(&self, task: &Task) -> bool {
        if self.status.is_some_and(|s| s != task.status) {
            return false;
        }
        if self.priority.is_some_and(|p| p != task.priority) {
            return false;
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| task.tags.contains(t)) {
            return false;
        }
        if let Some(needle) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let needle = needle.to_lowercase();
            if !task.title.to_lowercase().contains(&needle)
                && !task.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

// ── Users ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub timezone: String,
    pub notification_channels: Vec<String>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            notification_channels: vec!["email".to_string(), "push".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub preferences: UserPreferences,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPreferencesDraft {
    pub timezone: Option<String>,
    pub notification_channels: Option<Vec<String>>,
}

/// Partial user fields accepted at registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserDraft {
    pub id: Option<UserId>,
    pub name: Option<String>,
    pub preferences: Option<UserPreferencesDraft>,
}

impl UserDraft {
    /// Materialize a user, filling unset fields with defaults.
    pub fn into_user(self) -> User {
        let defaults = UserPreferences::default();
        let prefs = self.preferences.unwrap_or_default();
        User {
            id: self.id.filter(|id| !id.is_empty()).unwrap_or_else(new_user_id),
            name: self
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "Anonymous User".to_string()),
            preferences: UserPreferences {
                timezone: prefs.timezone.unwrap_or(defaults.timezone),
                notification_channels: prefs
                    .notification_channels
                    .unwrap_or(defaults.notification_channels),
            },
        }
    }
}

// ── Chat history ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    User,
    Agent,
    System,
}

/// Side information attached to agent and system messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionKind>,
    /// Offset label (e.g. `24h_before`) of the reminder that produced this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub user_id: UserId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl ChatMessage {
    pub fn user(user_id: impl Into<UserId>, content: impl Into<String>) -> Self {
        Self {
            id: new_message_id("msg"),
            user_id: user_id.into(),
            content: content.into(),
            timestamp: Utc::now(),
            kind: MessageType::User,
            metadata: None,
        }
    }

    /// An agent reply addressed to `user_id`.
    pub fn agent(
        user_id: impl Into<UserId>,
        content: impl Into<String>,
        metadata: Option<MessageMetadata>,
    ) -> Self {
        Self {
            id: new_message_id("resp"),
            user_id: user_id.into(),
            content: content.into(),
            timestamp: Utc::now(),
            kind: MessageType::Agent,
            metadata,
        }
    }

    pub fn system(content: impl Into<String>, metadata: Option<MessageMetadata>) -> Self {
        Self {
            id: new_message_id("reminder"),
            user_id: SYSTEM_USER_ID.to_string(),
            content: content.into(),
            timestamp: Utc::now(),
            kind: MessageType::System,
            metadata,
        }
    }
}

// ── Agent aggregate ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub start: u8,
    pub end: u8,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self { start: 9, end: 17 }
    }
}

/// Agent-wide preferences persisted alongside the tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// Reminder offsets in hours before a task's due date.
    pub reminder_intervals: Vec<u32>,
    pub working_hours: WorkingHours,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            reminder_intervals: vec![1, 24, 168],
            working_hours: WorkingHours::default(),
        }
    }
}

/// The entire persisted aggregate of one agent session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentState {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    /// User id to the id of that user's latest message.
    #[serde(default)]
    pub active_conversations: BTreeMap<UserId, MessageId>,
    #[serde(default)]
    pub preferences: Preferences,
}

impl AgentState {
    pub fn with_preferences(preferences: Preferences) -> Self {
        Self {
            preferences,
            ..Default::default()
        }
    }

    /// The last `n` chat messages, oldest first.
    pub fn recent_messages(&self, n: usize) -> &[ChatMessage] {
        let start = self.chat_history.len().saturating_sub(n);
        &self.chat_history[start..]
    }

    /// The last `n` messages authored by `user_id`, oldest first.
    pub fn recent_messages_from(&self, user_id: &str, n: usize) -> Vec<&ChatMessage> {
        let mut msgs: Vec<&ChatMessage> = self
            .chat_history
            .iter()
            .rev()
            .filter(|m| m.kind == MessageType::User && m.user_id == user_id)
            .take(n)
            .collect();
        msgs.reverse();
        msgs
    }
}

// ── Analytics ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub pending_tasks: usize,
    pub overdue_tasks: usize,
    /// Percentage of completed tasks, rounded; 0 when there are no tasks.
    pub productivity_score: u32,
}

impl Analytics {
    pub fn compute(tasks: &[Task], now: DateTime<Utc>) -> Self {
        let total = tasks.len();
        let completed = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        let pending = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .count();
        let overdue = tasks.iter().filter(|t| t.is_overdue(now)).count();
        let score = if total == 0 {
            0
        } else {
            ((completed as f64 / total as f64) * 100.0).round() as u32
        };
        Self {
            total_tasks: total,
            completed_tasks: completed,
            pending_tasks: pending,
            overdue_tasks: overdue,
            productivity_score: score,
        }
    }
}
