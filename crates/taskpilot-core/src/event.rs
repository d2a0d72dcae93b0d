use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskPilotError};
use crate::types::{ChatMessage, SearchCriteria, Task, TaskDraft, TaskId, TaskUpdate, UserId};

/// Frames pushed from the agent to live clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    // ── Sent to a single client ────────────────────────────────
    ConnectionEstablished {
        recent_messages: Vec<ChatMessage>,
        task_count: usize,
    },
    MessageResponse {
        message: ChatMessage,
    },
    TasksList {
        tasks: Vec<Task>,
    },
    Error {
        message: String,
    },

    // ── Broadcast to every client ──────────────────────────────
    TaskCreated {
        task: Task,
    },
    /// `task` is null when the update targeted an unknown id.
    TaskUpdated {
        task: Option<Task>,
    },
    TaskDeleted {
        task_id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
    },
    NewMessage {
        message: ChatMessage,
    },
    Reminder {
        message: ChatMessage,
        task: Task,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    /// The wire name carried in the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::ConnectionEstablished { .. } => "connection_established",
            ServerEvent::MessageResponse { .. } => "message_response",
            ServerEvent::TasksList { .. } => "tasks_list",
            ServerEvent::Error { .. } => "error",
            ServerEvent::TaskCreated { .. } => "task_created",
            ServerEvent::TaskUpdated { .. } => "task_updated",
            ServerEvent::TaskDeleted { .. } => "task_deleted",
            ServerEvent::NewMessage { .. } => "new_message",
            ServerEvent::Reminder { .. } => "reminder",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Structured requests a live client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    ChatMessage {
        #[serde(default)]
        user_id: Option<UserId>,
        content: String,
    },
    GetTasks {
        #[serde(default)]
        criteria: SearchCriteria,
    },
    CreateTask {
        #[serde(default)]
        task_data: TaskDraft,
    },
    UpdateTask {
        task_id: TaskId,
        #[serde(default)]
        updates: TaskUpdate,
    },
    DeleteTask {
        task_id: TaskId,
    },
}

impl ClientFrame {
    /// Parse a raw text frame. Unknown types and malformed JSON are both
    /// reported as [`TaskPilotError::InvalidFrame`].
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| TaskPilotError::InvalidFrame(e.to_string()))
    }
}
