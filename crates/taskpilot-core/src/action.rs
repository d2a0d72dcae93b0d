use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of actions the agent can execute on behalf of a chat turn.
///
/// Adding a kind here forces every dispatcher `match` to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateTask,
    UpdateTask,
    DeleteTask,
    SearchTasks,
    SetReminder,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::CreateTask,
        ActionKind::UpdateTask,
        ActionKind::DeleteTask,
        ActionKind::SearchTasks,
        ActionKind::SetReminder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::CreateTask => "create_task",
            ActionKind::UpdateTask => "update_task",
            ActionKind::DeleteTask => "delete_task",
            ActionKind::SearchTasks => "search_tasks",
            ActionKind::SetReminder => "set_reminder",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        ActionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| format!("unknown action kind '{s}'"))
    }
}
