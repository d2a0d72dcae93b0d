//! In-memory task collection operations.
//!
//! Implemented directly on the `Vec<Task>` inside `AgentState`, so the task
//! list is serialized with the rest of the aggregate and only the agent loop
//! (which owns the state) can call the mutating half.

use chrono::{DateTime, Duration, Utc};

use taskpilot_core::{SearchCriteria, Task, TaskDraft, TaskUpdate, advance_timestamp, new_task_id};

pub const DEFAULT_TASK_TITLE: &str = "Untitled Task";

pub trait TaskStore {
    /// Insert a task built from `draft`, assigning id and timestamps.
    fn create(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> Task;

    /// Merge `update` into the task. `None` when the id is unknown.
    fn update(&mut self, id: &str, update: TaskUpdate, now: DateTime<Utc>) -> Option<Task>;

    /// Remove the task. `false` when nothing matched.
    fn delete(&mut self, id: &str) -> bool;

    fn get(&self, id: &str) -> Option<&Task>;

    /// Tasks matching every set criterion, in collection order.
    fn search(&self, criteria: &SearchCriteria) -> Vec<Task>;

    /// Up to `limit` tasks updated within `window`, most recently updated first.
    fn recent(&self, limit: usize, window: Duration, now: DateTime<Utc>) -> Vec<Task>;
}

impl TaskStore for Vec<Task> {
    fn create(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> Task {
        let title = draft
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TASK_TITLE.to_string());

        let task = Task {
            id: new_task_id(),
            title,
            description: draft.description.unwrap_or_default(),
            priority: draft.priority.unwrap_or_default(),
            status: draft.status.unwrap_or_default(),
            due_date: draft.due_date,
            created_at: now,
            updated_at: now,
            tags: draft.tags.unwrap_or_default(),
        };
        self.push(task.clone());
        task
    }

    fn update(&mut self, id: &str, update: TaskUpdate, now: DateTime<Utc>) -> Option<Task> {
        let task = self.iter_mut().find(|t| t.id == id)?;

        if let Some(title) = update.title {
            task.title = title;
        }
        if let Some(description) = update.description {
            task.description = description;
        }
        if let Some(priority) = update.priority {
            task.priority = priority;
        }
        if let Some(status) = update.status {
            task.status = status;
        }
        if let Some(due) = update.due_date {
            task.due_date = Some(due);
        }
        if let Some(tags) = update.tags {
            task.tags = tags;
        }
        task.updated_at = advance_timestamp(task.updated_at, now);

        Some(task.clone())
    }

    fn delete(&mut self, id: &str) -> bool {
        let before = self.len();
        self.retain(|t| t.id != id);
        self.len() < before
    }

    fn get(&self, id: &str) -> Option<&Task> {
        self.iter().find(|t| t.id == id)
    }

    fn search(&self, criteria: &SearchCriteria) -> Vec<Task> {
        self.iter()
            .filter(|t| criteria.matches(t))
            .cloned()
            .collect()
    }

    fn recent(&self, limit: usize, window: Duration, now: DateTime<Utc>) -> Vec<Task> {
        let cutoff = now - window;
        let mut recent: Vec<Task> = self
            .iter()
            .filter(|t| t.updated_at > cutoff)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        recent.truncate(limit);
        recent
    }
}
