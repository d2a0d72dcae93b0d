//! # taskpilot-store
//!
//! Durable storage for the agent: one last-write-wins snapshot of each
//! session's `AgentState`, plus the reminder job table that lets planned
//! reminders survive a restart.

pub mod jobs;
pub mod store;

pub use jobs::{JobState, ReminderJob};
pub use store::{Store, state_key};
