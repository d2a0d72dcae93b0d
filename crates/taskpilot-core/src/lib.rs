//! # taskpilot-core
//!
//! Core types and primitives for the TaskPilot conversational task agent.
//! This crate defines the shared vocabulary used by every other crate in the workspace:
//! the task model, chat history, the persisted agent aggregate, the action
//! vocabulary, and the frames exchanged with live clients.

pub mod action;
pub mod error;
pub mod event;
pub mod message;
pub mod types;

pub use action::ActionKind;
pub use error::{Result, TaskPilotError};
pub use event::{ClientFrame, ServerEvent};
pub use message::{PromptMessage, Role};
pub use types::*;
