//! # taskpilot-runtime
//!
//! The per-session agent: chat intake, intent extraction, the task
//! collection, reminders and live fan-out.
//!
//! ## Architecture
//!
//! ```text
//!   HTTP / WebSocket           reminder timers
//!          │ AgentCommand             │ ReminderFire
//!          ▼                          ▼
//!   ┌──────────────────────────────────────┐
//!   │              AgentLoop               │  ← one per session
//!   │  1. Record the user message          │
//!   │  2. Extractor: reply + intent        │  ← language inference
//!   │  3. Record the agent reply           │
//!   │  4. Dispatch the action              │  ← TaskStore / scheduler
//!   │  5. Snapshot AgentState              │  ← taskpilot-store
//!   │  6. Broadcast                        │  ← BroadcastHub
//!   └──────────────────────────────────────┘
//! ```

pub mod agent;
pub mod extractor;
pub mod hub;
pub mod intent;
pub mod scheduler;
pub mod session;
pub mod task_store;

pub use agent::{AgentCommand, AgentHandle, AgentLoop, AgentSettings};
pub use extractor::{Extractor, Inference, InferenceClient, InferenceSettings, canned_reply};
pub use hub::{BroadcastHub, ChannelConnection, Connection, ConnectionId, SendOutcome};
pub use intent::{Intent, IntentClassifier, KeywordClassifier, LlmIntentClassifier};
pub use scheduler::{PlannedReminder, ReminderFire, ReminderScheduler, plan};
pub use session::SessionRegistry;
pub use task_store::{DEFAULT_TASK_TITLE, TaskStore};
