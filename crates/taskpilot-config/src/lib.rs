//! # taskpilot-config
//!
//! Configuration for the TaskPilot agent. Reads from `taskpilot.toml` and
//! environment variables, in that precedence order for secrets, with the
//! environment winning for the runtime knobs.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    AgentConfig, ConfigWarning, LoggingConfig, PreferencesConfig, RemindersConfig, ServerConfig,
    ServicesConfig, StorageConfig, TaskPilotConfig, WarningSeverity,
};
