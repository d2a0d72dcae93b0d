//! # taskpilot-cli
//!
//! Command-line interface for the TaskPilot agent.
//!
//! ## Commands
//!
//! - `taskpilot start`: serve the HTTP API and WebSocket
//! - `taskpilot chat`: talk to the agent from the terminal
//! - `taskpilot config`: show the resolved configuration
//! - `taskpilot version`: show version and build info

pub mod commands;

pub use commands::Cli;
