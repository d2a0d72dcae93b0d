//! # taskpilot-llm
//!
//! Boundary to the language-inference service. Providers turn an ordered
//! prompt into a raw JSON response; [`extract_completion_text`] is the one
//! place that knows how to pull the completion text out of it.

pub mod cloudflare;
pub mod local;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod router;

pub use mock::MockProvider;
pub use provider::{LlmProvider, LlmRequest, LlmResponse, Usage, extract_completion_text};
pub use router::ModelRouter;
