use thiserror::Error;

/// Unified error type for the TaskPilot agent.
#[derive(Error, Debug)]
pub enum TaskPilotError {
    // ── Inference errors ───────────────────────────────────────
    #[error("inference service error: {0}")]
    Inference(String),

    #[error("inference rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("inference timed out after {secs}s")]
    InferenceTimeout { secs: u64 },

    #[error("model not found: {0}")]
    ModelNotFound(String),

    // ── State errors ───────────────────────────────────────────
    #[error("store error: {0}")]
    Store(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("session error: {0}")]
    Session(String),

    // ── Transport errors ───────────────────────────────────────
    #[error("invalid client frame: {0}")]
    InvalidFrame(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TaskPilotError>;
