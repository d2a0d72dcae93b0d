use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use taskpilot_core::{Preferences, WorkingHours};

/// Root configuration, mapped to `taskpilot.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPilotConfig {
    pub agent: AgentConfig,
    pub reminders: RemindersConfig,
    pub preferences: PreferencesConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub services: ServicesConfig,
}

// ── Agent ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Primary model identifier, e.g. "cloudflare/@cf/meta/llama-3.1-8b-instruct".
    pub model: String,
    /// Model tried when the primary fails after retries.
    pub fallback_model: Option<String>,
    /// Maximum tokens per completion.
    pub max_tokens: u32,
    /// Temperature (0.0 - 2.0).
    pub temperature: f32,
    /// Upper bound in seconds on a single inference call.
    pub request_timeout_secs: u64,
    /// Session used when a client does not name one.
    pub default_session: String,
    /// Number of recently updated tasks embedded in the prompt.
    pub context_task_limit: usize,
    /// Only tasks updated within this many days are embedded in the prompt.
    pub context_window_days: i64,
    /// Messages sent to a client right after it connects.
    pub snapshot_history_len: usize,
    /// User messages sent to the task-extraction pass.
    pub extraction_history_len: usize,
    /// Ask the model for an action when no keyword matches.
    pub llm_intent_fallback: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "cloudflare/@cf/meta/llama-3.1-8b-instruct".into(),
            fallback_model: None,
            max_tokens: 1024,
            temperature: 0.7,
            request_timeout_secs: 30,
            default_session: "main".into(),
            context_task_limit: 10,
            context_window_days: 7,
            snapshot_history_len: 20,
            extraction_history_len: 5,
            llm_intent_fallback: false,
        }
    }
}

// ── Reminders ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemindersConfig {
    /// Lead-time offsets in hours before a due date.
    pub offsets_hours: Vec<u32>,
    /// Persist planned reminders and re-arm them at startup.
    pub durable: bool,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            offsets_hours: vec![1, 24, 168],
            durable: true,
        }
    }
}

// ── Preferences ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencesConfig {
    pub working_hours_start: u8,
    pub working_hours_end: u8,
    pub timezone: String,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            working_hours_start: 9,
            working_hours_end: 17,
            timezone: "UTC".into(),
        }
    }
}

// ── Storage ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database. Relative paths live under `~/.taskpilot/`.
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("taskpilot.db"),
        }
    }
}

impl StorageConfig {
    pub fn resolved_db_path(&self) -> PathBuf {
        if self.db_path.is_absolute() {
            return self.db_path.clone();
        }
        data_dir().join(&self.db_path)
    }
}

/// `~/.taskpilot`, or `./.taskpilot` when there is no home directory.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| Path::new(".").to_path_buf())
        .join(".taskpilot")
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP/WebSocket listen address.
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3800".into(),
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Services ───────────────────────────────────────────────────

/// Credentials and endpoints for the inference backends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub openai_api_key: Option<String>,
    /// Base URL for any OpenAI-compatible endpoint.
    pub openai_base_url: Option<String>,
    pub cloudflare_account_id: Option<String>,
    pub cloudflare_api_token: Option<String>,
    /// Ollama URL, e.g. "http://localhost:11434".
    pub ollama_url: Option<String>,
}

impl TaskPilotConfig {
    /// Agent preferences seeded into a fresh session state.
    pub fn initial_preferences(&self) -> Preferences {
        Preferences {
            reminder_intervals: self.reminders.offsets_hours.clone(),
            working_hours: WorkingHours {
                start: self.preferences.working_hours_start,
                end: self.preferences.working_hours_end,
            },
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "{} {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, " ({})", h)?;
        }
        Ok(())
    }
}

impl TaskPilotConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Agent model ───
        let model = &self.agent.model;
        if model.is_empty() {
            warnings.push(ConfigWarning {
                field: "agent.model".into(),
                message: "model is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'cloudflare/@cf/meta/llama-3.1-8b-instruct' or 'openai/gpt-4o-mini'".into()),
            });
        } else if !model.contains('/') {
            warnings.push(ConfigWarning {
                field: "agent.model".into(),
                message: format!("model '{}' should be in 'provider/model' format", model),
                severity: WarningSeverity::Warning,
                hint: Some("Use 'cloudflare/...', 'openai/...' or 'ollama/...'".into()),
            });
        }

        // ── Temperature ───
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            warnings.push(ConfigWarning {
                field: "agent.temperature".into(),
                message: format!("temperature {} is out of range", self.agent.temperature),
                severity: WarningSeverity::Error,
                hint: Some("Temperature must be between 0.0 and 2.0".into()),
            });
        }

        // ── Max tokens ───
        if self.agent.max_tokens == 0 {
            warnings.push(ConfigWarning {
                field: "agent.max_tokens".into(),
                message: "max_tokens is 0, replies would be empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 1024".into()),
            });
        }

        // ── Timeout ───
        if self.agent.request_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "agent.request_timeout_secs".into(),
                message: "timeout is 0, every inference call would time out".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set to e.g. 30".into()),
            });
        }

        if self.agent.default_session.trim().is_empty() {
            warnings.push(ConfigWarning {
                field: "agent.default_session".into(),
                message: "default session name is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'main'".into()),
            });
        }

        // ── Reminder offsets ───
        if self.reminders.offsets_hours.is_empty() {
            warnings.push(ConfigWarning {
                field: "reminders.offsets_hours".into(),
                message: "no reminder offsets configured".into(),
                severity: WarningSeverity::Error,
                hint: Some("Use e.g. [1, 24, 168]".into()),
            });
        } else if self.reminders.offsets_hours.contains(&0) {
            warnings.push(ConfigWarning {
                field: "reminders.offsets_hours".into(),
                message: "offset 0 would fire at the due time itself".into(),
                severity: WarningSeverity::Error,
                hint: Some("Offsets are hours before the due date and must be positive".into()),
            });
        }

        // ── Working hours ───
        let start = self.preferences.working_hours_start;
        let end = self.preferences.working_hours_end;
        if start >= end || end > 24 {
            warnings.push(ConfigWarning {
                field: "preferences.working_hours".into(),
                message: format!("working hours {}-{} are out of order", start, end),
                severity: WarningSeverity::Error,
                hint: Some("Start must be before end, both within 0-24".into()),
            });
        }

        // ── Server listen address ───
        if self.server.listen.is_empty() {
            warnings.push(ConfigWarning {
                field: "server.listen".into(),
                message: "listen address is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. '127.0.0.1:3800'".into()),
            });
        } else if self.server.listen.starts_with("0.0.0.0") {
            warnings.push(ConfigWarning {
                field: "server.listen".into(),
                message: "binding to 0.0.0.0, the unauthenticated API is reachable from all interfaces".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Use '127.0.0.1:3800' for local-only access".into()),
            });
        }

        // ── Provider credentials ───
        let provider = model.split('/').next().unwrap_or_default();
        if provider == "cloudflare"
            && (self.services.cloudflare_account_id.is_none()
                || self.services.cloudflare_api_token.is_none())
        {
            warnings.push(ConfigWarning {
                field: "services.cloudflare_api_token".into(),
                message: "cloudflare model selected but credentials are missing".into(),
                severity: WarningSeverity::Info,
                hint: Some("Set CLOUDFLARE_ACCOUNT_ID and CLOUDFLARE_API_TOKEN; chat falls back to canned replies".into()),
            });
        }

        // ── Logging format ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // ── Logging level ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  - {}", errors.join("\n  - ")));
        }

        Ok(warnings)
    }
}
