use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use taskpilot_core::{Result, TaskPilotError};

use crate::schema::{TaskPilotConfig, WarningSeverity, data_dir};

/// Loads the TaskPilot configuration and keeps the current snapshot.
pub struct ConfigLoader {
    config: Arc<RwLock<TaskPilotConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > TASKPILOT_CONFIG env > ~/.taskpilot/taskpilot.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("TASKPILOT_CONFIG") {
            return PathBuf::from(p);
        }
        data_dir().join("taskpilot.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            Self::read_file(&config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            TaskPilotConfig::default()
        };

        let config = Self::apply_env_overrides(config);
        Self::check(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Parse a TOML document without touching the filesystem or environment.
    pub fn from_toml(raw: &str) -> Result<TaskPilotConfig> {
        toml::from_str::<TaskPilotConfig>(raw)
            .map_err(|e| TaskPilotError::Config(format!("failed to parse config: {}", e)))
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> TaskPilotConfig {
        self.config.read().clone()
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Re-read the config file. The current config is kept when the new one
    /// fails to parse or validate.
    pub fn reload(&self) -> Result<()> {
        if !self.config_path.exists() {
            return Err(TaskPilotError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = Self::apply_env_overrides(Self::read_file(&self.config_path)?);
        Self::check(&new_config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }

    fn read_file(path: &Path) -> Result<TaskPilotConfig> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str::<TaskPilotConfig>(&raw).map_err(|e| {
            TaskPilotError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Log warnings, fail on errors.
    fn check(config: &TaskPilotConfig) -> Result<()> {
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    match w.severity {
                        WarningSeverity::Info => info!("{}", w),
                        _ => warn!("{}", w),
                    }
                }
                Ok(())
            }
            Err(e) => Err(TaskPilotError::Config(e)),
        }
    }

    /// Apply env var overrides (TASKPILOT_MODEL, TASKPILOT_LISTEN, ...).
    pub fn apply_env_overrides(mut config: TaskPilotConfig) -> TaskPilotConfig {
        if let Ok(v) = std::env::var("TASKPILOT_MODEL") {
            config.agent.model = v;
        }
        if let Ok(v) = std::env::var("TASKPILOT_LISTEN") {
            config.server.listen = v;
        }
        if let Ok(v) = std::env::var("TASKPILOT_LOG_LEVEL") {
            config.logging.level = v;
        }
        // Secrets: the config file wins, env fills the gaps.
        if config.services.openai_api_key.is_none() {
            if let Ok(v) = std::env::var("OPENAI_API_KEY") {
                config.services.openai_api_key = Some(v);
            }
        }
        if config.services.cloudflare_account_id.is_none() {
            if let Ok(v) = std::env::var("CLOUDFLARE_ACCOUNT_ID") {
                config.services.cloudflare_account_id = Some(v);
            }
        }
        if config.services.cloudflare_api_token.is_none() {
            if let Ok(v) = std::env::var("CLOUDFLARE_API_TOKEN") {
                config.services.cloudflare_api_token = Some(v);
            }
        }
        config
    }
}
