//! Session registry: one agent actor per session key.
//!
//! Actors are spawned lazily on first use. Each one loads and saves its own
//! snapshot and owns its own connections and reminder jobs, so sessions never
//! see each other's state.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use taskpilot_config::TaskPilotConfig;
use taskpilot_core::{Result, TaskPilotError};
use taskpilot_store::Store;

use crate::agent::{AgentHandle, AgentLoop, AgentSettings};
use crate::extractor::Extractor;

const MAX_SESSION_NAME_LEN: usize = 64;

#[derive(Clone)]
pub struct SessionRegistry {
    store: Store,
    extractor: Arc<Extractor>,
    settings: AgentSettings,
    default_session: String,
    sessions: Arc<RwLock<HashMap<String, AgentHandle>>>,
}

impl SessionRegistry {
    pub fn new(
        store: Store,
        extractor: Arc<Extractor>,
        settings: AgentSettings,
        default_session: impl Into<String>,
    ) -> Self {
        Self {
            store,
            extractor,
            settings,
            default_session: default_session.into(),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn from_config(store: Store, extractor: Arc<Extractor>, config: &TaskPilotConfig) -> Self {
        Self::new(
            store,
            extractor,
            AgentSettings::from_config(config),
            config.agent.default_session.clone(),
        )
    }

    pub fn default_session(&self) -> &str {
        &self.default_session
    }

    /// Session names are 1-64 characters of ASCII letters, digits, `-`, `_` or `.`.
    pub fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() || name.len() > MAX_SESSION_NAME_LEN {
            return Err(TaskPilotError::Session(format!(
                "session name must be 1-{MAX_SESSION_NAME_LEN} characters"
            )));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(TaskPilotError::Session(format!(
                "invalid session name '{name}'"
            )));
        }
        Ok(())
    }

    /// The handle for `session`, spawning its actor if needed. `None` or a
    /// blank name addresses the default session.
    pub async fn get(&self, session: Option<&str>) -> Result<AgentHandle> {
        let name = session
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.default_session)
            .to_string();
        Self::validate_name(&name)?;

        if let Some(handle) = self.sessions.read().await.get(&name) {
            return Ok(handle.clone());
        }

        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(&name) {
            return Ok(handle.clone());
        }
        let (agent, fires) = AgentLoop::new(
            name.clone(),
            self.store.clone(),
            Arc::clone(&self.extractor),
            self.settings.clone(),
        )
        .map_err(|e| TaskPilotError::Session(format!("failed to start session '{name}': {e}")))?;
        let handle = agent.spawn(fires);
        sessions.insert(name.clone(), handle.clone());
        info!(session = %name, "session started");
        Ok(handle)
    }

    /// Start every session that has pending reminder jobs so their timers
    /// are re-armed. Returns how many sessions were started.
    pub async fn restore(&self) -> Result<usize> {
        if !self.settings.durable_reminders {
            return Ok(0);
        }
        let mut started = 0;
        for session in self.store.sessions_with_pending_jobs()? {
            match self.get(Some(session.as_str())).await {
                Ok(_) => started += 1,
                Err(e) => warn!(session = %session, error = %e, "failed to restore session"),
            }
        }
        Ok(started)
    }

    /// Names of running sessions, sorted.
    pub async fn active_sessions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
