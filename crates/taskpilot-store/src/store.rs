use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use taskpilot_core::{AgentState, Result, TaskPilotError};

pub(crate) fn store_err(e: rusqlite::Error) -> TaskPilotError {
    TaskPilotError::Store(e.to_string())
}

/// Key under which a session's snapshot is stored.
pub fn state_key(session: &str) -> String {
    format!("agent:{session}")
}

/// SQLite-backed key→blob store. Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening store");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(store_err)?;

        // WAL so readers never block the snapshot writer
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(store_err)?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS agent_state (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reminder_jobs (
                session TEXT NOT NULL,
                task_id TEXT NOT NULL,
                offset_label TEXT NOT NULL,
                fire_at TEXT NOT NULL,
                state TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                PRIMARY KEY (session, task_id, offset_label)
            );
            CREATE INDEX IF NOT EXISTS idx_reminder_jobs_state ON reminder_jobs(state);
            ",
        )
        .map_err(store_err)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    pub(crate) fn db(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.db.lock()
    }

    // ── Raw blobs ──────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Result<Option<String>> {
        let db = self.db.lock();
        db.query_row(
            "SELECT data FROM agent_state WHERE id = ?1",
            rusqlite::params![id],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(store_err)
    }

    /// Overwrite the blob stored under `id`.
    pub fn put(&self, id: &str, blob: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock();
        db.execute(
            "INSERT INTO agent_state (id, data, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            rusqlite::params![id, blob, now],
        )
        .map_err(store_err)?;
        Ok(())
    }

    // ── Agent snapshots ────────────────────────────────────────

    /// Load the last snapshot of a session, or `None` if it was never saved.
    pub fn load_state(&self, session: &str) -> Result<Option<AgentState>> {
        match self.get(&state_key(session))? {
            Some(blob) => Ok(Some(serde_json::from_str(&blob)?)),
            None => Ok(None),
        }
    }

    pub fn save_state(&self, session: &str, state: &AgentState) -> Result<()> {
        let blob = serde_json::to_string(state)?;
        self.put(&state_key(session), &blob)?;
        debug!(
            session,
            tasks = state.tasks.len(),
            messages = state.chat_history.len(),
            "snapshot saved"
        );
        Ok(())
    }
}
