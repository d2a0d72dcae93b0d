use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use taskpilot_core::{Result, TaskId, TaskPilotError};

use crate::store::{Store, store_err};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Fired,
    Skipped,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Fired => "fired",
            JobState::Skipped => "skipped",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = TaskPilotError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobState::Pending),
            "fired" => Ok(JobState::Fired),
            "skipped" => Ok(JobState::Skipped),
            other => Err(TaskPilotError::Store(format!("unknown job state '{other}'"))),
        }
    }
}

/// One planned reminder: fire at `fire_at` for `task_id`, once per offset label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderJob {
    pub session: String,
    pub task_id: TaskId,
    pub offset_label: String,
    pub fire_at: DateTime<Utc>,
    pub state: JobState,
}

// Fixed-width UTC text sorts in time order.
fn encode_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| TaskPilotError::Store(format!("bad fire_at '{raw}': {e}")))
}

impl Store {
    /// Record a planned reminder. Returns `false` when a job with the same
    /// (session, task, offset) already exists, in any state.
    pub fn insert_job(&self, job: &ReminderJob) -> Result<bool> {
        let db = self.db();
        let rows = db
            .execute(
                "INSERT OR IGNORE INTO reminder_jobs
                    (session, task_id, offset_label, fire_at, state, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    job.session,
                    job.task_id,
                    job.offset_label,
                    encode_time(&job.fire_at),
                    job.state.as_str(),
                    encode_time(&Utc::now()),
                ],
            )
            .map_err(store_err)?;
        Ok(rows > 0)
    }

    /// Move a pending job to `fired`. Only the first claim succeeds, and only
    /// for the fire time the job is currently planned at.
    pub fn claim_job(
        &self,
        session: &str,
        task_id: &str,
        offset_label: &str,
        fire_at: &DateTime<Utc>,
    ) -> Result<bool> {
        self.transition(session, task_id, offset_label, fire_at, JobState::Fired)
    }

    /// Move a pending job to `skipped`.
    pub fn skip_job(
        &self,
        session: &str,
        task_id: &str,
        offset_label: &str,
        fire_at: &DateTime<Utc>,
    ) -> Result<bool> {
        self.transition(session, task_id, offset_label, fire_at, JobState::Skipped)
    }

    fn transition(
        &self,
        session: &str,
        task_id: &str,
        offset_label: &str,
        fire_at: &DateTime<Utc>,
        to: JobState,
    ) -> Result<bool> {
        let db = self.db();
        let rows = db
            .execute(
                "UPDATE reminder_jobs SET state = ?5
                 WHERE session = ?1 AND task_id = ?2 AND offset_label = ?3 AND fire_at = ?4
                   AND state = 'pending'",
                rusqlite::params![session, task_id, offset_label, encode_time(fire_at), to.as_str()],
            )
            .map_err(store_err)?;
        Ok(rows > 0)
    }

    /// Drop every job of a task, whatever its state. Returns the number removed.
    pub fn delete_jobs_for_task(&self, session: &str, task_id: &str) -> Result<usize> {
        let db = self.db();
        db.execute(
            "DELETE FROM reminder_jobs WHERE session = ?1 AND task_id = ?2",
            rusqlite::params![session, task_id],
        )
        .map_err(store_err)
    }

    /// Drop fired and skipped jobs of a session. Returns the number removed.
    pub fn prune_finished_jobs(&self, session: &str) -> Result<usize> {
        let db = self.db();
        db.execute(
            "DELETE FROM reminder_jobs WHERE session = ?1 AND state != 'pending'",
            rusqlite::params![session],
        )
        .map_err(store_err)
    }

    /// Pending jobs of a session, earliest first.
    pub fn pending_jobs(&self, session: &str) -> Result<Vec<ReminderJob>> {
        let db = self.db();
        let mut stmt = db
            .prepare(
                "SELECT session, task_id, offset_label, fire_at, state FROM reminder_jobs
                 WHERE session = ?1 AND state = 'pending'
                 ORDER BY fire_at, offset_label",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(rusqlite::params![session], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(store_err)?;

        let mut jobs = Vec::new();
        for row in rows {
            let (session, task_id, offset_label, fire_at, state) = row.map_err(store_err)?;
            jobs.push(ReminderJob {
                session,
                task_id,
                offset_label,
                fire_at: decode_time(&fire_at)?,
                state: state.parse()?,
            });
        }
        Ok(jobs)
    }

    /// Sessions that still have at least one pending job.
    pub fn sessions_with_pending_jobs(&self) -> Result<Vec<String>> {
        let db = self.db();
        let mut stmt = db
            .prepare("SELECT DISTINCT session FROM reminder_jobs WHERE state = 'pending' ORDER BY session")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(store_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(store_err)
    }
}
