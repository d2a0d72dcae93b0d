//! # Reminder Scheduler
//!
//! Plans one reminder per lead-time offset before a task's due date and arms
//! a timer for each. A firing timer does not touch state itself: it sends a
//! [`ReminderFire`] back into the agent loop, which decides whether the
//! reminder still applies.
//!
//! With durability on, every planned reminder is also a row in the store's
//! job table, so pending reminders are re-armed after a restart and a job
//! can be claimed only once. A firing is matched on its planned fire time
//! as well as its task and offset, so a timer left over from before a
//! reschedule cannot consume the replacement.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use taskpilot_core::{Task, TaskId};
use taskpilot_store::{JobState, ReminderJob, Store};

/// Emitted when a reminder timer elapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderFire {
    pub task_id: TaskId,
    pub offset_label: String,
    pub fire_at: DateTime<Utc>,
}

/// A reminder computed from a due date, before it is armed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedReminder {
    pub offset_label: String,
    pub fire_at: DateTime<Utc>,
}

pub fn offset_label(hours: u32) -> String {
    format!("{hours}h_before")
}

/// Reminders for `due` at each offset, keeping only fire times strictly after `now`.
pub fn plan(due: DateTime<Utc>, offsets_hours: &[u32], now: DateTime<Utc>) -> Vec<PlannedReminder> {
    offsets_hours
        .iter()
        .map(|&h| PlannedReminder {
            offset_label: offset_label(h),
            fire_at: due - Duration::hours(i64::from(h)),
        })
        .filter(|r| r.fire_at > now)
        .collect()
}

type TimerKey = (TaskId, String);

struct ArmedTimer {
    fire_at: DateTime<Utc>,
    handle: AbortHandle,
}

pub struct ReminderScheduler {
    session: String,
    /// Job table; `None` keeps reminders in memory only.
    store: Option<Store>,
    timers: HashMap<TimerKey, ArmedTimer>,
    fire_tx: mpsc::Sender<ReminderFire>,
}

impl ReminderScheduler {
    /// Create a scheduler and the receiver its timers deliver to.
    pub fn new(session: impl Into<String>, store: Option<Store>) -> (Self, mpsc::Receiver<ReminderFire>) {
        let (fire_tx, fire_rx) = mpsc::channel(64);
        let scheduler = Self {
            session: session.into(),
            store,
            timers: HashMap::new(),
            fire_tx,
        };
        (scheduler, fire_rx)
    }

    /// Number of armed timers.
    pub fn armed(&self) -> usize {
        self.timers.len()
    }

    pub fn is_armed(&self, task_id: &str, offset_label: &str) -> bool {
        self.timers
            .contains_key(&(task_id.to_string(), offset_label.to_string()))
    }

    /// Plan and arm reminders for `task`. Returns how many timers were armed.
    pub fn schedule(&mut self, task: &Task, offsets_hours: &[u32], now: DateTime<Utc>) -> usize {
        let Some(due) = task.due_date else {
            return 0;
        };

        let mut armed = 0;
        for reminder in plan(due, offsets_hours, now) {
            let key = (task.id.clone(), reminder.offset_label.clone());
            if self.timers.contains_key(&key) {
                continue;
            }
            if let Some(store) = &self.store {
                let job = ReminderJob {
                    session: self.session.clone(),
                    task_id: task.id.clone(),
                    offset_label: reminder.offset_label.clone(),
                    fire_at: reminder.fire_at,
                    state: JobState::Pending,
                };
                match store.insert_job(&job) {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(task_id = %task.id, offset = %reminder.offset_label, "reminder already planned");
                        continue;
                    }
                    Err(e) => warn!(task_id = %task.id, error = %e, "failed to persist reminder job"),
                }
            }
            self.arm(key, reminder.fire_at, now);
            armed += 1;
        }

        if armed > 0 {
            info!(session = %self.session, task_id = %task.id, armed, "reminders scheduled");
        }
        armed
    }

    /// Drop every timer and job of a task.
    pub fn cancel(&mut self, task_id: &str) -> usize {
        let keys: Vec<TimerKey> = self
            .timers
            .keys()
            .filter(|(id, _)| id == task_id)
            .cloned()
            .collect();
        for key in &keys {
            if let Some(timer) = self.timers.remove(key) {
                timer.handle.abort();
            }
        }
        if let Some(store) = &self.store
            && let Err(e) = store.delete_jobs_for_task(&self.session, task_id)
        {
            warn!(task_id, error = %e, "failed to delete reminder jobs");
        }
        if !keys.is_empty() {
            debug!(task_id, cancelled = keys.len(), "reminders cancelled");
        }
        keys.len()
    }

    /// Replace a task's reminders with ones planned from its current due date.
    pub fn reschedule(&mut self, task: &Task, offsets_hours: &[u32], now: DateTime<Utc>) -> usize {
        self.cancel(&task.id);
        self.schedule(task, offsets_hours, now)
    }

    /// Re-arm pending jobs from the store. Jobs whose time passed while the
    /// process was down are marked skipped. Returns how many were re-armed.
    pub fn restore(&mut self, now: DateTime<Utc>) -> usize {
        let Some(store) = self.store.clone() else {
            return 0;
        };
        let jobs = match store.pending_jobs(&self.session) {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(session = %self.session, error = %e, "failed to load reminder jobs");
                return 0;
            }
        };

        let mut rearmed = 0;
        let mut skipped = 0;
        for job in jobs {
            if job.fire_at > now {
                self.arm((job.task_id, job.offset_label), job.fire_at, now);
                rearmed += 1;
            } else {
                if let Err(e) =
                    store.skip_job(&self.session, &job.task_id, &job.offset_label, &job.fire_at)
                {
                    warn!(task_id = %job.task_id, error = %e, "failed to skip missed reminder");
                }
                skipped += 1;
            }
        }
        if rearmed + skipped > 0 {
            info!(session = %self.session, rearmed, skipped, "reminder jobs restored");
        }
        self.prune(&store);
        rearmed
    }

    /// Take ownership of a firing. `false` means the reminder was cancelled,
    /// rescheduled or already delivered and must be dropped.
    pub fn claim(&mut self, fire: &ReminderFire) -> bool {
        let key = (fire.task_id.clone(), fire.offset_label.clone());
        let was_armed = match self.timers.get(&key) {
            Some(timer) if timer.fire_at == fire.fire_at => {
                self.timers.remove(&key);
                true
            }
            _ => false,
        };
        let Some(store) = self.store.clone() else {
            return was_armed;
        };
        match store.claim_job(&self.session, &fire.task_id, &fire.offset_label, &fire.fire_at) {
            Ok(true) => {
                self.prune(&store);
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!(task_id = %fire.task_id, error = %e, "failed to claim reminder job");
                was_armed
            }
        }
    }

    /// Remove fired and skipped rows so the job table only holds pending work.
    fn prune(&self, store: &Store) {
        match store.prune_finished_jobs(&self.session) {
            Ok(0) => {}
            Ok(pruned) => debug!(session = %self.session, pruned, "finished reminder jobs pruned"),
            Err(e) => warn!(session = %self.session, error = %e, "failed to prune reminder jobs"),
        }
    }

    fn arm(&mut self, key: TimerKey, fire_at: DateTime<Utc>, now: DateTime<Utc>) {
        let delay = (fire_at - now).to_std().unwrap_or_default();
        let tx = self.fire_tx.clone();
        let fire = ReminderFire {
            task_id: key.0.clone(),
            offset_label: key.1.clone(),
            fire_at,
        };
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(fire).await.is_err() {
                debug!("agent loop gone, dropping reminder");
            }
        });
        let timer = ArmedTimer {
            fire_at,
            handle: handle.abort_handle(),
        };
        if let Some(old) = self.timers.insert(key, timer) {
            old.handle.abort();
        }
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        for timer in self.timers.values() {
            timer.handle.abort();
        }
    }
}
