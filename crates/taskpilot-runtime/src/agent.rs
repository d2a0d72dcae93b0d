//! # Agent Loop
//!
//! One [`AgentLoop`] owns one session's [`AgentState`] and is the only code
//! that mutates it. It runs as an actor: chat turns, structured requests,
//! connection events and reminder firings all arrive as messages and are
//! processed one at a time, so chat history order is arrival order and a
//! reminder never lands in the middle of a chat turn.
//!
//! Every state change follows the same sequence: mutate, snapshot to the
//! store, then broadcast. A failed snapshot write is logged and the turn
//! still completes.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use taskpilot_config::TaskPilotConfig;
use taskpilot_core::{
    ANONYMOUS_USER_ID, ActionKind, AgentState, Analytics, ChatMessage, ClientFrame,
    MessageMetadata, Preferences, Result, SearchCriteria, ServerEvent, Task, TaskDraft, TaskId,
    TaskPilotError, TaskStatus, TaskUpdate, User, UserDraft, UserId,
};
use taskpilot_store::Store;

use crate::extractor::Extractor;
use crate::hub::{BroadcastHub, Connection, ConnectionId};
use crate::intent::{Intent, criteria_from_message, update_from_message};
use crate::scheduler::{ReminderFire, ReminderScheduler};
use crate::task_store::TaskStore;

const COMMAND_BUFFER: usize = 64;

/// Per-session tuning, usually derived from the config file.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Most recently updated tasks embedded in the inference prompt.
    pub context_task_limit: usize,
    /// Only tasks updated within this window count as context.
    pub context_window: Duration,
    pub snapshot_history_len: usize,
    pub extraction_history_len: usize,
    pub durable_reminders: bool,
    /// Preferences for a session with no saved snapshot.
    pub preferences: Preferences,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            context_task_limit: 10,
            context_window: Duration::days(7),
            snapshot_history_len: 20,
            extraction_history_len: 5,
            durable_reminders: true,
            preferences: Preferences::default(),
        }
    }
}

impl AgentSettings {
    pub fn from_config(config: &TaskPilotConfig) -> Self {
        Self {
            context_task_limit: config.agent.context_task_limit,
            context_window: Duration::days(config.agent.context_window_days),
            snapshot_history_len: config.agent.snapshot_history_len,
            extraction_history_len: config.agent.extraction_history_len,
            durable_reminders: config.reminders.durable,
            preferences: config.initial_preferences(),
        }
    }
}

/// Messages accepted by a running agent. Requests carry a oneshot for the reply.
pub enum AgentCommand {
    Chat {
        user_id: Option<UserId>,
        content: String,
        reply: oneshot::Sender<ChatMessage>,
    },
    Connect {
        connection: Arc<dyn Connection>,
        reply: oneshot::Sender<()>,
    },
    Disconnect {
        id: ConnectionId,
    },
    /// A raw text frame received on a live connection.
    Frame {
        connection: ConnectionId,
        raw: String,
    },
    CreateTask {
        draft: TaskDraft,
        reply: oneshot::Sender<Task>,
    },
    GetTask {
        id: TaskId,
        reply: oneshot::Sender<Option<Task>>,
    },
    ListTasks {
        criteria: SearchCriteria,
        reply: oneshot::Sender<Vec<Task>>,
    },
    UpdateTask {
        id: TaskId,
        update: TaskUpdate,
        reply: oneshot::Sender<Option<Task>>,
    },
    DeleteTask {
        id: TaskId,
        reply: oneshot::Sender<bool>,
    },
    Analytics {
        reply: oneshot::Sender<Analytics>,
    },
    RegisterUser {
        draft: UserDraft,
        reply: oneshot::Sender<User>,
    },
    State {
        reply: oneshot::Sender<AgentState>,
    },
}

pub struct AgentLoop {
    session: String,
    state: AgentState,
    store: Store,
    extractor: Arc<Extractor>,
    scheduler: ReminderScheduler,
    hub: BroadcastHub,
    settings: AgentSettings,
}

impl AgentLoop {
    /// Load the session's snapshot, or start empty when none exists.
    /// Returns the loop and the receiver its reminder timers fire into.
    pub fn new(
        session: impl Into<String>,
        store: Store,
        extractor: Arc<Extractor>,
        settings: AgentSettings,
    ) -> Result<(Self, mpsc::Receiver<ReminderFire>)> {
        let session = session.into();
        let state = match store.load_state(&session)? {
            Some(state) => {
                info!(
                    session = %session,
                    tasks = state.tasks.len(),
                    messages = state.chat_history.len(),
                    "restored agent state"
                );
                state
            }
            None => {
                debug!(session = %session, "no snapshot, starting with empty state");
                AgentState::with_preferences(settings.preferences.clone())
            }
        };

        let job_store = settings.durable_reminders.then(|| store.clone());
        let (scheduler, fires) = ReminderScheduler::new(session.clone(), job_store);

        let agent = Self {
            session,
            state,
            store,
            extractor,
            scheduler,
            hub: BroadcastHub::new(),
            settings,
        };
        Ok((agent, fires))
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    /// Re-arm reminder jobs left pending by a previous run.
    pub fn restore_reminders(&mut self) -> usize {
        self.scheduler.restore(Utc::now())
    }

    // ── Chat ───────────────────────────────────────────────────

    /// Run one chat turn and return the agent's reply.
    ///
    /// The user message and the reply are both recorded even when inference
    /// fails; the failure only degrades the reply to the canned text.
    pub async fn process_message(&mut self, user_id: Option<&str>, content: &str) -> ChatMessage {
        let user_id = user_id
            .filter(|u| !u.is_empty())
            .unwrap_or(ANONYMOUS_USER_ID)
            .to_string();
        let now = Utc::now();

        let user_message = ChatMessage::user(user_id.clone(), content);
        self.state
            .active_conversations
            .insert(user_id.clone(), user_message.id.clone());
        self.state.chat_history.push(user_message);

        let context = self.state.tasks.recent(
            self.settings.context_task_limit,
            self.settings.context_window,
            now,
        );
        let extractor = Arc::clone(&self.extractor);
        let inference = extractor.infer(&user_id, content, &context, now).await;

        let metadata = MessageMetadata {
            task_id: inference
                .intent
                .as_ref()
                .and_then(|i| i.target_task_id.clone()),
            action: inference.intent.as_ref().map(|i| i.kind),
            reminder: None,
            confidence: Some(inference.confidence),
        };
        let reply = ChatMessage::agent(user_id.clone(), inference.reply, Some(metadata));
        self.state.chat_history.push(reply.clone());

        let event = match &inference.intent {
            Some(intent) => self.dispatch(&user_id, content, intent, now).await,
            None => None,
        };

        self.persist();
        if let Some(event) = event {
            self.hub.broadcast(&event);
        }
        self.hub.broadcast(&ServerEvent::NewMessage {
            message: reply.clone(),
        });
        info!(
            session = %self.session,
            user_id = %user_id,
            action = ?inference.intent.as_ref().map(|i| i.kind),
            degraded = inference.degraded,
            "chat turn processed"
        );
        reply
    }

    /// Apply the action an intent names. Returns the event to broadcast once
    /// the turn is persisted.
    async fn dispatch(
        &mut self,
        user_id: &str,
        content: &str,
        intent: &Intent,
        now: DateTime<Utc>,
    ) -> Option<ServerEvent> {
        match intent.kind {
            ActionKind::CreateTask => {
                let history: Vec<String> = self
                    .state
                    .recent_messages_from(user_id, self.settings.extraction_history_len)
                    .into_iter()
                    .map(|m| m.content.clone())
                    .collect();
                let extractor = Arc::clone(&self.extractor);
                let Some(draft) = extractor.extract_task(&history).await else {
                    info!(user_id, "no task extracted from chat");
                    return None;
                };
                let task = self.insert_task(draft, now);
                info!(task_id = %task.id, title = %task.title, "task created from chat");
                Some(ServerEvent::TaskCreated { task })
            }
            ActionKind::UpdateTask => {
                let Some(id) = intent.target_task_id.as_deref() else {
                    debug!("update requested without a target task");
                    return None;
                };
                let update = update_from_message(content);
                if update.is_empty() {
                    debug!(task_id = id, "update requested with no recognizable changes");
                    return None;
                }
                let Some(task) = self.apply_update(id, update, now) else {
                    info!(task_id = id, "update target not found");
                    return None;
                };
                Some(ServerEvent::TaskUpdated { task: Some(task) })
            }
            ActionKind::DeleteTask => {
                let Some(id) = intent.target_task_id.as_deref() else {
                    debug!("delete requested without a target task");
                    return None;
                };
                if !self.remove_task(id) {
                    info!(task_id = id, "delete target not found");
                    return None;
                }
                Some(ServerEvent::TaskDeleted {
                    task_id: id.to_string(),
                    success: None,
                })
            }
            ActionKind::SearchTasks => {
                let criteria = criteria_from_message(content);
                let found = self.state.tasks.search(&criteria);
                info!(count = found.len(), "task search from chat");
                None
            }
            ActionKind::SetReminder => {
                let Some(task) = intent
                    .target_task_id
                    .as_deref()
                    .and_then(|id| self.state.tasks.get(id))
                    .cloned()
                else {
                    debug!("reminder requested without a known target task");
                    return None;
                };
                let offsets = self.state.preferences.reminder_intervals.clone();
                let armed = self.scheduler.schedule(&task, &offsets, now);
                info!(task_id = %task.id, armed, "reminders requested from chat");
                None
            }
        }
    }

    // ── Task operations ────────────────────────────────────────

    fn insert_task(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> Task {
        let task = self.state.tasks.create(draft, now);
        let offsets = self.state.preferences.reminder_intervals.clone();
        self.scheduler.schedule(&task, &offsets, now);
        task
    }

    fn apply_update(&mut self, id: &str, update: TaskUpdate, now: DateTime<Utc>) -> Option<Task> {
        let previous_due = self.state.tasks.get(id)?.due_date;
        let due_changed = update.due_date.is_some() && update.due_date != previous_due;

        let task = self.state.tasks.update(id, update, now)?;
        if due_changed {
            let offsets = self.state.preferences.reminder_intervals.clone();
            self.scheduler.reschedule(&task, &offsets, now);
        }
        Some(task)
    }

    fn remove_task(&mut self, id: &str) -> bool {
        let removed = self.state.tasks.delete(id);
        if removed {
            self.scheduler.cancel(id);
        }
        removed
    }

    pub fn create_task(&mut self, draft: TaskDraft) -> Task {
        let task = self.insert_task(draft, Utc::now());
        self.persist();
        self.hub.broadcast(&ServerEvent::TaskCreated { task: task.clone() });
        task
    }

    pub fn get_task(&self, id: &str) -> Option<Task> {
        self.state.tasks.get(id).cloned()
    }

    pub fn list_tasks(&self, criteria: &SearchCriteria) -> Vec<Task> {
        self.state.tasks.search(criteria)
    }

    /// `None` when the id is unknown; nothing is persisted or broadcast then.
    pub fn update_task(&mut self, id: &str, update: TaskUpdate) -> Option<Task> {
        let task = self.apply_update(id, update, Utc::now())?;
        self.persist();
        self.hub.broadcast(&ServerEvent::TaskUpdated {
            task: Some(task.clone()),
        });
        Some(task)
    }

    pub fn delete_task(&mut self, id: &str) -> bool {
        if !self.remove_task(id) {
            return false;
        }
        self.persist();
        self.hub.broadcast(&ServerEvent::TaskDeleted {
            task_id: id.to_string(),
            success: None,
        });
        true
    }

    pub fn analytics(&self) -> Analytics {
        Analytics::compute(&self.state.tasks, Utc::now())
    }

    /// Register a user. A draft naming an existing id returns that user unchanged.
    pub fn register_user(&mut self, draft: UserDraft) -> User {
        if let Some(existing) = draft
            .id
            .as_deref()
            .and_then(|id| self.state.users.iter().find(|u| u.id == id))
        {
            return existing.clone();
        }
        let user = draft.into_user();
        self.state.users.push(user.clone());
        self.persist();
        info!(session = %self.session, user_id = %user.id, "user registered");
        user
    }

    // ── Connections ────────────────────────────────────────────

    /// Register a live connection and send it the resync snapshot.
    pub fn connect(&mut self, connection: Arc<dyn Connection>) {
        let id = connection.id();
        self.hub.register(connection);
        let snapshot = ServerEvent::ConnectionEstablished {
            recent_messages: self
                .state
                .recent_messages(self.settings.snapshot_history_len)
                .to_vec(),
            task_count: self.state.tasks.len(),
        };
        self.hub.send_to(id, &snapshot);
    }

    pub fn disconnect(&mut self, id: ConnectionId) {
        self.hub.unregister(id);
    }

    /// Handle a structured request from a live connection.
    ///
    /// The reply goes to the originating connection only. State changes are
    /// also pushed to every other connection.
    pub async fn handle_frame(&mut self, connection: ConnectionId, raw: &str) {
        let frame = match ClientFrame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(connection = %connection, error = %e, "rejected client frame");
                self.hub
                    .send_to(connection, &ServerEvent::error(format!("Failed to process message: {e}")));
                return;
            }
        };

        let now = Utc::now();
        let reply = match frame {
            ClientFrame::ChatMessage { user_id, content } => {
                let message = self.process_message(user_id.as_deref(), &content).await;
                ServerEvent::MessageResponse { message }
            }
            ClientFrame::GetTasks { criteria } => ServerEvent::TasksList {
                tasks: self.state.tasks.search(&criteria),
            },
            ClientFrame::CreateTask { task_data } => {
                let task = self.insert_task(task_data, now);
                self.persist();
                self.hub.broadcast_except(
                    &ServerEvent::TaskCreated { task: task.clone() },
                    connection,
                );
                ServerEvent::TaskCreated { task }
            }
            ClientFrame::UpdateTask { task_id, updates } => {
                let task = self.apply_update(&task_id, updates, now);
                if task.is_some() {
                    self.persist();
                    self.hub.broadcast_except(
                        &ServerEvent::TaskUpdated { task: task.clone() },
                        connection,
                    );
                }
                ServerEvent::TaskUpdated { task }
            }
            ClientFrame::DeleteTask { task_id } => {
                let deleted = self.remove_task(&task_id);
                if deleted {
                    self.persist();
                    self.hub.broadcast_except(
                        &ServerEvent::TaskDeleted {
                            task_id: task_id.clone(),
                            success: None,
                        },
                        connection,
                    );
                }
                ServerEvent::TaskDeleted {
                    task_id,
                    success: Some(deleted),
                }
            }
        };
        self.hub.send_to(connection, &reply);
    }

    // ── Reminders ──────────────────────────────────────────────

    /// Deliver a fired reminder. Returns whether a reminder message was sent;
    /// cancelled, duplicate, deleted-task and completed-task firings are no-ops.
    pub fn send_reminder(&mut self, fire: &ReminderFire) -> bool {
        if !self.scheduler.claim(fire) {
            debug!(task_id = %fire.task_id, offset = %fire.offset_label, "reminder already handled");
            return false;
        }
        let Some(task) = self.state.tasks.get(&fire.task_id).cloned() else {
            debug!(task_id = %fire.task_id, "reminder for deleted task");
            return false;
        };
        if task.status == TaskStatus::Completed {
            debug!(task_id = %task.id, "reminder for completed task");
            return false;
        }

        let due = task
            .due_date
            .map(|d| d.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "soon".to_string());
        let message = ChatMessage::system(
            format!("Reminder: \"{}\" is due {}", task.title, due),
            Some(MessageMetadata {
                task_id: Some(task.id.clone()),
                reminder: Some(fire.offset_label.clone()),
                ..Default::default()
            }),
        );
        self.state.chat_history.push(message.clone());
        self.persist();
        self.hub.broadcast(&ServerEvent::Reminder { message, task });
        info!(task_id = %fire.task_id, offset = %fire.offset_label, "reminder sent");
        true
    }

    fn persist(&self) {
        if let Err(e) = self.store.save_state(&self.session, &self.state) {
            warn!(session = %self.session, error = %e, "failed to persist agent state");
        }
    }

    // ── Actor ──────────────────────────────────────────────────

    async fn handle_command(&mut self, command: AgentCommand) {
        match command {
            AgentCommand::Chat {
                user_id,
                content,
                reply,
            } => {
                let message = self.process_message(user_id.as_deref(), &content).await;
                let _ = reply.send(message);
            }
            AgentCommand::Connect { connection, reply } => {
                self.connect(connection);
                let _ = reply.send(());
            }
            AgentCommand::Disconnect { id } => self.disconnect(id),
            AgentCommand::Frame { connection, raw } => self.handle_frame(connection, &raw).await,
            AgentCommand::CreateTask { draft, reply } => {
                let _ = reply.send(self.create_task(draft));
            }
            AgentCommand::GetTask { id, reply } => {
                let _ = reply.send(self.get_task(&id));
            }
            AgentCommand::ListTasks { criteria, reply } => {
                let _ = reply.send(self.list_tasks(&criteria));
            }
            AgentCommand::UpdateTask { id, update, reply } => {
                let _ = reply.send(self.update_task(&id, update));
            }
            AgentCommand::DeleteTask { id, reply } => {
                let _ = reply.send(self.delete_task(&id));
            }
            AgentCommand::Analytics { reply } => {
                let _ = reply.send(self.analytics());
            }
            AgentCommand::RegisterUser { draft, reply } => {
                let _ = reply.send(self.register_user(draft));
            }
            AgentCommand::State { reply } => {
                let _ = reply.send(self.state.clone());
            }
        }
    }

    /// Process commands and reminder firings until every handle is dropped.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<AgentCommand>,
        mut fires: mpsc::Receiver<ReminderFire>,
    ) {
        info!(session = %self.session, "agent loop started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(fire) = fires.recv() => {
                    self.send_reminder(&fire);
                }
            }
        }
        info!(session = %self.session, "agent loop stopped");
    }

    /// Restore pending reminders and run the loop on a background task.
    pub fn spawn(mut self, fires: mpsc::Receiver<ReminderFire>) -> AgentHandle {
        self.restore_reminders();
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = AgentHandle {
            session: self.session.clone(),
            tx,
        };
        tokio::spawn(self.run(rx, fires));
        handle
    }
}

/// Cloneable address of a running [`AgentLoop`].
#[derive(Clone)]
pub struct AgentHandle {
    session: String,
    tx: mpsc::Sender<AgentCommand>,
}

impl AgentHandle {
    pub fn session(&self) -> &str {
        &self.session
    }

    fn gone(&self) -> TaskPilotError {
        TaskPilotError::Session(format!("agent for session '{}' is not running", self.session))
    }

    async fn send(&self, command: AgentCommand) -> Result<()> {
        self.tx.send(command).await.map_err(|_| self.gone())
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> AgentCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(command(reply)).await?;
        rx.await.map_err(|_| self.gone())
    }

    pub async fn chat(&self, user_id: Option<String>, content: impl Into<String>) -> Result<ChatMessage> {
        let content = content.into();
        self.request(|reply| AgentCommand::Chat {
            user_id,
            content,
            reply,
        })
        .await
    }

    /// Register a connection; resolves once its snapshot frame was queued.
    pub async fn connect(&self, connection: Arc<dyn Connection>) -> Result<()> {
        self.request(|reply| AgentCommand::Connect { connection, reply })
            .await
    }

    pub async fn disconnect(&self, id: ConnectionId) -> Result<()> {
        self.send(AgentCommand::Disconnect { id }).await
    }

    pub async fn frame(&self, connection: ConnectionId, raw: impl Into<String>) -> Result<()> {
        self.send(AgentCommand::Frame {
            connection,
            raw: raw.into(),
        })
        .await
    }

    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task> {
        self.request(|reply| AgentCommand::CreateTask { draft, reply })
            .await
    }

    pub async fn get_task(&self, id: impl Into<TaskId>) -> Result<Option<Task>> {
        let id = id.into();
        self.request(|reply| AgentCommand::GetTask { id, reply }).await
    }

    pub async fn list_tasks(&self, criteria: SearchCriteria) -> Result<Vec<Task>> {
        self.request(|reply| AgentCommand::ListTasks { criteria, reply })
            .await
    }

    pub async fn update_task(&self, id: impl Into<TaskId>, update: TaskUpdate) -> Result<Option<Task>> {
        let id = id.into();
        self.request(|reply| AgentCommand::UpdateTask { id, update, reply })
            .await
    }

    pub async fn delete_task(&self, id: impl Into<TaskId>) -> Result<bool> {
        let id = id.into();
        self.request(|reply| AgentCommand::DeleteTask { id, reply })
            .await
    }

    pub async fn analytics(&self) -> Result<Analytics> {
        self.request(|reply| AgentCommand::Analytics { reply }).await
    }

    pub async fn register_user(&self, draft: UserDraft) -> Result<User> {
        self.request(|reply| AgentCommand::RegisterUser { draft, reply })
            .await
    }

    /// A copy of the current state.
    pub async fn state(&self) -> Result<AgentState> {
        self.request(|reply| AgentCommand::State { reply }).await
    }
}
