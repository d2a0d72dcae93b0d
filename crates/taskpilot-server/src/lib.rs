//! # taskpilot-server
//!
//! HTTP/WebSocket API for the TaskPilot agent:
//!
//! - REST API for chat, task CRUD, analytics and user registration
//! - WebSocket endpoint carrying the live client frames
//!
//! Every request is routed to a per-session agent. HTTP clients pick the
//! session with the `x-session-id` header, WebSocket clients with the
//! `?session=` query parameter; both fall back to the default session.

use axum::{
    Router,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

use taskpilot_core::{
    Analytics, ChatMessage, Priority, SearchCriteria, Task, TaskDraft, TaskPilotError, TaskStatus,
    TaskUpdate, User, UserDraft, UserId,
};
use taskpilot_runtime::{AgentHandle, ChannelConnection, Connection, SessionRegistry};

/// Header that selects the session for HTTP requests.
pub const SESSION_HEADER: &str = "x-session-id";

/// Shared server state.
pub struct AppState {
    pub registry: SessionRegistry,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (status, Json(json!({ "error": message.to_string() })))
}

fn internal_error(error: TaskPilotError) -> ApiError {
    warn!(error = %error, "request failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, error)
}

/// Chat request body.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    message: String,
    user_id: Option<UserId>,
}

#[derive(Serialize)]
struct ChatResponse {
    message: ChatMessage,
}

/// Query params for task listing. `tags` is a comma-separated list.
#[derive(Deserialize, Default)]
#[serde(default)]
struct TaskQuery {
    status: Option<String>,
    priority: Option<String>,
    tags: Option<String>,
    search: Option<String>,
}

impl TaskQuery {
    fn into_criteria(self) -> Result<SearchCriteria, ApiError> {
        let status = self
            .status
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<TaskStatus>())
            .transpose()
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
        let priority = self
            .priority
            .filter(|p| !p.is_empty())
            .map(|p| p.parse::<Priority>())
            .transpose()
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
        let tags = self
            .tags
            .map(|t| {
                t.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(SearchCriteria {
            status,
            priority,
            tags,
            search: self.search.filter(|s| !s.is_empty()),
        })
    }
}

#[derive(Serialize)]
struct TaskListResponse {
    tasks: Vec<Task>,
    total: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteResponse {
    success: bool,
    task_id: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WsParams {
    session: Option<String>,
}

/// Build the Axum router.
pub fn build_router(registry: SessionRegistry) -> Router {
    let state = Arc::new(AppState { registry });

    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/tasks", get(list_tasks_handler).post(create_task_handler))
        .route(
            "/api/tasks/{id}",
            get(get_task_handler)
                .patch(update_task_handler)
                .delete(delete_task_handler),
        )
        .route("/api/analytics", get(analytics_handler))
        .route("/api/users", post(register_user_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Resolve the agent for a session name, rejecting malformed names with 400.
async fn agent_for(state: &AppState, session: Option<&str>) -> Result<AgentHandle, ApiError> {
    if let Some(name) = session.map(str::trim).filter(|s| !s.is_empty()) {
        SessionRegistry::validate_name(name).map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    }
    state.registry.get(session).await.map_err(internal_error)
}

async fn agent_from_headers(state: &AppState, headers: &HeaderMap) -> Result<AgentHandle, ApiError> {
    let session = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok());
    agent_for(state, session).await
}

fn not_found(id: &str) -> ApiError {
    api_error(
        StatusCode::NOT_FOUND,
        TaskPilotError::TaskNotFound(id.to_string()),
    )
}

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if req.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "message must not be empty"));
    }
    let agent = agent_from_headers(&state, &headers).await?;
    let message = agent
        .chat(req.user_id, req.message)
        .await
        .map_err(internal_error)?;
    Ok(Json(ChatResponse { message }))
}

async fn list_tasks_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<TaskQuery>,
) -> Result<Json<TaskListResponse>, ApiError> {
    let criteria = query.into_criteria()?;
    let agent = agent_from_headers(&state, &headers).await?;
    let tasks = agent.list_tasks(criteria).await.map_err(internal_error)?;
    Ok(Json(TaskListResponse {
        total: tasks.len(),
        tasks,
    }))
}

async fn create_task_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(draft): Json<TaskDraft>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let agent = agent_from_headers(&state, &headers).await?;
    let task = agent.create_task(draft).await.map_err(internal_error)?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let agent = agent_from_headers(&state, &headers).await?;
    agent
        .get_task(id.clone())
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

async fn update_task_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(update): Json<TaskUpdate>,
) -> Result<Json<Task>, ApiError> {
    let agent = agent_from_headers(&state, &headers).await?;
    agent
        .update_task(id.clone(), update)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

async fn delete_task_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let agent = agent_from_headers(&state, &headers).await?;
    if agent.delete_task(id.clone()).await.map_err(internal_error)? {
        Ok(Json(DeleteResponse {
            success: true,
            task_id: id,
        }))
    } else {
        Err(not_found(&id))
    }
}

async fn analytics_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Analytics>, ApiError> {
    let agent = agent_from_headers(&state, &headers).await?;
    Ok(Json(agent.analytics().await.map_err(internal_error)?))
}

async fn register_user_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(draft): Json<UserDraft>,
) -> Result<Json<User>, ApiError> {
    let agent = agent_from_headers(&state, &headers).await?;
    Ok(Json(agent.register_user(draft).await.map_err(internal_error)?))
}

// ── WebSocket ──────────────────────────────────────────────────

async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    match agent_for(&state, params.session.as_deref()).await {
        Ok(agent) => ws.on_upgrade(move |socket| handle_socket(agent, socket)),
        Err(e) => e.into_response(),
    }
}

/// Pump frames between one socket and its session's agent until either side closes.
async fn handle_socket(agent: AgentHandle, mut socket: WebSocket) {
    let (connection, mut outgoing) = ChannelConnection::new();
    let id = connection.id();
    if let Err(e) = agent.connect(Arc::new(connection)).await {
        warn!(error = %e, "failed to attach websocket");
        return;
    }
    debug!(session = agent.session(), connection = %id, "websocket connected");

    loop {
        tokio::select! {
            frame = outgoing.recv() => {
                match frame {
                    Some(text) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if agent.frame(id, text.as_str()).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    if let Err(e) = agent.disconnect(id).await {
        debug!(error = %e, "agent gone before disconnect");
    }
    debug!(session = agent.session(), connection = %id, "websocket closed");
}

/// Start the HTTP server. Runs until the listener fails.
pub async fn start_server(listen: &str, registry: SessionRegistry) -> taskpilot_core::Result<()> {
    info!(listen = %listen, "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| TaskPilotError::Config(format!("failed to bind {}: {}", listen, e)))?;

    axum::serve(listener, build_router(registry)).await?;

    Ok(())
}
