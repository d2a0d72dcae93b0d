//! HTTP API integration tests: exercise every endpoint with a mock inference provider.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tower::ServiceExt;

use taskpilot_llm::ModelRouter;
use taskpilot_llm::mock::MockProvider;
use taskpilot_runtime::{AgentSettings, Extractor, InferenceClient, InferenceSettings, SessionRegistry};
use taskpilot_store::Store;

fn registry(responses: Vec<&str>) -> SessionRegistry {
    let mut mock = MockProvider::new("mock");
    for r in responses {
        mock = mock.with_response(r);
    }
    let mut router = ModelRouter::new().with_base_delay(Duration::from_millis(1));
    router.add_provider(Arc::new(mock));

    let settings = InferenceSettings {
        model: "mock/test-model".to_string(),
        fallback_model: None,
        max_tokens: 256,
        temperature: 0.2,
        timeout: Duration::from_secs(5),
    };
    let extractor = Extractor::new(Arc::new(InferenceClient::new(Arc::new(router), settings)));
    SessionRegistry::new(
        Store::open_in_memory().unwrap(),
        Arc::new(extractor),
        AgentSettings::default(),
        "main",
    )
}

fn setup(responses: Vec<&str>) -> axum::Router {
    taskpilot_server::build_router(registry(responses))
}

/// Helper to read the full body as JSON.
async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ── Chat ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_chat_endpoint() {
    let app = setup(vec!["Hello! How can I help?"]);
    let req = json_request("POST", "/api/chat", json!({"message": "hi there", "userId": "u1"}));
    let resp = app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["message"]["content"], "Hello! How can I help?");
    assert_eq!(json["message"]["type"], "agent");
    assert_eq!(json["message"]["userId"], "u1");
    assert_eq!(json["message"]["metadata"]["confidence"], 0.7);
}

#[tokio::test]
async fn test_chat_creates_task() {
    let app = setup(vec![
        "Adding it now.",
        r#"{"title": "Review the proposal", "priority": "high", "tags": []}"#,
    ]);
    let req = json_request(
        "POST",
        "/api/chat",
        json!({"message": "create a task to review the proposal"}),
    );
    let resp = app.clone().oneshot(req).await.unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["message"]["metadata"]["action"], "create_task");

    let resp = app
        .oneshot(Request::get("/api/tasks").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["tasks"][0]["title"], "Review the proposal");
    assert_eq!(json["tasks"][0]["priority"], "high");
}

#[tokio::test]
async fn test_chat_rejects_empty_message() {
    let app = setup(vec![]);
    let req = json_request("POST", "/api/chat", json!({"message": "   "}));
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ── Tasks ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_task_crud() {
    let app = setup(vec![]);

    let req = json_request(
        "POST",
        "/api/tasks",
        json!({"title": "Write docs", "tags": ["docs"]}),
    );
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let task = body_json(resp).await;
    assert_eq!(task["priority"], "medium");
    assert_eq!(task["status"], "pending");
    let id = task["id"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(Request::get(format!("/api/tasks/{id}")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["title"], "Write docs");

    let req = json_request("PATCH", &format!("/api/tasks/{id}"), json!({"status": "completed"}));
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "completed");

    let req = Request::delete(format!("/api/tasks/{id}")).body(Body::empty()).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["taskId"], id.as_str());

    let resp = app
        .oneshot(Request::get(format!("/api/tasks/{id}")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_task_is_404() {
    let app = setup(vec![]);
    let req = json_request("PATCH", "/api/tasks/task_missing", json!({"status": "completed"}));
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(body_json(resp).await["error"].as_str().unwrap().contains("task_missing"));

    let req = Request::delete("/api/tasks/task_missing").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_tasks_filters() {
    let app = setup(vec![]);
    for body in [
        json!({"title": "Fix login bug", "priority": "high", "tags": ["bug"]}),
        json!({"title": "Plan offsite", "description": "book the venue", "tags": ["team"]}),
        json!({"title": "Refactor auth", "priority": "high", "tags": ["tech-debt"]}),
    ] {
        app.clone()
            .oneshot(json_request("POST", "/api/tasks", body))
            .await
            .unwrap();
    }

    let get = |uri: &str| Request::get(uri).body(Body::empty()).unwrap();

    let json = body_json(app.clone().oneshot(get("/api/tasks?priority=high")).await.unwrap()).await;
    assert_eq!(json["total"], 2);

    let json = body_json(app.clone().oneshot(get("/api/tasks?tags=bug,team")).await.unwrap()).await;
    assert_eq!(json["total"], 2);

    let json = body_json(app.clone().oneshot(get("/api/tasks?search=VENUE")).await.unwrap()).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["tasks"][0]["title"], "Plan offsite");

    let json = body_json(
        app.clone()
            .oneshot(get("/api/tasks?priority=high&tags=bug"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(json["total"], 1);

    let resp = app.oneshot(get("/api/tasks?status=sideways")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ── Analytics & users ──────────────────────────────────────────

#[tokio::test]
async fn test_analytics_endpoint() {
    let app = setup(vec![]);
    let resp = app
        .clone()
        .oneshot(Request::get("/api/analytics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["totalTasks"], 0);
    assert_eq!(json["productivityScore"], 0);

    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/tasks",
            json!({"title": "late", "dueDate": "2000-01-01T00:00:00Z"}),
        ))
        .await
        .unwrap();
    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/tasks",
            json!({"title": "done", "status": "completed", "dueDate": "2000-01-01T00:00:00Z"}),
        ))
        .await
        .unwrap();

    let resp = app
        .oneshot(Request::get("/api/analytics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["totalTasks"], 2);
    assert_eq!(json["completedTasks"], 1);
    assert_eq!(json["overdueTasks"], 1);
    assert_eq!(json["productivityScore"], 50);
}

#[tokio::test]
async fn test_register_user() {
    let app = setup(vec![]);
    let resp = app
        .oneshot(json_request("POST", "/api/users", json!({"name": "Ada"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["name"], "Ada");
    assert_eq!(json["preferences"]["timezone"], "UTC");
    assert!(json["id"].as_str().unwrap().starts_with("user_"));
}

// ── Sessions ───────────────────────────────────────────────────

#[tokio::test]
async fn test_sessions_are_isolated_by_header() {
    let app = setup(vec![]);
    let req = Request::post("/api/tasks")
        .header("content-type", "application/json")
        .header("x-session-id", "alice")
        .body(Body::from(json!({"title": "alice's task"}).to_string()))
        .unwrap();
    app.clone().oneshot(req).await.unwrap();

    let list = |session: &str| {
        Request::get("/api/tasks")
            .header("x-session-id", session)
            .body(Body::empty())
            .unwrap()
    };
    assert_eq!(body_json(app.clone().oneshot(list("alice")).await.unwrap()).await["total"], 1);
    assert_eq!(body_json(app.clone().oneshot(list("bob")).await.unwrap()).await["total"], 0);

    let resp = app.oneshot(list("no/slashes")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ── WebSocket ──────────────────────────────────────────────────

async fn next_frame<S>(ws: &mut S) -> Value
where
    S: futures::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_websocket_frames() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = setup(vec!["Hi over the socket"]);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let url = format!("ws://{addr}/ws?session=live");
    let (mut a, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    let (mut b, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

    let hello = next_frame(&mut a).await;
    assert_eq!(hello["type"], "connection_established");
    assert_eq!(hello["taskCount"], 0);
    assert_eq!(next_frame(&mut b).await["type"], "connection_established");

    a.send(WsMessage::Text("not json".into())).await.unwrap();
    assert_eq!(next_frame(&mut a).await["type"], "error");

    a.send(WsMessage::Text(
        json!({"type": "create_task", "taskData": {"title": "From the socket"}}).to_string().into(),
    ))
    .await
    .unwrap();
    let created = next_frame(&mut a).await;
    assert_eq!(created["type"], "task_created");
    assert_eq!(created["task"]["title"], "From the socket");
    // b never saw the error, so its next frame is the broadcast
    assert_eq!(next_frame(&mut b).await["type"], "task_created");

    a.send(WsMessage::Text(
        json!({"type": "chat_message", "userId": "u1", "content": "hello"}).to_string().into(),
    ))
    .await
    .unwrap();
    assert_eq!(next_frame(&mut a).await["type"], "new_message");
    let response = next_frame(&mut a).await;
    assert_eq!(response["type"], "message_response");
    assert_eq!(response["message"]["content"], "Hi over the socket");
    assert_eq!(next_frame(&mut b).await["type"], "new_message");
}
