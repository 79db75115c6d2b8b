#![cfg(unix)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sg_bridge::routes::sessions::SESSION_STATE_HEADER;
use sg_bridge::{api_router, AppState, ServiceControl, ServiceError, SshConnection};
use sg_core::config::BackendKind;
use sg_session::{RegistrySettings, SessionRegistry, SystemShellResolver};
use tower::ServiceExt;

// ===========================================================================
// Helpers
// ===========================================================================

/// In-memory stand-in for systemctl and ss.
#[derive(Default)]
struct FakeService {
    active: AtomicBool,
    connections: Vec<SshConnection>,
}

#[async_trait]
impl ServiceControl for FakeService {
    async fn is_active(&self) -> Result<bool, ServiceError> {
        Ok(self.active.load(Ordering::SeqCst))
    }

    async fn start(&self) -> Result<bool, ServiceError> {
        self.active.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn stop(&self) -> Result<bool, ServiceError> {
        self.active.store(false, Ordering::SeqCst);
        Ok(true)
    }

    async fn connections(&self) -> Result<Vec<SshConnection>, ServiceError> {
        Ok(self.connections.clone())
    }
}

fn test_router(max_sessions: usize) -> (Router, Arc<AppState>) {
    test_router_with(max_sessions, FakeService::default())
}

fn test_router_with(max_sessions: usize, ssh: FakeService) -> (Router, Arc<AppState>) {
    let settings = RegistrySettings {
        max_sessions,
        backend: BackendKind::Piped,
        terminate_grace: Duration::from_millis(300),
        ..RegistrySettings::default()
    };
    let registry = Arc::new(SessionRegistry::new(
        settings,
        Arc::new(SystemShellResolver::new(Some("/bin/sh".into()), "xterm")),
    ));
    let state = Arc::new(AppState::new(registry, Arc::new(ssh)));
    (api_router(Arc::clone(&state)), state)
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> axum::response::Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    router.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(resp: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

async fn create(router: &Router) -> String {
    let resp = send(router, "POST", "/api/sessions", None).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let json = body_json(resp).await;
    json["id"].as_str().expect("id in create response").to_string()
}

// ===========================================================================
// Session lifecycle
// ===========================================================================

#[tokio::test]
async fn test_create_input_output_history() {
    let (router, state) = test_router(1);
    let id = create(&router).await;

    let resp = send(
        &router,
        "POST",
        &format!("/api/sessions/{id}/input"),
        Some(json!({ "data": "echo hi\n" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut output = Vec::new();
    while Instant::now() < deadline && !String::from_utf8_lossy(&output).contains("hi") {
        let resp = send(&router, "GET", &format!("/api/sessions/{id}/output"), None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "application/octet-stream");
        assert_eq!(resp.headers()[SESSION_STATE_HEADER], "active");
        output.extend(body_bytes(resp).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(String::from_utf8_lossy(&output), "hi\n");

    let resp = send(&router, "GET", &format!("/api/sessions/{id}/history"), None).await;
    assert_eq!(body_json(resp).await, json!(["echo hi"]));

    let resp = send(&router, "GET", &format!("/api/sessions/{id}/scrollback"), None).await;
    assert_eq!(body_bytes(resp).await, b"hi\n");

    state.registry.shutdown();
}

#[tokio::test]
async fn test_capacity_maps_to_429_and_close_frees_slot() {
    let (router, state) = test_router(1);
    let id = create(&router).await;

    let resp = send(&router, "POST", "/api/sessions", None).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(body_json(resp).await["error"].as_str().unwrap().contains("limit"));

    let resp = send(&router, "DELETE", &format!("/api/sessions/{id}"), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["closed"], json!(true));

    // Duplicate close still succeeds.
    let resp = send(&router, "DELETE", &format!("/api/sessions/{id}"), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["closed"], json!(false));

    create(&router).await;
    state.registry.shutdown();
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let (router, _state) = test_router(1);
    let missing = uuid::Uuid::new_v4();
    for (method, path) in [
        ("GET", format!("/api/sessions/{missing}")),
        ("GET", format!("/api/sessions/{missing}/output")),
        ("GET", format!("/api/sessions/{missing}/history")),
    ] {
        let resp = send(&router, method, &path, None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{method} {path}");
    }
}

#[tokio::test]
async fn test_malformed_body_is_400_json() {
    let (router, _state) = test_router(1);
    let id = uuid::Uuid::new_v4();
    for (path, body) in [
        (format!("/api/sessions/{id}/input"), json!({})),
        (format!("/api/sessions/{id}/resize"), json!({ "rows": "tall", "cols": 80 })),
    ] {
        let resp = send(&router, "POST", &path, Some(body)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{path}");
        let body = body_json(resp).await;
        assert!(
            body["error"].as_str().is_some_and(|e| e.starts_with("bad request")),
            "{path}: {body}"
        );
    }
}

#[tokio::test]
async fn test_resize_validation_and_list() {
    let (router, state) = test_router(2);
    let id = create(&router).await;

    let resp = send(
        &router,
        "POST",
        &format!("/api/sessions/{id}/resize"),
        Some(json!({ "rows": 0, "cols": 80 })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = send(
        &router,
        "POST",
        &format!("/api/sessions/{id}/resize"),
        Some(json!({ "rows": 50, "cols": 160 })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = send(&router, "GET", "/api/sessions", None).await;
    let list = body_json(resp).await;
    let entries = list.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["id"], json!(id));
    assert_eq!(entries[0]["rows"], json!(50));
    assert_eq!(entries[0]["cols"], json!(160));
    assert_eq!(entries[0]["state"], json!("active"));
    assert_eq!(entries[0]["backend"], json!("piped"));

    state.registry.shutdown();
}

#[tokio::test]
async fn test_dead_session_input_is_410() {
    let (router, state) = test_router(1);
    let id = create(&router).await;

    send(
        &router,
        "POST",
        &format!("/api/sessions/{id}/input"),
        Some(json!({ "data": "exit\n" })),
    )
    .await;

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let resp = send(&router, "GET", &format!("/api/sessions/{id}"), None).await;
        if body_json(resp).await["state"] == json!("dead") || Instant::now() > deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let resp = send(
        &router,
        "POST",
        &format!("/api/sessions/{id}/input"),
        Some(json!({ "data": "ls\n" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::GONE);
    state.registry.shutdown();
}

#[tokio::test]
async fn test_create_after_shutdown_is_503() {
    let (router, state) = test_router(1);
    state.registry.shutdown();
    let resp = send(&router, "POST", "/api/sessions", None).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ===========================================================================
// SSH control
// ===========================================================================

#[tokio::test]
async fn test_ssh_start_stop_status() {
    let (router, _state) = test_router(1);

    let resp = send(&router, "GET", "/api/ssh/status", None).await;
    assert_eq!(body_json(resp).await, json!({ "active": false, "connections": 0 }));

    let resp = send(&router, "POST", "/api/ssh/start", None).await;
    assert_eq!(body_json(resp).await, json!({ "success": true }));

    let resp = send(&router, "GET", "/api/ssh/status", None).await;
    assert_eq!(body_json(resp).await, json!({ "active": true, "connections": 0 }));

    let resp = send(&router, "POST", "/api/ssh/stop", None).await;
    assert_eq!(body_json(resp).await, json!({ "success": true }));

    let resp = send(&router, "GET", "/api/ssh/status", None).await;
    assert_eq!(body_json(resp).await, json!({ "active": false, "connections": 0 }));
}

#[tokio::test]
async fn test_ssh_connections_listed_and_counted() {
    let observed_at = chrono::Utc::now();
    let conn = |remote: &str| SshConnection {
        local: "10.0.0.5:22".into(),
        remote: remote.into(),
        observed_at,
    };
    let ssh = FakeService {
        connections: vec![conn("10.0.0.9:51544"), conn("10.0.0.7:40112")],
        ..FakeService::default()
    };
    let (router, _state) = test_router_with(1, ssh);

    let resp = send(&router, "GET", "/api/ssh/connections", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let remotes: Vec<_> = body
        .as_array()
        .expect("array body")
        .iter()
        .map(|c| c["remote"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(remotes, vec!["10.0.0.9:51544", "10.0.0.7:40112"]);
    assert_eq!(body[0]["local"], "10.0.0.5:22");
    assert!(body[0]["observed_at"].is_string());

    let resp = send(&router, "GET", "/api/ssh/status", None).await;
    assert_eq!(body_json(resp).await, json!({ "active": false, "connections": 2 }));
}
