//! In-process fake of the exam console backend

#![allow(dead_code)]

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use session::{ApiClient, MemoryCredentialStore, MemoryNavigator};

/// Scripted answer of the refresh endpoint
#[derive(Debug, Clone)]
pub enum RefreshReply {
    Status(StatusCode),
    Json(Value),
}

impl RefreshReply {
    /// The nested shape the current backend returns
    pub fn tokens(access: &str, refresh: &str) -> Self {
        Self::Json(json!({
            "data": {
                "tokens": {
                    "access": { "token": access },
                    "refresh": { "token": refresh }
                }
            }
        }))
    }
}

/// What the refresh endpoint saw on its last call
#[derive(Debug, Clone)]
pub struct RecordedRefresh {
    pub refresh_token: Option<String>,
    pub body: Value,
}

struct BackendState {
    valid_token: String,
    refresh_delay: Duration,
    script: Mutex<VecDeque<RefreshReply>>,
    fallback: RefreshReply,
    refresh_calls: AtomicUsize,
    protected_calls: AtomicUsize,
    last_refresh: Mutex<Option<RecordedRefresh>>,
    seen_tokens: Mutex<Vec<Option<String>>>,
}

#[derive(Clone)]
pub struct Backend {
    state: Arc<BackendState>,
    pub addr: SocketAddr,
}

pub struct BackendBuilder {
    valid_token: String,
    refresh_delay: Duration,
    script: Vec<RefreshReply>,
    fallback: RefreshReply,
}

impl BackendBuilder {
    /// Token accepted by protected routes
    pub fn valid_token(mut self, token: &str) -> Self {
        self.valid_token = token.to_string();
        self
    }

    /// Keeps the refresh endpoint busy so concurrent 401s overlap with it
    pub fn refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    /// Replies for the first refresh calls, in order
    pub fn script(mut self, replies: Vec<RefreshReply>) -> Self {
        self.script = replies;
        self
    }

    /// Reply once the script is used up
    pub fn fallback(mut self, reply: RefreshReply) -> Self {
        self.fallback = reply;
        self
    }

    pub async fn start(self) -> Backend {
        let state = Arc::new(BackendState {
            valid_token: self.valid_token,
            refresh_delay: self.refresh_delay,
            script: Mutex::new(self.script.into()),
            fallback: self.fallback,
            refresh_calls: AtomicUsize::new(0),
            protected_calls: AtomicUsize::new(0),
            last_refresh: Mutex::new(None),
            seen_tokens: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/api/v1/auth/refresh", post(refresh))
            .route("/api/v1/exams/:id", get(exam))
            .route("/api/v1/applications", post(create_application))
            .route("/api/v1/broken", get(broken))
            .route("/api/v1/health", get(health))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Backend { state, addr }
    }
}

impl Backend {
    pub fn builder() -> BackendBuilder {
        BackendBuilder {
            valid_token: "new-access".into(),
            refresh_delay: Duration::ZERO,
            script: Vec::new(),
            fallback: RefreshReply::tokens("new-access", "new-refresh"),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn protected_calls(&self) -> usize {
        self.state.protected_calls.load(Ordering::SeqCst)
    }

    pub fn last_refresh(&self) -> Option<RecordedRefresh> {
        self.state.last_refresh.lock().unwrap().clone()
    }

    /// Bearer tokens presented to protected routes, in arrival order
    pub fn seen_tokens(&self) -> Vec<Option<String>> {
        self.state.seen_tokens.lock().unwrap().clone()
    }

    /// Client wired to this backend with in-memory collaborators
    pub fn client(
        &self,
        store: Arc<MemoryCredentialStore>,
        navigator: Arc<MemoryNavigator>,
    ) -> ApiClient {
        ApiClient::builder(self.base_url())
            .store(store)
            .navigator(navigator)
            .time_zone("Europe/Warsaw")
            .build()
            .unwrap()
    }
}

/// Base URL of a port nothing listens on
pub async fn unreachable_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

async fn refresh(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    *state.last_refresh.lock().unwrap() = Some(RecordedRefresh {
        refresh_token: headers
            .get("x-refresh-token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });

    if !state.refresh_delay.is_zero() {
        tokio::time::sleep(state.refresh_delay).await;
    }

    let reply = state
        .script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| state.fallback.clone());
    match reply {
        RefreshReply::Status(status) => (status, "refresh failed").into_response(),
        RefreshReply::Json(body) => Json(body).into_response(),
    }
}

fn authorize(state: &BackendState, headers: &HeaderMap) -> Result<(), Response> {
    state.protected_calls.fetch_add(1, Ordering::SeqCst);
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    state.seen_tokens.lock().unwrap().push(presented.clone());

    if presented.as_deref() == Some(state.valid_token.as_str()) {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "token expired").into_response())
    }
}

async fn exam(
    State(state): State<Arc<BackendState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }
    Json(json!({ "id": id, "name": format!("Exam {id}") })).into_response()
}

async fn create_application(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }
    (StatusCode::CREATED, Json(json!({ "created": body }))).into_response()
}

async fn broken() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "database unavailable").into_response()
}

async fn health() -> &'static str {
    "ok"
}
