// In-process sandbox double for integration tests
#![allow(dead_code)]

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::{Json, Router};
use runlab_core::client::CORRELATION_HEADER;
use runlab_core::providers::{InMemoryCodeProvider, InMemoryTestCaseProvider};
use runlab_core::{EventBus, ExecutionClient, Metrics, Orchestrator, SubmissionHistory, TestRunner};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub submission_id: Option<String>,
    pub body: Value,
}

#[derive(Debug, Clone)]
struct Scripted {
    status: u16,
    body: Value,
    delay_ms: u64,
}

#[derive(Default)]
struct SandboxState {
    queued: HashMap<String, VecDeque<Scripted>>,
    fallback: HashMap<String, Scripted>,
    requests: Vec<RecordedRequest>,
}

type Shared = Arc<Mutex<SandboxState>>;

async fn handle(
    State(state): State<Shared>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let path = uri.path().to_string();
    let scripted = {
        let mut state = state.lock().unwrap();
        state.requests.push(RecordedRequest {
            path: path.clone(),
            submission_id: headers
                .get(CORRELATION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body,
        });
        let next = state.queued.get_mut(&path).and_then(|q| q.pop_front());
        next.or_else(|| state.fallback.get(&path).cloned())
    };

    match scripted {
        Some(s) => {
            if s.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(s.delay_ms)).await;
            }
            let status = StatusCode::from_u16(s.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(s.body))
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": format!("no scripted response for {}", path) })),
        ),
    }
}

pub struct MockSandbox {
    addr: SocketAddr,
    state: Shared,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockSandbox {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(SandboxState::default()));
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .ok();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// One-shot response, consumed in order.
    pub fn respond(&self, path: &str, status: u16, body: Value) {
        self.respond_after(path, status, body, 0);
    }

    pub fn respond_after(&self, path: &str, status: u16, body: Value, delay_ms: u64) {
        self.state
            .lock()
            .unwrap()
            .queued
            .entry(path.to_string())
            .or_default()
            .push_back(Scripted { status, body, delay_ms });
    }

    /// Used whenever no one-shot response is queued for `path`.
    pub fn respond_always(&self, path: &str, status: u16, body: Value) {
        self.state.lock().unwrap().fallback.insert(
            path.to_string(),
            Scripted {
                status,
                body,
                delay_ms: 0,
            },
        );
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }
}

impl Drop for MockSandbox {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Fully wired pipeline pointed at a mock sandbox.
pub struct Harness {
    pub sandbox: MockSandbox,
    pub code: Arc<InMemoryCodeProvider>,
    pub tests: Arc<InMemoryTestCaseProvider>,
    pub metrics: Metrics,
    pub events: EventBus,
    pub client: Arc<ExecutionClient>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub async fn start() -> Self {
        let sandbox = MockSandbox::start().await;
        let metrics = Metrics::new();
        let events = EventBus::new();
        let code = Arc::new(InMemoryCodeProvider::new());
        let tests = Arc::new(InMemoryTestCaseProvider::new());
        let client = Arc::new(ExecutionClient::new(&sandbox.url(), metrics.clone()));
        let runner = TestRunner::new(client.clone(), tests.clone(), metrics.clone(), 5000);
        let orchestrator = Arc::new(Orchestrator::new(
            code.clone(),
            client.clone(),
            runner,
            metrics.clone(),
            events.clone(),
            Arc::new(SubmissionHistory::new(50)),
        ));

        Self {
            sandbox,
            code,
            tests,
            metrics,
            events,
            client,
            orchestrator,
        }
    }
}

pub fn exec_ok(output: &str) -> Value {
    json!({ "success": true, "output": output })
}
