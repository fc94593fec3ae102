//! In-process fake of the QA backend for tests

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;

#[derive(Default)]
struct Inner {
    answer: String,
    sources: Vec<String>,
    failure: Option<(u16, String)>,
    probe_ok: bool,
    delay: Duration,
    off_contract_answer: bool,
    uploads: Vec<(String, Vec<u8>)>,
    questions: Vec<String>,
    clears: usize,
    probes: usize,
}

#[derive(Clone)]
pub struct FakeState(Arc<Mutex<Inner>>);

impl FakeState {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.0.lock().unwrap()
    }

    pub fn set_answer(&self, answer: &str, sources: &[&str]) {
        let mut inner = self.lock();
        inner.answer = answer.to_string();
        inner.sources = sources.iter().map(|s| s.to_string()).collect();
    }

    /// Every endpoint except the probe answers with this status and detail
    pub fn fail_with(&self, status: u16, detail: &str) {
        self.lock().failure = Some((status, detail.to_string()));
    }

    pub fn recover(&self) {
        self.lock().failure = None;
    }

    pub fn set_probe_ok(&self, ok: bool) {
        self.lock().probe_ok = ok;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = delay;
    }

    /// `/ask` answers 200 with a body that has no `answer` field
    pub fn answer_off_contract(&self) {
        self.lock().off_contract_answer = true;
    }

    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.lock().uploads.clone()
    }

    pub fn questions(&self) -> Vec<String> {
        self.lock().questions.clone()
    }

    pub fn clears(&self) -> usize {
        self.lock().clears
    }

    pub fn probes(&self) -> usize {
        self.lock().probes
    }

    fn failure(&self) -> Option<Response> {
        self.lock().failure.clone().map(|(status, detail)| {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(json!({ "detail": detail }))).into_response()
        })
    }
}

pub struct FakeBackend {
    pub url: String,
    pub state: FakeState,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let state = FakeState(Arc::new(Mutex::new(Inner {
            answer: "I cannot find the answer in the provided documents.".to_string(),
            probe_ok: true,
            ..Default::default()
        })));

        let app = Router::new()
            .route("/", get(root))
            .route("/upload", post(upload))
            .route("/ask", post(ask))
            .route("/clear", post(clear))
            .with_state(state.clone());

        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{}", addr),
            state,
        }
    }
}

/// URL of a local port that nothing listens on
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

async fn root(State(state): State<FakeState>) -> Response {
    let ok = {
        let mut inner = state.lock();
        inner.probes += 1;
        inner.probe_ok
    };
    if ok {
        Json(json!({ "status": "ok" })).into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}

async fn upload(State(state): State<FakeState>, mut multipart: Multipart) -> Response {
    if let Some(failure) = state.failure() {
        return failure;
    }
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let Ok(bytes) = field.bytes().await else {
            return StatusCode::BAD_REQUEST.into_response();
        };
        state.lock().uploads.push((file_name, bytes.to_vec()));
        return Json(json!({ "message": "File processed successfully" })).into_response();
    }
    (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "detail": "file field required" }))).into_response()
}

async fn ask(State(state): State<FakeState>, Json(body): Json<serde_json::Value>) -> Response {
    let text = body["text"].as_str().unwrap_or_default().to_string();
    let delay = {
        let mut inner = state.lock();
        inner.questions.push(text);
        inner.delay
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    if let Some(failure) = state.failure() {
        return failure;
    }
    let inner = state.lock();
    if inner.off_contract_answer {
        return Json(json!({ "reply": inner.answer })).into_response();
    }
    Json(json!({ "answer": inner.answer, "sources": inner.sources })).into_response()
}

async fn clear(State(state): State<FakeState>) -> Response {
    if let Some(failure) = state.failure() {
        return failure;
    }
    state.lock().clears += 1;
    Json(json!({ "message": "Session cleared" })).into_response()
}
