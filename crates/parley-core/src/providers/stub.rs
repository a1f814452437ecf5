//! In-process vendor stub for adapter wire tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::IntoResponse;
use serde_json::Value;

/// One request as the stub saw it
#[derive(Debug, Clone)]
pub struct Captured {
    pub path: String,
    pub query: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

#[derive(Clone)]
struct StubState {
    status: u16,
    body: String,
    delay: Duration,
    captured: Arc<Mutex<Vec<Captured>>>,
}

pub struct StubServer {
    pub base_url: String,
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl StubServer {
    /// Serve `body` with `status` for every request.
    pub async fn spawn(status: u16, body: &str) -> Self {
        Self::spawn_with_delay(status, body, Duration::ZERO).await
    }

    pub async fn spawn_json(status: u16, body: Value) -> Self {
        Self::spawn(status, &body.to_string()).await
    }

    pub async fn spawn_with_delay(status: u16, body: &str, delay: Duration) -> Self {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let state = StubState {
            status,
            body: body.to_string(),
            delay,
            captured: captured.clone(),
        };
        let app = Router::new().fallback(handle).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base_url: format!("http://{}", addr),
            captured,
        }
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.captured.lock().unwrap().clone()
    }

    pub fn only_request(&self) -> Captured {
        let requests = self.requests();
        assert_eq!(requests.len(), 1, "expected exactly one request");
        requests.into_iter().next().unwrap()
    }
}

async fn handle(
    State(state): State<StubState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let headers = headers
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();
    state.captured.lock().unwrap().push(Captured {
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    (
        StatusCode::from_u16(state.status).unwrap(),
        [(header::CONTENT_TYPE, "application/json")],
        state.body,
    )
}
