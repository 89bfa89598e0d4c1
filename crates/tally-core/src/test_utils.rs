//! Test utilities for tally-core
//!
//! A mock Gemini `generateContent` server for exercising the real HTTP
//! backend in development and integration tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::ai::mock::{default_normalization, listed_items};

/// How the mock server answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockGeminiMode {
    /// Answer every listed item with a deterministic normalization
    Echo,
    /// Return HTTP 500
    ServerError,
    /// Return 200 with no candidates
    Malformed,
}

/// A request as received by the mock server
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    /// Path segment after `/v1beta/models/`, e.g. `gemini-2.0-flash-exp:generateContent`
    pub model_action: String,
    pub api_key: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct ServerState {
    mode: MockGeminiMode,
    requests: Arc<Mutex<Vec<ReceivedRequest>>>,
}

/// Mock Gemini server for testing and development
pub struct MockGeminiServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<ReceivedRequest>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockGeminiServer {
    /// Start an echoing server on an available port
    pub async fn start() -> Self {
        Self::start_with_mode(MockGeminiMode::Echo).await
    }

    pub async fn start_with_mode(mode: MockGeminiMode) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = ServerState {
            mode,
            requests: requests.clone(),
        };

        let app = Router::new()
            .route("/v1beta/models/:model_action", post(handle_generate))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            requests,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockGeminiServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_generate(
    State(state): State<ServerState>,
    Path(model_action): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    let prompt = body["contents"][0]["parts"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    if let Ok(mut requests) = state.requests.lock() {
        requests.push(ReceivedRequest {
            model_action,
            api_key: query.get("key").cloned(),
            body,
        });
    }

    match state.mode {
        MockGeminiMode::ServerError => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": { "code": 500, "message": "internal error" } })),
        )
            .into_response(),
        MockGeminiMode::Malformed => Json(json!({ "candidates": [] })).into_response(),
        MockGeminiMode::Echo => {
            let normalizations: Vec<Value> = listed_items(&prompt)
                .iter()
                .map(|raw| {
                    let (normalized, regex) = default_normalization(raw);
                    json!({ "normalized": normalized, "regex": regex })
                })
                .collect();
            let text = json!({ "normalizations": normalizations }).to_string();

            Json(json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": text }] },
                    "finishReason": "STOP"
                }]
            }))
            .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{normalization_schema, parsing::parse_normalizations, AIBackend};
    use crate::error::Error;
    use crate::GeminiBackend;

    const PROMPT: &str = "Merchants to normalize:\n1. ACME STORE*ABC123\n2. GROCERY MART 9999";

    #[tokio::test]
    async fn test_gemini_round_trip() {
        let server = MockGeminiServer::start().await;
        let backend = GeminiBackend::with_host(&server.url(), "test-key", "gemini-2.0-flash-exp");

        let schema = normalization_schema();
        let content = backend
            .chat("You normalize merchants.", PROMPT, Some(&schema), 0.3)
            .await
            .unwrap();

        let parsed = parse_normalizations(&content, 2).unwrap();
        assert_eq!(parsed[0].normalized, "Acme Store");
        assert_eq!(parsed[1].regex.as_deref(), Some(r"GROCERY\s+MART.*"));

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model_action, "gemini-2.0-flash-exp:generateContent");
        assert_eq!(requests[0].api_key.as_deref(), Some("test-key"));
        assert_eq!(
            requests[0].body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert!(requests[0].body["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("You normalize merchants.\n\n"));
    }

    #[tokio::test]
    async fn test_gemini_server_error() {
        let server = MockGeminiServer::start_with_mode(MockGeminiMode::ServerError).await;
        let backend = GeminiBackend::with_host(&server.url(), "k", "m");

        let result = backend.chat("s", PROMPT, None, 0.3).await;
        match result {
            Err(Error::AIRequestFailed(msg)) => assert!(msg.contains("500")),
            other => panic!("expected AIRequestFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_gemini_missing_candidates() {
        let server = MockGeminiServer::start_with_mode(MockGeminiMode::Malformed).await;
        let backend = GeminiBackend::with_host(&server.url(), "k", "m");

        let result = backend.chat("s", PROMPT, None, 0.3).await;
        assert!(matches!(result, Err(Error::AIResponseMalformed(_))));
    }
}
