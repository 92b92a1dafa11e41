//! Webhook endpoints
//!
//! `POST /webhook` is the messaging-platform callback: one user message in,
//! one reply out, with the session key echoed back so the platform can
//! thread follow-ups. `POST /webhook/stream` answers the same request as a
//! short SSE stream for clients that render incrementally.

use axum::response::sse::{Event, KeepAlive};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Sse},
    routing::{get, post},
};
use concierge_agents::{CapabilityRegistry, Router as MessageRouter};
use concierge_common::ConciergeError;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub struct WebhookState {
    pub router: Arc<MessageRouter>,
    pub registry: Arc<CapabilityRegistry>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookRequest {
    pub message: String,
    /// Session key from a previous reply; omit to start a fresh session
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub response: String,
    pub session_id: String,
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub capabilities: Vec<String>,
}

pub fn webhook_routes(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .route("/webhook/stream", post(webhook_stream))
        .with_state(state)
}

async fn index() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "concierge",
        "endpoints": ["/health", "/webhook", "/webhook/stream"],
    }))
}

async fn health(State(state): State<Arc<WebhookState>>) -> impl IntoResponse {
    let capabilities = state
        .registry
        .router_tools()
        .into_iter()
        .map(|tool| tool.name)
        .collect();
    Json(HealthResponse {
        status: "ok",
        capabilities,
    })
}

/// Map a router error onto a transport status with user-safe text only.
/// The `Backend` message is already a fixed user-facing string; everything
/// else stays in the logs.
fn error_response(e: ConciergeError) -> (StatusCode, String) {
    match e {
        ConciergeError::Generic(reason) => (StatusCode::BAD_REQUEST, reason),
        ConciergeError::Backend(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
        other => {
            error!("Webhook request failed: {}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "The request could not be processed.".to_string(),
            )
        }
    }
}

async fn webhook(
    State(state): State<Arc<WebhookState>>,
    Json(request): Json<WebhookRequest>,
) -> Result<Json<WebhookResponse>, (StatusCode, String)> {
    info!("Webhook message received ({} chars)", request.message.len());

    match state
        .router
        .handle(&request.message, request.session_id.as_deref())
        .await
    {
        Ok((reply, session_id)) => Ok(Json(WebhookResponse {
            response: reply,
            session_id,
            success: true,
        })),
        Err(e) => Err(error_response(e)),
    }
}

async fn webhook_stream(
    State(state): State<Arc<WebhookState>>,
    Json(request): Json<WebhookRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    info!("Streaming webhook message received");

    let (reply, session_id) = state
        .router
        .handle(&request.message, request.session_id.as_deref())
        .await
        .map_err(error_response)?;

    let mut events: Vec<Result<Event, Infallible>> = Vec::new();
    events.push(Ok(Event::default().event("session").data(session_id)));
    for chunk in chunk_reply(&reply, 8) {
        events.push(Ok(Event::default().event("delta").data(chunk)));
    }
    events.push(Ok(Event::default().event("done").data("")));

    let stream = tokio_stream::iter(events);
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

/// Split a reply into whitespace-preserving chunks of up to `words` words
fn chunk_reply(reply: &str, words: usize) -> Vec<String> {
    let tokens: Vec<&str> = reply.split_inclusive(' ').collect();
    tokens
        .chunks(words)
        .map(|chunk| chunk.concat())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use concierge_agents::CapabilityBackends;
    use concierge_agents::router::BACKEND_UNAVAILABLE;
    use concierge_common::{RetrievalConfig, Turn};
    use concierge_core::{
        BackendReply, CompletionBackend, KnowledgeRetriever, MemorySessionStore, RetrievedChunk,
        ToolSpec,
    };

    #[test]
    fn test_chunk_reply_preserves_text() {
        let reply = "one two three four five six seven eight nine ten";
        let chunks = chunk_reply(reply, 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), reply);
    }

    #[test]
    fn test_request_session_id_is_optional() {
        let request: WebhookRequest =
            serde_json::from_str(r#"{"message": "hello"}"#).unwrap();
        assert!(request.session_id.is_none());
    }

    struct DownBackend;

    #[async_trait]
    impl CompletionBackend for DownBackend {
        async fn decide(
            &self,
            _turns: &[Turn],
            _tools: &[ToolSpec],
        ) -> concierge_common::Result<BackendReply> {
            Err(ConciergeError::Backend("connection refused".to_string()))
        }

        async fn complete(&self, _prompt: &str) -> concierge_common::Result<String> {
            Err(ConciergeError::Backend("connection refused".to_string()))
        }
    }

    struct NullRetriever;

    #[async_trait]
    impl KnowledgeRetriever for NullRetriever {
        async fn search(
            &self,
            _query: &str,
            _k: usize,
        ) -> concierge_common::Result<Vec<RetrievedChunk>> {
            Ok(Vec::new())
        }
    }

    fn state_with_down_backend() -> Arc<WebhookState> {
        let backend = Arc::new(DownBackend);
        let backends = Arc::new(CapabilityBackends {
            completion: backend.clone(),
            retriever: Arc::new(NullRetriever),
            retrieval: RetrievalConfig::default(),
        });
        let registry = Arc::new(CapabilityRegistry::new(backends));
        let router = Arc::new(MessageRouter::new(
            backend,
            registry.clone(),
            Arc::new(MemorySessionStore::new()),
            5,
        ));
        Arc::new(WebhookState { router, registry })
    }

    #[tokio::test]
    async fn test_backend_failure_returns_503_with_generic_text() {
        let state = state_with_down_backend();
        let result = webhook(
            State(state),
            Json(WebhookRequest {
                message: "hello".to_string(),
                session_id: Some("s1".to_string()),
            }),
        )
        .await;

        let (status, body) = result.unwrap_err();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, BACKEND_UNAVAILABLE);
        // Internal taxonomy and diagnostics stay out of the reply
        assert!(!body.contains("Completion backend"));
        assert!(!body.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_stream_backend_failure_returns_503() {
        let state = state_with_down_backend();
        let result = webhook_stream(
            State(state),
            Json(WebhookRequest {
                message: "hello".to_string(),
                session_id: None,
            }),
        )
        .await;

        let (status, body) = match result {
            Err(rejection) => rejection,
            Ok(_) => panic!("expected an error response"),
        };
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, BACKEND_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_empty_message_returns_400() {
        let state = state_with_down_backend();
        let result = webhook(
            State(state),
            Json(WebhookRequest {
                message: "   ".to_string(),
                session_id: None,
            }),
        )
        .await;

        let (status, _) = result.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
