//! Conversation endpoints
//!
//! - `POST /api/chat/conversation/stream` - SSE streaming turn
//! - `POST /api/chat/conversation` - whole reply in one JSON object
//! - `DELETE /api/chat/conversation/{sessionId}` - drop server-side history

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::stream::{StreamTransport, TransportConfig, TurnEvents, TurnHandle};

use super::{read_json, ClientError};

/// The remote side of a conversation, as seen by the chat engine
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Start a streaming turn. Tokens and the terminal event arrive on the
    /// returned channel; the handle cancels the turn silently.
    fn open_stream(&self, session_id: &str, message: &str) -> (TurnHandle, TurnEvents);

    /// Non-streaming turn: the full reply once generation is done
    async fn converse(&self, session_id: &str, message: &str) -> Result<String, ClientError>;

    /// Discard server-side history for a session. Idempotent.
    async fn clear_session(&self, session_id: &str) -> Result<(), ClientError>;
}

/// Body of both conversation calls
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConversationRequest<'a> {
    session_id: &'a str,
    message: &'a str,
}

/// Reply of the non-streaming and clear calls
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub code: u16,
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// reqwest-backed [`ChatBackend`]
#[derive(Debug, Clone)]
pub struct ChatClient {
    base_url: String,
    client: Client,
    transport: StreamTransport,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, config: TransportConfig) -> Self {
        let client = Client::new();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport: StreamTransport::with_client(client.clone(), config),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/chat{}", self.base_url, path)
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    fn open_stream(&self, session_id: &str, message: &str) -> (TurnHandle, TurnEvents) {
        debug!("Opening stream for session {}", session_id);
        let body = ConversationRequest {
            session_id,
            message,
        };
        self.transport.open(&self.url("/conversation/stream"), &body)
    }

    async fn converse(&self, session_id: &str, message: &str) -> Result<String, ClientError> {
        let body = ConversationRequest {
            session_id,
            message,
        };

        let response = self
            .client
            .post(self.url("/conversation"))
            .timeout(self.transport.config().timeout)
            .json(&body)
            .send()
            .await?;

        let reply: ChatReply = read_json(response).await?;
        if reply.code != 200 {
            return Err(ClientError::InvalidResponse(format!(
                "code {}: {}",
                reply.code, reply.message
            )));
        }

        Ok(reply.message)
    }

    async fn clear_session(&self, session_id: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .delete(self.url(&format!("/conversation/{}", session_id)))
            .timeout(self.transport.config().timeout)
            .send()
            .await?;

        let reply: ChatReply = read_json(response).await?;
        info!("Cleared session {}: {}", session_id, reply.message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::{delete, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use crate::stream::transport::tests::{spawn_server, Script};
    use crate::stream::TransportEvent;

    async fn spawn_json_server() -> String {
        let app = Router::new()
            .route(
                "/api/chat/conversation",
                post(|Json(body): Json<Value>| async move {
                    match body["message"].as_str() {
                        Some("stall") => {
                            futures::future::pending::<()>().await;
                            Json(json!({ "code": 200, "message": "too late" }))
                        }
                        Some("fail") => Json(json!({ "code": 500, "message": "model offline" })),
                        Some(text) => Json(json!({
                            "code": 200,
                            "message": format!("echo: {}", text),
                            "sessionId": body["sessionId"],
                            "timestamp": "2025-12-31T15:00:00"
                        })),
                        None => Json(json!({ "code": 400, "message": "missing message" })),
                    }
                }),
            )
            .route(
                "/api/chat/conversation/:session_id",
                delete(|Path(session_id): Path<String>| async move {
                    if session_id == "stuck" {
                        futures::future::pending::<()>().await;
                    }
                    if session_id == "broken" {
                        Err(StatusCode::INTERNAL_SERVER_ERROR)
                    } else {
                        Ok(Json(json!({ "code": 200, "message": "cleared", "sessionId": session_id })))
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_request_body_shape() {
        let body = ConversationRequest {
            session_id: "abc",
            message: "hi",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, json!({ "sessionId": "abc", "message": "hi" }));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ChatClient::new("http://localhost:8080/", TransportConfig::default());
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(
            client.url("/conversation"),
            "http://localhost:8080/api/chat/conversation"
        );
    }

    #[tokio::test]
    async fn test_converse() {
        let base = spawn_json_server().await;
        let client = ChatClient::new(base, TransportConfig::default());

        let reply = client.converse("s-1", "hello").await.unwrap();
        assert_eq!(reply, "echo: hello");

        let err = client.converse("s-1", "fail").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_clear_session() {
        let base = spawn_json_server().await;
        let client = ChatClient::new(base, TransportConfig::default());

        client.clear_session("s-1").await.unwrap();
        client.clear_session("s-1").await.unwrap();

        let err = client.clear_session("broken").await.unwrap_err();
        assert!(matches!(err, ClientError::Status(s) if s.as_u16() == 500));
    }

    #[tokio::test]
    async fn test_blocking_calls_use_configured_timeout() {
        let base = spawn_json_server().await;
        let client = ChatClient::new(
            base,
            TransportConfig {
                timeout: Duration::from_millis(200),
            },
        );

        let converse = tokio::time::timeout(Duration::from_secs(3), client.converse("s-1", "stall"))
            .await
            .expect("converse should give up on its own");
        assert!(matches!(converse, Err(ClientError::RequestFailed(ref e)) if e.is_timeout()));

        let clear = tokio::time::timeout(Duration::from_secs(3), client.clear_session("stuck"))
            .await
            .expect("clear_session should give up on its own");
        assert!(matches!(clear, Err(ClientError::RequestFailed(ref e)) if e.is_timeout()));
    }

    #[tokio::test]
    async fn test_open_stream_posts_session_and_message() {
        let (base, mut seen) =
            spawn_server(Script::Chunks(vec!["data:ok\n\n", "event:done\n\n"])).await;
        let client = ChatClient::new(base, TransportConfig::default());

        let (_handle, mut rx) = client.open_stream("session-9", "ping");
        assert!(matches!(rx.recv().await, Some(TransportEvent::Token(ref t)) if t == "ok"));
        assert!(matches!(rx.recv().await, Some(TransportEvent::Complete)));
        assert!(rx.recv().await.is_none());

        let request = seen.recv().await.unwrap();
        assert_eq!(request, json!({ "sessionId": "session-9", "message": "ping" }));
    }
}
