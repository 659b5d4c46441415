//! Cancellable, timeout-bounded SSE exchange
//!
//! [`StreamTransport::open`] spawns one task per exchange. The task sends an
//! ordered sequence of [`TransportEvent`]s: any number of tokens, then at most
//! one terminal event. A caller cancelling through the [`TurnHandle`] ends the
//! task without a terminal event.

use std::time::Duration;

use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::decoder::decode_stream;

/// Default time allowed for a whole exchange
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Failures reported through [`TransportEvent::Error`]
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error! status: {0}")]
    Status(StatusCode),

    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Request timed out after {}ms, please try again later", .0.as_millis())]
    Timeout(Duration),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

/// What the transport reports to the owner of a turn
#[derive(Debug)]
pub enum TransportEvent {
    /// A non-empty payload, in stream order
    Token(String),
    /// The stream ended normally (end signal or connection close)
    Complete,
    /// The exchange failed; never sent for caller cancellation
    Error(TransportError),
}

impl TransportEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransportEvent::Token(_))
    }
}

pub type TurnEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// Transport settings
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Cancellation handle for one open exchange
#[derive(Debug, Clone)]
pub struct TurnHandle {
    token: CancellationToken,
}

impl TurnHandle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Abort the exchange. Calling this more than once is a no-op.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Default for TurnHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Opens streaming exchanges against a single SSE endpoint
#[derive(Debug, Clone)]
pub struct StreamTransport {
    client: Client,
    config: TransportConfig,
}

impl StreamTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: TransportConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Start an exchange. Must be called from within a tokio runtime.
    pub fn open<B>(&self, endpoint: &str, body: &B) -> (TurnHandle, TurnEvents)
    where
        B: Serialize + ?Sized,
    {
        let handle = TurnHandle::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let request = self
            .client
            .post(endpoint)
            .header(ACCEPT, "text/event-stream")
            .json(body);

        tokio::spawn(drive(request, self.config.timeout, handle.token(), tx));

        (handle, rx)
    }
}

/// Race the exchange against the watchdog and the caller's cancellation.
/// Whichever finishes first drops the others, which also drops the response
/// body and closes the read side.
async fn drive(
    request: reqwest::RequestBuilder,
    timeout: Duration,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!("Stream cancelled by caller");
            return;
        }
        _ = tokio::time::sleep(timeout) => {
            warn!("Stream timed out after {:?}", timeout);
            Err(TransportError::Timeout(timeout))
        }
        result = pump(request, &tx) => result,
    };

    // Cancellation that lands after the race resolved still silences the turn
    if cancel.is_cancelled() {
        return;
    }

    let terminal = match outcome {
        Ok(()) => TransportEvent::Complete,
        Err(e) => TransportEvent::Error(e),
    };
    let _ = tx.send(terminal);
}

/// Send the request and forward tokens until the stream ends
async fn pump(
    request: reqwest::RequestBuilder,
    tx: &mpsc::UnboundedSender<TransportEvent>,
) -> Result<(), TransportError> {
    let response = request.send().await.map_err(TransportError::Network)?;

    let status = response.status();
    if !status.is_success() {
        warn!("Stream request rejected with status {}", status);
        return Err(TransportError::Status(status));
    }
    debug!("Stream opened with status {}", status);

    let events = decode_stream(response.bytes_stream());
    futures::pin_mut!(events);

    let mut tokens = 0usize;
    while let Some(event) = events.next().await {
        // The body is read undecoded, so a failing chunk means the connection broke
        let event = event.map_err(TransportError::Network)?;

        if event.is_terminal() {
            info!("Stream end signal received after {} tokens", tokens);
            return Ok(());
        }

        if event.data.is_empty() {
            continue;
        }

        tokens += 1;
        if tx.send(TransportEvent::Token(event.data)).is_err() {
            // Receiver is gone; nobody is listening for the rest
            debug!("Stream receiver dropped, stopping read");
            return Ok(());
        }
    }

    info!("Stream closed by server after {} tokens", tokens);
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::convert::Infallible;
    use std::net::SocketAddr;

    use axum::body::Body;
    use axum::http::StatusCode as AxumStatus;
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::Router;
    use bytes::Bytes;
    use serde_json::{json, Value};

    /// How the scripted server answers
    #[derive(Clone)]
    pub(crate) enum Script {
        /// Send these chunks, then close
        Chunks(Vec<&'static str>),
        /// Send these chunks, then hold the connection open forever
        ChunksThenHang(Vec<&'static str>),
        /// Send these chunks, then break the connection
        ChunksThenReset(Vec<&'static str>),
        /// Reply with a bare status code
        Status(u16),
    }

    fn response_for(script: Script) -> Response {
        match script {
            Script::Status(code) => AxumStatus::from_u16(code)
                .unwrap_or(AxumStatus::INTERNAL_SERVER_ERROR)
                .into_response(),
            Script::Chunks(chunks) => {
                let stream = async_stream::stream! {
                    for chunk in chunks {
                        yield Ok::<_, Infallible>(Bytes::from_static(chunk.as_bytes()));
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    }
                };
                sse_response(Body::from_stream(stream))
            }
            Script::ChunksThenReset(chunks) => {
                let stream = async_stream::stream! {
                    for chunk in chunks {
                        yield Ok::<_, std::io::Error>(Bytes::from_static(chunk.as_bytes()));
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    }
                    yield Err(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
                };
                sse_response(Body::from_stream(stream))
            }
            Script::ChunksThenHang(chunks) => {
                let stream = async_stream::stream! {
                    for chunk in chunks {
                        yield Ok::<_, Infallible>(Bytes::from_static(chunk.as_bytes()));
                    }
                    futures::future::pending::<()>().await;
                };
                sse_response(Body::from_stream(stream))
            }
        }
    }

    fn sse_response(body: Body) -> Response {
        Response::builder()
            .header("content-type", "text/event-stream")
            .body(body)
            .unwrap_or_else(|_| AxumStatus::INTERNAL_SERVER_ERROR.into_response())
    }

    /// Spawn an SSE server answering every POST with `script`. Returns the
    /// base URL and a receiver of the JSON request bodies seen.
    pub(crate) async fn spawn_server(script: Script) -> (String, mpsc::UnboundedReceiver<Value>) {
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();

        let handler = move |axum::Json(body): axum::Json<Value>| {
            let script = script.clone();
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(body);
                response_for(script)
            }
        };

        let app = Router::new().route("/api/chat/conversation/stream", post(handler));

        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), seen_rx)
    }

    fn endpoint(base: &str) -> String {
        format!("{}/api/chat/conversation/stream", base)
    }

    async fn collect(mut rx: TurnEvents) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn tokens(events: &[TransportEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                TransportEvent::Token(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    fn terminal_count(events: &[TransportEvent]) -> usize {
        events.iter().filter(|e| e.is_terminal()).count()
    }

    #[tokio::test]
    async fn test_tokens_then_done_event() {
        let (base, mut seen) = spawn_server(Script::Chunks(vec![
            "data:Hi\n\n",
            "data: the",
            "re\n\nevent:done\ndata:\n\n",
            "data:after done\n\n",
        ]))
        .await;

        let transport = StreamTransport::new(TransportConfig::default());
        let body = json!({ "sessionId": "s-1", "message": "hello" });
        let (_handle, rx) = transport.open(&endpoint(&base), &body);
        let events = collect(rx).await;

        assert_eq!(tokens(&events), vec!["Hi", " there"]);
        assert!(matches!(events.last(), Some(TransportEvent::Complete)));
        assert_eq!(terminal_count(&events), 1);

        let request = seen.recv().await.unwrap();
        assert_eq!(request["sessionId"], "s-1");
        assert_eq!(request["message"], "hello");
    }

    #[tokio::test]
    async fn test_done_sentinel_stops_reading() {
        let (base, _seen) = spawn_server(Script::ChunksThenHang(vec![
            "data:a\n\ndata:[DONE]\n\ndata:b\n\n",
        ]))
        .await;

        let transport = StreamTransport::new(TransportConfig::default());
        let (_handle, rx) = transport.open(&endpoint(&base), &json!({}));
        let events = collect(rx).await;

        assert_eq!(tokens(&events), vec!["a"]);
        assert!(matches!(events.last(), Some(TransportEvent::Complete)));
        assert_eq!(terminal_count(&events), 1);
    }

    #[tokio::test]
    async fn test_close_without_end_signal_completes() {
        let (base, _seen) =
            spawn_server(Script::Chunks(vec!["data:x\n\n", "event:ping\n\n", "data:y"])).await;

        let transport = StreamTransport::new(TransportConfig::default());
        let (_handle, rx) = transport.open(&endpoint(&base), &json!({}));
        let events = collect(rx).await;

        assert_eq!(tokens(&events), vec!["x", "y"]);
        assert!(matches!(events.last(), Some(TransportEvent::Complete)));
        assert_eq!(terminal_count(&events), 1);
    }

    #[tokio::test]
    async fn test_error_status_reports_once() {
        let (base, _seen) = spawn_server(Script::Status(500)).await;

        let transport = StreamTransport::new(TransportConfig::default());
        let (_handle, rx) = transport.open(&endpoint(&base), &json!({}));
        let events = collect(rx).await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            TransportEvent::Error(TransportError::Status(status)) => {
                assert_eq!(status.as_u16(), 500)
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = StreamTransport::new(TransportConfig::default());
        let (_handle, rx) = transport.open(&endpoint(&format!("http://{}", addr)), &json!({}));
        let events = collect(rx).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            TransportEvent::Error(TransportError::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_mid_stream_reports_once() {
        let (base, _seen) = spawn_server(Script::ChunksThenReset(vec!["data:one\n\n"])).await;

        let transport = StreamTransport::new(TransportConfig::default());
        let (handle, rx) = transport.open(&endpoint(&base), &json!({}));
        let events = collect(rx).await;

        assert_eq!(tokens(&events), vec!["one"]);
        assert_eq!(terminal_count(&events), 1);
        assert!(matches!(
            events.last(),
            Some(TransportEvent::Error(TransportError::Network(_)))
        ));
        assert!(!handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_timeout_reports_once_and_closes() {
        let (base, _seen) = spawn_server(Script::ChunksThenHang(vec!["data:slow\n\n"])).await;

        let transport = StreamTransport::new(TransportConfig {
            timeout: Duration::from_millis(200),
        });
        let (handle, rx) = transport.open(&endpoint(&base), &json!({}));
        let events = collect(rx).await;

        assert_eq!(tokens(&events), vec!["slow"]);
        assert_eq!(terminal_count(&events), 1);
        match events.last() {
            Some(TransportEvent::Error(e)) => assert!(e.is_timeout()),
            other => panic!("expected timeout, got {:?}", other),
        }
        // The channel closed, so the task and its response body are gone.
        // A timeout is not the caller's cancellation.
        assert!(!handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_is_silent() {
        let (base, _seen) =
            spawn_server(Script::ChunksThenHang(vec!["data:one\n\ndata:two\n\n"])).await;

        let transport = StreamTransport::new(TransportConfig::default());
        let (handle, mut rx) = transport.open(&endpoint(&base), &json!({}));

        let first = rx.recv().await;
        assert!(matches!(first, Some(TransportEvent::Token(ref t)) if t == "one"));

        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());

        let rest = collect(rx).await;
        assert_eq!(terminal_count(&rest), 0);
    }

    #[tokio::test]
    async fn test_cancel_before_response_is_silent() {
        let (base, _seen) = spawn_server(Script::ChunksThenHang(vec![])).await;

        let transport = StreamTransport::new(TransportConfig {
            timeout: Duration::from_millis(100),
        });
        let (handle, rx) = transport.open(&endpoint(&base), &json!({}));
        handle.cancel();

        let events = collect(rx).await;
        assert!(events.is_empty());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            TransportError::Status(StatusCode::INTERNAL_SERVER_ERROR).to_string(),
            "HTTP error! status: 500 Internal Server Error"
        );
        assert_eq!(
            TransportError::Timeout(Duration::from_secs(60)).to_string(),
            "Request timed out after 60000ms, please try again later"
        );
    }
}
