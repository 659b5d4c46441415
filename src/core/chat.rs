//! Chat engine: the conversation state machine
//!
//! The ChatEngine owns the transcript and at most one in-flight turn. A turn:
//! 1. Appends the user message and an empty, streaming assistant placeholder
//! 2. Opens a stream through the [`ChatBackend`]
//! 3. Rewrites the placeholder with the accumulated text on every token
//! 4. Finalizes the placeholder on completion, error, or cancellation
//!
//! Nothing mutates the transcript except the engine itself, and only while its
//! owner is awaiting [`ChatEngine::next_update`] or calling one of its methods.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::{ChatBackend, ClientError};
use crate::conversation::{Message, Transcript};
use crate::stream::{TransportEvent, TurnEvents, TurnHandle};

use super::identity::SessionIdentity;

pub const DEFAULT_GREETING: &str = "Hello! I'm your AI assistant. How can I help you today?";
pub const DEFAULT_CLEARED_GREETING: &str = "Conversation cleared. Let's start over!";
pub const DEFAULT_FAILURE_MESSAGE: &str = "Sorry, the request failed. Please try again later.";

/// Texts the engine writes into the transcript on its own
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// First message of a new conversation
    pub greeting: String,
    /// First message after [`ChatEngine::clear`]
    pub cleared_greeting: String,
    /// Shown when a turn fails before any text arrived and the error has no message
    pub failure_message: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            cleared_greeting: DEFAULT_CLEARED_GREETING.to_string(),
            failure_message: DEFAULT_FAILURE_MESSAGE.to_string(),
        }
    }
}

/// What applying one transport event did to the transcript
#[derive(Debug, Clone, PartialEq)]
pub enum TurnUpdate {
    /// A token was appended; `content` is the full text so far
    Token {
        message_id: Uuid,
        piece: String,
        content: String,
    },
    /// The turn finished normally
    Completed { message_id: Uuid },
    /// The turn failed; `error` is the reason shown or logged
    Failed { message_id: Uuid, error: String },
}

impl TurnUpdate {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TurnUpdate::Token { .. })
    }

    pub fn message_id(&self) -> Uuid {
        match self {
            TurnUpdate::Token { message_id, .. }
            | TurnUpdate::Completed { message_id }
            | TurnUpdate::Failed { message_id, .. } => *message_id,
        }
    }
}

/// The single in-flight exchange
struct ActiveTurn {
    placeholder_id: Uuid,
    handle: TurnHandle,
    events: TurnEvents,
    content: String,
}

/// The conversation state machine
pub struct ChatEngine {
    backend: Arc<dyn ChatBackend>,
    identity: SessionIdentity,
    session_id: String,
    transcript: Transcript,
    active: Option<ActiveTurn>,
    config: EngineConfig,
}

impl ChatEngine {
    /// Create an engine, resuming the stored conversation id if there is one
    pub async fn new(
        backend: Arc<dyn ChatBackend>,
        identity: SessionIdentity,
        config: EngineConfig,
    ) -> Self {
        let session_id = identity.load_or_create().await;
        info!("Conversation {} ready", session_id);

        Self {
            backend,
            identity,
            session_id,
            transcript: Transcript::new(&config.greeting),
            active: None,
            config,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether a turn is in flight
    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn message_count(&self) -> usize {
        self.transcript.len()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.transcript.last()
    }

    pub fn has_messages(&self) -> bool {
        self.transcript.has_messages()
    }

    /// Start a streaming turn.
    ///
    /// Returns `false` without touching anything when `text` is blank or a
    /// turn is already in flight.
    pub fn submit(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            debug!("Ignoring blank submission");
            return false;
        }
        if self.active.is_some() {
            debug!("Ignoring submission while a turn is in flight");
            return false;
        }

        self.transcript.push(Message::user(text));
        let placeholder_id = self.transcript.push(Message::placeholder());

        let (handle, events) = self.backend.open_stream(&self.session_id, text);
        self.active = Some(ActiveTurn {
            placeholder_id,
            handle,
            events,
            content: String::new(),
        });

        info!("Turn started in conversation {}", self.session_id);
        true
    }

    /// Wait for the next event of the active turn and apply it.
    ///
    /// Returns `None` when no turn is active. Cancel-safe: dropping the future
    /// loses no event.
    pub async fn next_update(&mut self) -> Option<TurnUpdate> {
        let event = self.active.as_mut()?.events.recv().await;
        self.apply(event)
    }

    /// Drive the active turn to its end and return the terminal update
    pub async fn finish_turn(&mut self) -> Option<TurnUpdate> {
        loop {
            let update = self.next_update().await?;
            if update.is_terminal() {
                return Some(update);
            }
        }
    }

    fn apply(&mut self, event: Option<TransportEvent>) -> Option<TurnUpdate> {
        match event {
            Some(TransportEvent::Token(piece)) => {
                let turn = self.active.as_mut()?;
                turn.content.push_str(&piece);

                if let Some(message) = self.transcript.get_mut(turn.placeholder_id) {
                    message.content.clone_from(&turn.content);
                }

                Some(TurnUpdate::Token {
                    message_id: turn.placeholder_id,
                    piece,
                    content: turn.content.clone(),
                })
            }
            Some(TransportEvent::Complete) => {
                let turn = self.active.take()?;
                if let Some(message) = self.transcript.get_mut(turn.placeholder_id) {
                    message.is_streaming = false;
                    message.timestamp = Utc::now();
                }

                info!("Turn completed with {} chars", turn.content.len());
                Some(TurnUpdate::Completed {
                    message_id: turn.placeholder_id,
                })
            }
            Some(TransportEvent::Error(e)) => Some(self.fail(e.to_string())),
            None => {
                // The transport always sends a terminal event unless cancelled,
                // and cancelling drops the receiver first
                warn!("Stream ended without a terminal event");
                let reason = self.config.failure_message.clone();
                Some(self.fail(reason))
            }
        }
    }

    /// Degrade the placeholder to an error and free the turn slot
    fn fail(&mut self, reason: String) -> TurnUpdate {
        error!("Turn failed: {}", reason);

        let Some(turn) = self.active.take() else {
            return TurnUpdate::Failed {
                message_id: Uuid::nil(),
                error: reason,
            };
        };

        if let Some(message) = self.transcript.get_mut(turn.placeholder_id) {
            message.content = if !turn.content.is_empty() {
                turn.content
            } else if !reason.trim().is_empty() {
                reason.clone()
            } else {
                self.config.failure_message.clone()
            };
            message.is_streaming = false;
            message.is_error = true;
        }

        TurnUpdate::Failed {
            message_id: turn.placeholder_id,
            error: reason,
        }
    }

    /// Stop the active turn without reporting an error.
    ///
    /// The placeholder keeps whatever text arrived and stops streaming.
    /// Returns `false` if nothing was in flight.
    pub fn cancel(&mut self) -> bool {
        let Some(turn) = self.active.take() else {
            return false;
        };

        turn.handle.cancel();
        if let Some(message) = self.transcript.get_mut(turn.placeholder_id) {
            message.is_streaming = false;
        }

        info!("Turn cancelled after {} chars", turn.content.len());
        true
    }

    /// Ask the server to forget this conversation, then reset the transcript.
    ///
    /// On failure nothing changes locally. The conversation id is kept.
    pub async fn clear(&mut self) -> Result<(), ClientError> {
        if let Err(e) = self.backend.clear_session(&self.session_id).await {
            error!("Failed to clear conversation {}: {}", self.session_id, e);
            return Err(e);
        }

        self.cancel();
        self.transcript.reset(&self.config.cleared_greeting);
        Ok(())
    }

    /// Abandon the current conversation and start a fresh one
    pub async fn new_conversation(&mut self) -> &str {
        self.cancel();
        self.session_id = self.identity.regenerate().await;
        self.transcript.reset(&self.config.greeting);

        info!("Started conversation {}", self.session_id);
        &self.session_id
    }

    /// Run a turn through the non-streaming endpoint.
    ///
    /// Same single-flight and blank-input rules as [`submit`](Self::submit).
    pub async fn submit_blocking(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() || self.active.is_some() {
            return false;
        }

        self.transcript.push(Message::user(text));

        let reply = match self.backend.converse(&self.session_id, text).await {
            Ok(content) => Message::assistant(content),
            Err(e) => {
                error!("Conversation call failed: {}", e);
                Message {
                    is_error: true,
                    ..Message::assistant(e.to_string())
                }
            }
        };

        self.transcript.push(reply);
        true
    }
}
