//! Conversation types and transcript state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single entry in the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(default)]
    pub is_error: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into())
    }

    /// Empty assistant message that fills in as tokens arrive
    pub fn placeholder() -> Self {
        Self {
            is_streaming: true,
            ..Self::new(Role::Assistant, String::new())
        }
    }

    fn new(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            timestamp: Utc::now(),
            is_streaming: false,
            is_error: false,
        }
    }
}

/// Ordered, never-empty list of messages.
///
/// Only the owner of the transcript mutates it. At most one message is
/// streaming, and when one is, it is the last assistant message.
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Create a transcript seeded with an assistant greeting
    pub fn new(greeting: &str) -> Self {
        Self {
            messages: vec![Message::assistant(greeting)],
        }
    }

    /// Drop every message and seed a fresh greeting
    pub fn reset(&mut self, greeting: &str) {
        self.messages.clear();
        self.messages.push(Message::assistant(greeting));
    }

    pub fn push(&mut self, message: Message) -> Uuid {
        let id = message.id;
        self.messages.push(message);
        id
    }

    pub fn get(&self, id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript holds no messages
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The message currently receiving tokens, if any
    pub fn streaming(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_streaming)
    }

    /// True once anything beyond the greeting has been added
    pub fn has_messages(&self) -> bool {
        self.messages.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transcript_has_greeting() {
        let transcript = Transcript::new("Hello!");
        assert_eq!(transcript.len(), 1);
        assert!(!transcript.has_messages());

        let greeting = transcript.last().unwrap();
        assert_eq!(greeting.role, Role::Assistant);
        assert_eq!(greeting.content, "Hello!");
        assert!(!greeting.is_streaming);
    }

    #[test]
    fn test_reset_keeps_single_greeting() {
        let mut transcript = Transcript::new("Hello!");
        transcript.push(Message::user("hi"));
        transcript.push(Message::placeholder());
        assert_eq!(transcript.len(), 3);

        transcript.reset("Cleared.");
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.messages()[0].content, "Cleared.");
        assert!(transcript.streaming().is_none());
    }

    #[test]
    fn test_update_by_id() {
        let mut transcript = Transcript::new("Hello!");
        let id = transcript.push(Message::placeholder());
        assert_eq!(transcript.streaming().map(|m| m.id), Some(id));

        let message = transcript.get_mut(id).unwrap();
        message.content = "partial".to_string();
        message.is_streaming = false;

        assert_eq!(transcript.get(id).unwrap().content, "partial");
        assert!(transcript.streaming().is_none());
    }

    #[test]
    fn test_message_serializes_camel_case() {
        let msg = Message::placeholder();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["isStreaming"], true);
        assert_eq!(json["isError"], false);
    }
}
