//! Core chat components
//!
//! The conversation state machine plus the local state it depends on: the
//! persisted conversation id and the cached knowledge base.

pub mod chat;
pub mod identity;
pub mod knowledge;
pub mod memory;

pub use chat::{
    ChatEngine, EngineConfig, TurnUpdate, DEFAULT_CLEARED_GREETING, DEFAULT_FAILURE_MESSAGE,
    DEFAULT_GREETING,
};
pub use identity::{SessionIdentity, SESSION_KEY};
pub use knowledge::KnowledgeStore;
pub use memory::{InMemoryStore, KeyValueStore, SqliteStore, StoreError};
