//! Conversation identity
//!
//! The conversation id is read from local state at startup and written back
//! whenever it changes. Storage failures are logged and otherwise ignored; the
//! id then only lives for this process.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use super::memory::KeyValueStore;

/// Key the conversation id is stored under
pub const SESSION_KEY: &str = "chatSessionId";

#[derive(Clone)]
pub struct SessionIdentity {
    store: Option<Arc<dyn KeyValueStore>>,
}

impl SessionIdentity {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store: Some(store) }
    }

    /// Identity that is never persisted
    pub fn ephemeral() -> Self {
        Self { store: None }
    }

    /// Return the stored id, or create and store a fresh one
    pub async fn load_or_create(&self) -> String {
        if let Some(store) = &self.store {
            match store.get(SESSION_KEY).await {
                Ok(Some(id)) if !id.trim().is_empty() => {
                    debug!("Resuming conversation {}", id);
                    return id;
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to read conversation id: {}", e),
            }
        }

        self.regenerate().await
    }

    /// Create a new id and store it
    pub async fn regenerate(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.persist(&id).await;
        id
    }

    async fn persist(&self, id: &str) {
        let Some(store) = &self.store else {
            return;
        };

        if let Err(e) = store.set(SESSION_KEY, id).await {
            warn!("Failed to persist conversation id: {}", e);
        }
    }
}
