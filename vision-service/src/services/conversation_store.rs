//! In-memory per-user conversation history.
//!
//! Histories are created on first use and live for the lifetime of the
//! store; nothing is persisted or evicted. Each append is atomic, but a
//! request's read-then-append sequence is not serialized against other
//! requests for the same user.

use crate::models::Turn;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Ordered transcript of one user's turns. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Arc<RwLock<Vec<Turn>>>,
}

impl ConversationHistory {
    /// Append a turn at the end of the transcript.
    pub async fn push(&self, turn: Turn) {
        self.turns.write().await.push(turn);
    }

    /// Copy of all turns, oldest first.
    pub async fn snapshot(&self) -> Vec<Turn> {
        self.turns.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.turns.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.turns.read().await.is_empty()
    }

    /// Whether both handles point at the same history.
    pub fn ptr_eq(&self, other: &ConversationHistory) -> bool {
        Arc::ptr_eq(&self.turns, &other.turns)
    }
}

/// Mapping from user id to that user's history.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    users: Arc<DashMap<String, ConversationHistory>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing history for `user_id`, or a new empty one registered under it.
    pub fn get_or_create(&self, user_id: &str) -> ConversationHistory {
        if let Some(history) = self.users.get(user_id) {
            return history.value().clone();
        }

        self.users
            .entry(user_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(user_id = %user_id, "Creating conversation history");
                ConversationHistory::default()
            })
            .value()
            .clone()
    }

    /// History for `user_id` if one was created.
    pub fn get(&self, user_id: &str) -> Option<ConversationHistory> {
        self.users.get(user_id).map(|h| h.value().clone())
    }

    /// Append `turn` to the history of `user_id`, registering the user if needed.
    pub async fn append(&self, user_id: &str, turn: Turn) {
        self.get_or_create(user_id).push(turn).await;
    }

    /// Number of users with a history.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
