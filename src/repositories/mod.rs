//! Collaborator stores the hub calls into: chat persistence, presence, and the user directory.

pub mod memory;
pub mod redis_repo;

pub use memory::InMemoryStore;
pub use redis_repo::RedisRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::chat::ChatMessage;
use crate::models::presence::PresenceState;

/// Durable chat history. Failures are reported as `AppError::Store`.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new message and return it with its assigned id and creation time.
    async fn persist_message(&self, from: Uuid, to: Uuid, content: &str) -> AppResult<ChatMessage>;

    /// Messages exchanged between two users in either direction, oldest first.
    async fn history(&self, user_a: Uuid, user_b: Uuid) -> AppResult<Vec<ChatMessage>>;
}

/// Advisory online/offline record. Callers log and swallow failures.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn set_presence(
        &self,
        user_id: Uuid,
        is_online: bool,
        last_active: DateTime<Utc>,
    ) -> AppResult<()>;

    async fn get_presence(&self, user_id: Uuid) -> AppResult<Option<PresenceState>>;
}

/// Read-only view of users and the friend graph.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn display_name(&self, user_id: Uuid) -> AppResult<Option<String>>;

    async fn friend_ids(&self, user_id: Uuid) -> AppResult<HashSet<Uuid>>;
}
