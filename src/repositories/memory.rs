//! In-process implementation of every collaborator store. Backs the hub tests and the HTTP integration tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::chat::ChatMessage;
use crate::models::presence::PresenceState;
use crate::repositories::{MessageStore, PresenceStore, UserDirectory};

#[derive(Default)]
struct MemoryInner {
    messages: Vec<ChatMessage>,
    last_created_at: Option<DateTime<Utc>>,
    presence: HashMap<Uuid, PresenceState>,
    users: HashMap<Uuid, String>,
    friends: HashMap<Uuid, HashSet<Uuid>>,
    fail_messages: bool,
    fail_presence: bool,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user_id: Uuid, display_name: &str) {
        let mut inner = self.inner.write().await;
        inner.users.insert(user_id, display_name.to_string());
    }

    /// Record a mutual friendship.
    pub async fn add_friendship(&self, a: Uuid, b: Uuid) {
        let mut inner = self.inner.write().await;
        inner.friends.entry(a).or_default().insert(b);
        inner.friends.entry(b).or_default().insert(a);
    }

    /// Make subsequent message writes fail, to exercise store-failure paths.
    pub async fn fail_message_writes(&self, fail: bool) {
        self.inner.write().await.fail_messages = fail;
    }

    /// Make subsequent presence writes fail.
    pub async fn fail_presence_writes(&self, fail: bool) {
        self.inner.write().await.fail_presence = fail;
    }

    pub async fn message_count(&self) -> usize {
        self.inner.read().await.messages.len()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn persist_message(&self, from: Uuid, to: Uuid, content: &str) -> AppResult<ChatMessage> {
        let mut inner = self.inner.write().await;
        if inner.fail_messages {
            return Err(AppError::Store("message store unavailable".to_string()));
        }
        let now = Utc::now();
        let created_at = match inner.last_created_at {
            Some(last) if last > now => last,
            _ => now,
        };
        inner.last_created_at = Some(created_at);
        let message = ChatMessage {
            id: Uuid::new_v4(),
            from,
            to,
            content: content.to_string(),
            created_at,
        };
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn history(&self, user_a: Uuid, user_b: Uuid) -> AppResult<Vec<ChatMessage>> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .iter()
            .filter(|m| (m.from == user_a && m.to == user_b) || (m.from == user_b && m.to == user_a))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PresenceStore for InMemoryStore {
    async fn set_presence(
        &self,
        user_id: Uuid,
        is_online: bool,
        last_active: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if inner.fail_presence {
            return Err(AppError::Store("presence store unavailable".to_string()));
        }
        inner.presence.insert(
            user_id,
            PresenceState {
                user_id,
                is_online,
                last_active: Some(last_active),
            },
        );
        Ok(())
    }

    async fn get_presence(&self, user_id: Uuid) -> AppResult<Option<PresenceState>> {
        Ok(self.inner.read().await.presence.get(&user_id).cloned())
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn display_name(&self, user_id: Uuid) -> AppResult<Option<String>> {
        Ok(self.inner.read().await.users.get(&user_id).cloned())
    }

    async fn friend_ids(&self, user_id: Uuid) -> AppResult<HashSet<Uuid>> {
        Ok(self
            .inner
            .read()
            .await
            .friends
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn history_is_both_directions_in_order() {
        let store = InMemoryStore::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let first = assert_ok!(store.persist_message(a, b, "one").await);
        let second = assert_ok!(store.persist_message(b, a, "two").await);
        assert_ok!(store.persist_message(a, c, "elsewhere").await);

        let history = store.history(a, b).await.unwrap();
        assert_eq!(history, vec![first.clone(), second.clone()]);
        assert!(first.created_at <= second.created_at);
    }

    #[tokio::test]
    async fn failing_writes_report_store_errors() {
        let store = InMemoryStore::new();
        store.fail_message_writes(true).await;
        let err = assert_err!(store.persist_message(Uuid::new_v4(), Uuid::new_v4(), "x").await);
        assert!(matches!(err, AppError::Store(_)));
        assert_eq!(store.message_count().await, 0);
    }

    #[tokio::test]
    async fn friendships_are_mutual() {
        let store = InMemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.add_friendship(a, b).await;
        assert!(store.friend_ids(b).await.unwrap().contains(&a));
    }
}
