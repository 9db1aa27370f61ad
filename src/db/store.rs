//! Postgres implementation of the chat store and user directory.

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{error, instrument};
use uuid::Uuid;

use super::{friend_ids, message_insert, messages_between, user_display_name, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::chat::ChatMessage;
use crate::repositories::{MessageStore, UserDirectory};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgStore {
    #[instrument(skip(self, content))]
    async fn persist_message(&self, from: Uuid, to: Uuid, content: &str) -> AppResult<ChatMessage> {
        match message_insert(&self.pool, from, to, content).await {
            Ok(row) => Ok(row.into()),
            Err(e) => {
                error!(error = %e, "message insert failed");
                Err(AppError::Store(e.to_string()))
            }
        }
    }

    async fn history(&self, user_a: Uuid, user_b: Uuid) -> AppResult<Vec<ChatMessage>> {
        let rows = messages_between(&self.pool, user_a, user_b).await?;
        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn display_name(&self, user_id: Uuid) -> AppResult<Option<String>> {
        user_display_name(&self.pool, user_id).await
    }

    async fn friend_ids(&self, user_id: Uuid) -> AppResult<HashSet<Uuid>> {
        Ok(friend_ids(&self.pool, user_id).await?.into_iter().collect())
    }
}
