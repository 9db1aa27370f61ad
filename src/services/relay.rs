//! Direct chat relay: persist first, then deliver.

use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::chat::{ChatMessage, MAX_MESSAGE_CHARS};
use crate::models::event::ServerEvent;
use crate::models::identity::Identity;
use crate::models::presence::ConnectionId;
use crate::repositories::MessageStore;
use crate::services::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct MessageRelay {
    registry: ConnectionRegistry,
    store: Arc<dyn MessageStore>,
}

fn validate_content(content: &str) -> AppResult<()> {
    if content.trim().is_empty() {
        return Err(AppError::InvalidMessage("message content is empty".to_string()));
    }
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::InvalidMessage(format!(
            "message longer than {} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(())
}

impl MessageRelay {
    pub fn new(registry: ConnectionRegistry, store: Arc<dyn MessageStore>) -> Self {
        Self { registry, store }
    }

    /// Persist a message from `sender`, push `receive_message` to every live connection of
    /// `to`, and acknowledge with `message_sent` on `origin` only.
    ///
    /// Nothing is delivered unless the store accepted the message.
    #[instrument(skip(self, sender, content), fields(from = %sender.user_id))]
    pub async fn send_message(
        &self,
        sender: &Identity,
        origin: &ConnectionId,
        to: Uuid,
        content: &str,
    ) -> AppResult<ChatMessage> {
        validate_content(content)?;

        let message = self.store.persist_message(sender.user_id, to, content).await?;

        let delivered = self
            .registry
            .send_to_user(to, &ServerEvent::ReceiveMessage(message.clone()))
            .await;
        self.registry
            .send_to_connection(origin, &ServerEvent::MessageSent(message.clone()))
            .await;
        debug!(message_id = %message.id, to = %to, delivered, "message relayed");
        Ok(message)
    }

    pub async fn history(&self, user_a: Uuid, user_b: Uuid) -> AppResult<Vec<ChatMessage>> {
        self.store.history(user_a, user_b).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_must_have_text() {
        assert!(validate_content("hello").is_ok());
        assert!(validate_content("  \n\t ").is_err());
        assert!(validate_content("").is_err());
        assert!(validate_content(&"a".repeat(MAX_MESSAGE_CHARS + 1)).is_err());
    }
}
