//! Direct chat messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum message length, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// A persisted direct message. Immutable once the store has assigned `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub from: Uuid,
    pub to: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
