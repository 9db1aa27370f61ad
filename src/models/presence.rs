//! Connection handles and the advisory online/offline record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque handle for one live connection (one browser tab, one socket).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a unique socket/connection id.
    pub fn generate() -> Self {
        Self(format!("{}.{}", std::process::id(), Uuid::new_v4().as_simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last known presence of a user, as written by the presence tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceState {
    pub user_id: Uuid,
    pub is_online: bool,
    pub last_active: Option<DateTime<Utc>>,
}

impl PresenceState {
    pub fn offline(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_online: false,
            last_active: None,
        }
    }
}
