//! Verified identity bound to a live connection.

use serde::Serialize;
use uuid::Uuid;

/// Who is on the other end of a connection. Derived once from a verified credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: Uuid,
    pub display_name: String,
}

impl Identity {
    pub fn new(user_id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
        }
    }
}
