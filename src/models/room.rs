//! Watch room identifiers and snapshots.

use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::playback::PlaybackState;

const MAX_ROOM_ID_LEN: usize = 128;

/// Client-chosen watch room name. Trimmed, non-empty, at most 128 chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn parse(raw: &str) -> AppResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppError::InvalidMessage("room id must not be empty".to_string()));
        }
        if trimmed.chars().count() > MAX_ROOM_ID_LEN {
            return Err(AppError::InvalidMessage(format!(
                "room id longer than {} characters",
                MAX_ROOM_ID_LEN
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMember {
    pub user_id: Uuid,
    pub username: String,
    pub in_voice: bool,
}

/// Point-in-time view of a room: sent to joiners and served over REST.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub members: Vec<RoomMember>,
    pub playback: PlaybackState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_id_trims() {
        assert_eq!(RoomId::parse("  movie-night ").unwrap().as_str(), "movie-night");
    }

    #[test]
    fn room_id_rejects_empty_and_long() {
        assert!(RoomId::parse("   ").is_err());
        assert!(RoomId::parse(&"x".repeat(129)).is_err());
        assert!(RoomId::parse(&"x".repeat(128)).is_ok());
    }
}
