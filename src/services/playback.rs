//! Shared playback state per watch room.
//!
//! Any room member may load, play, pause, or seek at any time. The most recently
//! accepted command fully overwrites the room's state; there is no host and no
//! conflict resolution. Each accepted command is broadcast to the other members.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::event::{ServerEvent, SyncKind};
use crate::models::identity::Identity;
use crate::models::room::RoomId;
use crate::services::registry::ConnectionRegistry;
use crate::services::rooms::RoomService;

/// A playback transition requested by a room member.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    Load { url: String },
    Play { position: f64 },
    Pause { position: f64 },
    Seek { position: f64, playing: bool },
}

impl PlaybackCommand {
    fn validate(&self) -> AppResult<()> {
        match self {
            PlaybackCommand::Load { url } => {
                let url = url.trim();
                let rest = url
                    .strip_prefix("https://")
                    .or_else(|| url.strip_prefix("http://"));
                if rest.map_or(true, str::is_empty) {
                    return Err(AppError::InvalidMessage(
                        "video url must be http or https".to_string(),
                    ));
                }
                Ok(())
            }
            PlaybackCommand::Play { position }
            | PlaybackCommand::Pause { position }
            | PlaybackCommand::Seek { position, .. } => {
                if !position.is_finite() || *position < 0.0 {
                    return Err(AppError::InvalidMessage(format!(
                        "invalid playback position: {}",
                        position
                    )));
                }
                Ok(())
            }
        }
    }

    /// Event other members receive once this command is accepted.
    pub fn to_event(&self, room_id: RoomId, by: &str) -> ServerEvent {
        let by = by.to_string();
        match self {
            PlaybackCommand::Load { url } => ServerEvent::VideoChange {
                room_id,
                url: url.trim().to_string(),
                by,
            },
            PlaybackCommand::Play { position } => ServerEvent::VideoSync {
                room_id,
                kind: SyncKind::Play,
                played: true,
                timestamp: *position,
                by,
            },
            PlaybackCommand::Pause { position } => ServerEvent::VideoSync {
                room_id,
                kind: SyncKind::Pause,
                played: false,
                timestamp: *position,
                by,
            },
            PlaybackCommand::Seek { position, playing } => ServerEvent::VideoSync {
                room_id,
                kind: SyncKind::Seek,
                played: *playing,
                timestamp: *position,
                by,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedPlayback {
    pub url: String,
    pub position_seconds: f64,
    pub is_playing: bool,
    pub last_updated_by: Uuid,
    pub last_updated_at: DateTime<Utc>,
}

/// Authoritative playback snapshot for one room. Lives and dies with the room.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Empty,
    Loaded(LoadedPlayback),
}

impl PlaybackState {
    /// Apply one command. `Empty` only accepts `Load`.
    pub fn apply(&mut self, command: &PlaybackCommand, by: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        command.validate()?;

        let next = match (command, &*self) {
            (PlaybackCommand::Load { url }, _) => LoadedPlayback {
                url: url.trim().to_string(),
                position_seconds: 0.0,
                is_playing: false,
                last_updated_by: by,
                last_updated_at: at,
            },
            (_, PlaybackState::Empty) => {
                return Err(AppError::InvalidMessage(
                    "no video loaded in this room".to_string(),
                ));
            }
            (PlaybackCommand::Play { position }, PlaybackState::Loaded(current)) => LoadedPlayback {
                position_seconds: *position,
                is_playing: true,
                last_updated_by: by,
                last_updated_at: at,
                ..current.clone()
            },
            (PlaybackCommand::Pause { position }, PlaybackState::Loaded(current)) => LoadedPlayback {
                position_seconds: *position,
                is_playing: false,
                last_updated_by: by,
                last_updated_at: at,
                ..current.clone()
            },
            (PlaybackCommand::Seek { position, playing }, PlaybackState::Loaded(current)) => {
                LoadedPlayback {
                    position_seconds: *position,
                    is_playing: *playing,
                    last_updated_by: by,
                    last_updated_at: at,
                    ..current.clone()
                }
            }
        };

        *self = PlaybackState::Loaded(next);
        Ok(())
    }

    pub fn loaded(&self) -> Option<&LoadedPlayback> {
        match self {
            PlaybackState::Loaded(p) => Some(p),
            PlaybackState::Empty => None,
        }
    }
}

/// Accepts playback commands from room members and fans them out to the rest of the room.
#[derive(Clone)]
pub struct SyncService {
    rooms: RoomService,
    registry: ConnectionRegistry,
}

impl SyncService {
    pub fn new(rooms: RoomService, registry: ConnectionRegistry) -> Self {
        Self { rooms, registry }
    }

    /// Apply `command` to the room's state and notify every other member.
    /// Returns the number of connections the broadcast reached.
    pub async fn apply(
        &self,
        room_id: &RoomId,
        actor: &Identity,
        command: &PlaybackCommand,
    ) -> AppResult<usize> {
        let recipients = self
            .rooms
            .apply_playback(room_id, actor.user_id, command, Utc::now())
            .await?;
        let event = command.to_event(room_id.clone(), &actor.display_name);
        let delivered = self.registry.send_to_connections(&recipients, &event).await;
        debug!(room_id = %room_id, user_id = %actor.user_id, delivered, "playback update");
        Ok(delivered)
    }
}
