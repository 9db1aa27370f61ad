//! Voice signaling: voice-channel membership per room and point-to-point relay of
//! WebRTC negotiation messages. Payloads are forwarded untouched.
//!
//! Peers form a full mesh: every member that sees `user_joined_voice` opens its own
//! connection toward the newcomer.

use serde_json::value::RawValue;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::event::{ServerEvent, SignalKind};
use crate::models::identity::Identity;
use crate::models::room::RoomId;
use crate::services::registry::ConnectionRegistry;
use crate::services::rooms::RoomService;

#[derive(Clone)]
pub struct SignalingService {
    registry: ConnectionRegistry,
    rooms: RoomService,
}

impl SignalingService {
    pub fn new(registry: ConnectionRegistry, rooms: RoomService) -> Self {
        Self { registry, rooms }
    }

    /// Enter the room's voice channel. Requires watch-room membership; repeated joins are no-ops.
    pub async fn join_voice(&self, room_id: &RoomId, identity: &Identity) -> AppResult<bool> {
        let Some(recipients) = self.rooms.set_voice(room_id, identity.user_id, true).await? else {
            return Ok(false);
        };
        let event = ServerEvent::UserJoinedVoice {
            room_id: room_id.clone(),
            user_id: identity.user_id,
        };
        self.registry.send_to_connections(&recipients, &event).await;
        debug!(room_id = %room_id, user_id = %identity.user_id, "joined voice");
        Ok(true)
    }

    pub async fn leave_voice(&self, room_id: &RoomId, identity: &Identity) -> AppResult<bool> {
        let Some(recipients) = self.rooms.set_voice(room_id, identity.user_id, false).await? else {
            return Ok(false);
        };
        let event = ServerEvent::UserLeftVoice {
            room_id: room_id.clone(),
            user_id: identity.user_id,
        };
        self.registry.send_to_connections(&recipients, &event).await;
        debug!(room_id = %room_id, user_id = %identity.user_id, "left voice");
        Ok(true)
    }

    /// Forward an offer, answer, or ICE candidate to every connection of `to`,
    /// tagged with the sender. Offline targets are a silent no-op.
    pub async fn relay(
        &self,
        from: &Identity,
        to: Uuid,
        kind: SignalKind,
        payload: Box<RawValue>,
    ) -> AppResult<usize> {
        if to == from.user_id {
            return Err(AppError::InvalidMessage(
                "cannot signal yourself".to_string(),
            ));
        }
        let event = ServerEvent::signal(kind, from.user_id, payload);
        let delivered = self.registry.send_to_user(to, &event).await;
        debug!(from = %from.user_id, to = %to, ?kind, delivered, "signal relayed");
        Ok(delivered)
    }
}
