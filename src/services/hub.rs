//! Hub: the single entry point a socket worker talks to.
//!
//! A worker calls `connect` once after the credential is verified, `handle_text` for
//! every inbound frame in arrival order, and `disconnect` when the socket closes.
//! Failures in one connection's events never touch another connection's state.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::PresenceScope;
use crate::error::{AppError, AppResult};
use crate::models::event::{ChatCommand, ClientEvent, RoomCommand, ServerEvent, SignalCommand};
use crate::models::identity::Identity;
use crate::models::presence::ConnectionId;
use crate::repositories::{MessageStore, PresenceStore, UserDirectory};
use crate::services::playback::SyncService;
use crate::services::presence::PresenceService;
use crate::services::registry::{ConnectionRegistry, OutboundSender};
use crate::services::relay::MessageRelay;
use crate::services::rooms::RoomService;
use crate::services::signaling::SignalingService;

#[derive(Clone)]
pub struct Hub {
    registry: ConnectionRegistry,
    presence: PresenceService,
    rooms: RoomService,
    relay: MessageRelay,
    sync: SyncService,
    signaling: SignalingService,
}

impl Hub {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        presence_store: Arc<dyn PresenceStore>,
        directory: Arc<dyn UserDirectory>,
        scope: PresenceScope,
    ) -> Self {
        let registry = ConnectionRegistry::new();
        let rooms = RoomService::new(registry.clone());
        Self {
            presence: PresenceService::new(registry.clone(), presence_store, directory, scope),
            relay: MessageRelay::new(registry.clone(), messages),
            sync: SyncService::new(rooms.clone(), registry.clone()),
            signaling: SignalingService::new(registry.clone(), rooms.clone()),
            rooms,
            registry,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn presence(&self) -> &PresenceService {
        &self.presence
    }

    pub fn rooms(&self) -> &RoomService {
        &self.rooms
    }

    pub fn relay(&self) -> &MessageRelay {
        &self.relay
    }

    /// Admit an authenticated connection. Frames for it are written to `sender`.
    pub async fn connect(&self, identity: Identity, sender: OutboundSender) -> ConnectionId {
        let conn = ConnectionId::generate();
        let first = self
            .registry
            .register(conn.clone(), identity.clone(), sender)
            .await;
        self.registry
            .send_to_connection(
                &conn,
                &ServerEvent::ConnectionEstablished {
                    socket_id: conn.to_string(),
                    user_id: identity.user_id,
                    display_name: identity.display_name.clone(),
                },
            )
            .await;
        info!(socket_id = %conn, user_id = %identity.user_id, first, "hub connected");
        self.presence.connected(&identity, &conn).await;
        conn
    }

    /// Decode and handle one inbound frame. Invalid frames are dropped.
    pub async fn handle_text(&self, conn: &ConnectionId, identity: &Identity, text: &str) {
        let result = match ClientEvent::parse(text) {
            Ok(event) => self.dispatch(conn, identity, event).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {}
            Err(AppError::InvalidMessage(reason)) => {
                debug!(socket_id = %conn, user_id = %identity.user_id, reason = %reason, "event dropped");
            }
            Err(e) => {
                warn!(socket_id = %conn, user_id = %identity.user_id, error = %e, "event failed");
            }
        }
    }

    pub async fn dispatch(&self, conn: &ConnectionId, identity: &Identity, event: ClientEvent) -> AppResult<()> {
        match event {
            ClientEvent::Chat(ChatCommand::Send { to, content }) => {
                match self.relay.send_message(identity, conn, to, &content).await {
                    Ok(_) => Ok(()),
                    Err(AppError::InvalidMessage(reason)) => Err(AppError::InvalidMessage(reason)),
                    Err(e) => {
                        self.registry
                            .send_to_connection(
                                conn,
                                &ServerEvent::MessageFailed {
                                    to,
                                    reason: "message could not be saved".to_string(),
                                },
                            )
                            .await;
                        Err(e)
                    }
                }
            }
            ClientEvent::Room(RoomCommand::Join(room_id)) => {
                self.rooms.join(&room_id, identity, conn).await;
                Ok(())
            }
            ClientEvent::Room(RoomCommand::Leave(room_id)) => {
                self.rooms.leave(&room_id, identity.user_id, conn).await;
                Ok(())
            }
            ClientEvent::Sync(sync) => {
                self.sync.apply(&sync.room_id, identity, &sync.command).await?;
                Ok(())
            }
            ClientEvent::Signal(SignalCommand::JoinVoice(room_id)) => {
                self.signaling.join_voice(&room_id, identity).await?;
                Ok(())
            }
            ClientEvent::Signal(SignalCommand::LeaveVoice(room_id)) => {
                self.signaling.leave_voice(&room_id, identity).await?;
                Ok(())
            }
            ClientEvent::Signal(SignalCommand::Relay { to, kind, payload }) => {
                self.signaling.relay(identity, to, kind, payload).await?;
                Ok(())
            }
            ClientEvent::Ping => {
                self.registry.send_to_connection(conn, &ServerEvent::Pong).await;
                Ok(())
            }
        }
    }

    /// Remove a closed connection from the registry and every room, then announce
    /// departures and, for the user's last connection, going offline.
    pub async fn disconnect(&self, conn: &ConnectionId) {
        let Some(removed) = self.registry.unregister(conn).await else {
            return;
        };
        let left = self.rooms.remove_connection(removed.identity.user_id, conn).await;
        info!(
            socket_id = %conn,
            user_id = %removed.identity.user_id,
            rooms_left = left.len(),
            last_for_user = removed.last_for_user,
            "hub disconnected"
        );
        self.presence.disconnected(&removed.identity).await;
    }
}
