//! Watch rooms: ephemeral, in-memory membership with voice participants and playback state.
//!
//! A room exists exactly while it has members. `join` reports whether it created
//! the room and `leave` reports whether it removed it.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::event::ServerEvent;
use crate::models::identity::Identity;
use crate::models::presence::ConnectionId;
use crate::models::room::{RoomId, RoomMember, RoomSnapshot};
use crate::services::playback::{PlaybackCommand, PlaybackState};
use crate::services::registry::ConnectionRegistry;

struct MemberEntry {
    display_name: String,
    /// Connections of this user that joined the room.
    connections: HashSet<ConnectionId>,
}

#[derive(Default)]
struct Room {
    members: HashMap<Uuid, MemberEntry>,
    voice: HashSet<Uuid>,
    playback: PlaybackState,
}

impl Room {
    fn connections_except(&self, user_id: Uuid) -> Vec<ConnectionId> {
        self.members
            .iter()
            .filter(|(id, _)| **id != user_id)
            .flat_map(|(_, m)| m.connections.iter().cloned())
            .collect()
    }

    fn snapshot(&self, room_id: &RoomId) -> RoomSnapshot {
        let mut members: Vec<RoomMember> = self
            .members
            .iter()
            .map(|(id, m)| RoomMember {
                user_id: *id,
                username: m.display_name.clone(),
                in_voice: self.voice.contains(id),
            })
            .collect();
        members.sort_by(|a, b| a.username.cmp(&b.username).then(a.user_id.cmp(&b.user_id)));
        RoomSnapshot {
            room_id: room_id.clone(),
            members,
            playback: self.playback.clone(),
        }
    }

    fn member_mut(&mut self, user_id: Uuid) -> AppResult<&mut MemberEntry> {
        self.members
            .get_mut(&user_id)
            .ok_or_else(|| AppError::InvalidMessage("not a member of this room".to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JoinOutcome {
    pub room_created: bool,
    /// The user was not a member before this call.
    pub newly_joined: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LeaveOutcome {
    /// The user is no longer a member after this call (and was before).
    pub left: bool,
    pub room_removed: bool,
}

/// Departure computed under the room lock, announced after it is released.
struct Departure {
    room_id: RoomId,
    user_id: Uuid,
    was_in_voice: bool,
    recipients: Vec<ConnectionId>,
}

/// Owns every watch room. Membership is per user; each member also records which of
/// its connections joined, so broadcasts reach only those connections.
#[derive(Clone)]
pub struct RoomService {
    rooms: Arc<RwLock<HashMap<RoomId, Room>>>,
    registry: ConnectionRegistry,
}

impl RoomService {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            registry,
        }
    }

    /// Join `room_id` from `conn`. Existing members are told about a new member once;
    /// the joining connection receives a `room_state` snapshot.
    ///
    /// The snapshot is queued while the room lock is held, so no playback broadcast
    /// that reaches `conn` can be queued ahead of it.
    pub async fn join(&self, room_id: &RoomId, identity: &Identity, conn: &ConnectionId) -> JoinOutcome {
        let (outcome, recipients) = {
            let mut rooms = self.rooms.write().await;
            let room_created = !rooms.contains_key(room_id);
            let room = rooms.entry(room_id.clone()).or_default();

            let (newly_joined, conn_added) = match room.members.get_mut(&identity.user_id) {
                Some(member) => (false, member.connections.insert(conn.clone())),
                None => {
                    room.members.insert(
                        identity.user_id,
                        MemberEntry {
                            display_name: identity.display_name.clone(),
                            connections: HashSet::from([conn.clone()]),
                        },
                    );
                    (true, true)
                }
            };

            if conn_added {
                self.registry
                    .send_to_connection(conn, &ServerEvent::RoomState(room.snapshot(room_id)))
                    .await;
            }
            let recipients = if newly_joined {
                room.connections_except(identity.user_id)
            } else {
                Vec::new()
            };
            (
                JoinOutcome {
                    room_created,
                    newly_joined,
                },
                recipients,
            )
        };

        if outcome.room_created {
            info!(room_id = %room_id, "room created");
        }
        if outcome.newly_joined {
            let event = ServerEvent::UserJoinedRoom {
                room_id: room_id.clone(),
                user_id: identity.user_id,
                username: identity.display_name.clone(),
            };
            self.registry.send_to_connections(&recipients, &event).await;
            debug!(room_id = %room_id, user_id = %identity.user_id, "joined room");
        }
        outcome
    }

    /// Leave `room_id` from `conn`. The user stops being a member once none of its
    /// connections remain in the room. Leaving a room not joined is a no-op.
    pub async fn leave(&self, room_id: &RoomId, user_id: Uuid, conn: &ConnectionId) -> LeaveOutcome {
        let (outcome, departure) = {
            let mut rooms = self.rooms.write().await;
            Self::detach(&mut rooms, room_id, user_id, conn)
        };
        if let Some(departure) = departure {
            self.announce(departure).await;
        }
        outcome
    }

    /// Remove `conn` from every room it joined. Called when the connection closes.
    pub async fn remove_connection(&self, user_id: Uuid, conn: &ConnectionId) -> Vec<RoomId> {
        let departures: Vec<Departure> = {
            let mut rooms = self.rooms.write().await;
            let joined: Vec<RoomId> = rooms
                .iter()
                .filter(|(_, room)| {
                    room.members
                        .get(&user_id)
                        .map(|m| m.connections.contains(conn))
                        .unwrap_or(false)
                })
                .map(|(id, _)| id.clone())
                .collect();
            joined
                .iter()
                .filter_map(|room_id| Self::detach(&mut rooms, room_id, user_id, conn).1)
                .collect()
        };

        let mut left = Vec::with_capacity(departures.len());
        for departure in departures {
            left.push(departure.room_id.clone());
            self.announce(departure).await;
        }
        left
    }

    fn detach(
        rooms: &mut HashMap<RoomId, Room>,
        room_id: &RoomId,
        user_id: Uuid,
        conn: &ConnectionId,
    ) -> (LeaveOutcome, Option<Departure>) {
        let Some(room) = rooms.get_mut(room_id) else {
            return (LeaveOutcome::default(), None);
        };
        let Some(member) = room.members.get_mut(&user_id) else {
            return (LeaveOutcome::default(), None);
        };
        if !member.connections.remove(conn) || !member.connections.is_empty() {
            return (LeaveOutcome::default(), None);
        }

        room.members.remove(&user_id);
        let was_in_voice = room.voice.remove(&user_id);
        let recipients = room.connections_except(user_id);
        let room_removed = room.members.is_empty();
        if room_removed {
            rooms.remove(room_id);
            info!(room_id = %room_id, "room removed");
        }
        (
            LeaveOutcome {
                left: true,
                room_removed,
            },
            Some(Departure {
                room_id: room_id.clone(),
                user_id,
                was_in_voice,
                recipients,
            }),
        )
    }

    async fn announce(&self, departure: Departure) {
        let Departure {
            room_id,
            user_id,
            was_in_voice,
            recipients,
        } = departure;
        if was_in_voice {
            let event = ServerEvent::UserLeftVoice {
                room_id: room_id.clone(),
                user_id,
            };
            self.registry.send_to_connections(&recipients, &event).await;
        }
        let event = ServerEvent::UserLeftRoom {
            room_id: room_id.clone(),
            user_id,
        };
        self.registry.send_to_connections(&recipients, &event).await;
        debug!(room_id = %room_id, user_id = %user_id, "left room");
    }

    /// Mark a member as in or out of the room's voice channel.
    /// Returns the connections of the other members when membership changed, `None` otherwise.
    pub async fn set_voice(
        &self,
        room_id: &RoomId,
        user_id: Uuid,
        in_voice: bool,
    ) -> AppResult<Option<Vec<ConnectionId>>> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(room_id)
            .ok_or_else(|| AppError::InvalidMessage(format!("no such room: {}", room_id)))?;
        room.member_mut(user_id)?;
        let changed = if in_voice {
            room.voice.insert(user_id)
        } else {
            room.voice.remove(&user_id)
        };
        Ok(changed.then(|| room.connections_except(user_id)))
    }

    /// Apply a playback command from a member. Returns the other members' connections.
    pub async fn apply_playback(
        &self,
        room_id: &RoomId,
        user_id: Uuid,
        command: &PlaybackCommand,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<ConnectionId>> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(room_id)
            .ok_or_else(|| AppError::InvalidMessage(format!("no such room: {}", room_id)))?;
        room.member_mut(user_id)?;
        room.playback.apply(command, user_id, at)?;
        Ok(room.connections_except(user_id))
    }

    pub async fn snapshot(&self, room_id: &RoomId) -> Option<RoomSnapshot> {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).map(|room| room.snapshot(room_id))
    }

    pub async fn members(&self, room_id: &RoomId) -> HashSet<Uuid> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room_id)
            .map(|room| room.members.keys().copied().collect())
            .unwrap_or_default()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct Peer {
        identity: Identity,
        conn: ConnectionId,
        rx: mpsc::UnboundedReceiver<String>,
    }

    impl Peer {
        fn events(&mut self) -> Vec<String> {
            let mut out = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
                out.push(json["event"].as_str().unwrap().to_string());
            }
            out
        }
    }

    async fn peer(registry: &ConnectionRegistry, name: &str) -> Peer {
        let identity = Identity::new(Uuid::new_v4(), name);
        let conn = ConnectionId::generate();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(conn.clone(), identity.clone(), tx).await;
        Peer { identity, conn, rx }
    }

    fn room(id: &str) -> RoomId {
        RoomId::parse(id).unwrap()
    }

    #[tokio::test]
    async fn join_creates_and_leave_removes_room() {
        let registry = ConnectionRegistry::new();
        let rooms = RoomService::new(registry.clone());
        let alice = peer(&registry, "alice").await;
        let r = room("movie");

        let outcome = rooms.join(&r, &alice.identity, &alice.conn).await;
        assert!(outcome.room_created && outcome.newly_joined);
        assert_eq!(rooms.room_count().await, 1);

        let outcome = rooms.leave(&r, alice.identity.user_id, &alice.conn).await;
        assert!(outcome.left && outcome.room_removed);
        assert_eq!(rooms.room_count().await, 0);
        assert!(rooms.snapshot(&r).await.is_none());
    }

    #[tokio::test]
    async fn join_twice_notifies_once() {
        let registry = ConnectionRegistry::new();
        let rooms = RoomService::new(registry.clone());
        let mut alice = peer(&registry, "alice").await;
        let mut bob = peer(&registry, "bob").await;
        let r = room("movie");

        rooms.join(&r, &alice.identity, &alice.conn).await;
        rooms.join(&r, &bob.identity, &bob.conn).await;
        let again = rooms.join(&r, &bob.identity, &bob.conn).await;
        assert_eq!(again, JoinOutcome::default());

        assert_eq!(alice.events(), vec!["room_state", "user_joined_room"]);
        assert_eq!(bob.events(), vec!["room_state"]);
        assert_eq!(rooms.members(&r).await.len(), 2);
    }

    #[tokio::test]
    async fn leave_not_joined_is_noop() {
        let registry = ConnectionRegistry::new();
        let rooms = RoomService::new(registry.clone());
        let alice = peer(&registry, "alice").await;
        let outcome = rooms.leave(&room("nowhere"), alice.identity.user_id, &alice.conn).await;
        assert_eq!(outcome, LeaveOutcome::default());
    }

    #[tokio::test]
    async fn membership_follows_last_operation_per_user() {
        let registry = ConnectionRegistry::new();
        let rooms = RoomService::new(registry.clone());
        let a = peer(&registry, "a").await;
        let b = peer(&registry, "b").await;
        let c = peer(&registry, "c").await;
        let r = room("replay");

        rooms.join(&r, &a.identity, &a.conn).await;
        rooms.join(&r, &b.identity, &b.conn).await;
        rooms.join(&r, &a.identity, &a.conn).await;
        rooms.leave(&r, b.identity.user_id, &b.conn).await;
        rooms.join(&r, &c.identity, &c.conn).await;
        rooms.leave(&r, c.identity.user_id, &c.conn).await;
        rooms.join(&r, &b.identity, &b.conn).await;

        let expected: HashSet<Uuid> = [a.identity.user_id, b.identity.user_id].into();
        assert_eq!(rooms.members(&r).await, expected);
    }

    #[tokio::test]
    async fn second_tab_keeps_membership_until_it_leaves() {
        let registry = ConnectionRegistry::new();
        let rooms = RoomService::new(registry.clone());
        let alice = peer(&registry, "alice").await;
        let mut bob = peer(&registry, "bob").await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let alice_tab = ConnectionId::generate();
        registry.register(alice_tab.clone(), alice.identity.clone(), tx).await;
        let r = room("tabs");

        rooms.join(&r, &bob.identity, &bob.conn).await;
        rooms.join(&r, &alice.identity, &alice.conn).await;
        rooms.join(&r, &alice.identity, &alice_tab).await;
        bob.events();

        let first = rooms.leave(&r, alice.identity.user_id, &alice.conn).await;
        assert!(!first.left);
        assert!(bob.events().is_empty());

        let second = rooms.leave(&r, alice.identity.user_id, &alice_tab).await;
        assert!(second.left && !second.room_removed);
        assert_eq!(bob.events(), vec!["user_left_room"]);
    }

    #[tokio::test]
    async fn closing_connection_leaves_every_room() {
        let registry = ConnectionRegistry::new();
        let rooms = RoomService::new(registry.clone());
        let alice = peer(&registry, "alice").await;
        let mut bob = peer(&registry, "bob").await;
        let (r1, r2) = (room("one"), room("two"));

        rooms.join(&r1, &alice.identity, &alice.conn).await;
        rooms.join(&r2, &alice.identity, &alice.conn).await;
        rooms.join(&r1, &bob.identity, &bob.conn).await;
        rooms
            .set_voice(&r1, alice.identity.user_id, true)
            .await
            .unwrap();
        bob.events();

        let mut left = rooms.remove_connection(alice.identity.user_id, &alice.conn).await;
        left.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(left, vec![r1.clone(), r2.clone()]);
        assert_eq!(bob.events(), vec!["user_left_voice", "user_left_room"]);
        assert_eq!(rooms.room_count().await, 1);
        assert!(rooms.snapshot(&r2).await.is_none());
    }

    #[tokio::test]
    async fn voice_requires_membership() {
        let registry = ConnectionRegistry::new();
        let rooms = RoomService::new(registry.clone());
        let alice = peer(&registry, "alice").await;
        let bob = peer(&registry, "bob").await;
        let r = room("voice");
        rooms.join(&r, &alice.identity, &alice.conn).await;

        assert!(rooms.set_voice(&r, bob.identity.user_id, true).await.is_err());
        assert!(rooms
            .set_voice(&r, alice.identity.user_id, true)
            .await
            .unwrap()
            .is_some());
        assert!(rooms
            .set_voice(&r, alice.identity.user_id, true)
            .await
            .unwrap()
            .is_none());

        let snapshot = rooms.snapshot(&r).await.unwrap();
        assert!(snapshot.members[0].in_voice);
    }

    #[tokio::test]
    async fn playback_rejects_non_members() {
        let registry = ConnectionRegistry::new();
        let rooms = RoomService::new(registry.clone());
        let alice = peer(&registry, "alice").await;
        let r = room("sync");
        rooms.join(&r, &alice.identity, &alice.conn).await;

        let load = PlaybackCommand::Load {
            url: "https://x/video".to_string(),
        };
        assert!(rooms
            .apply_playback(&r, Uuid::new_v4(), &load, Utc::now())
            .await
            .is_err());
        assert!(rooms
            .apply_playback(&r, alice.identity.user_id, &load, Utc::now())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn late_joiner_snapshot_precedes_later_playback() {
        use crate::services::playback::SyncService;

        let registry = ConnectionRegistry::new();
        let rooms = RoomService::new(registry.clone());
        let sync = SyncService::new(rooms.clone(), registry.clone());
        let alice = peer(&registry, "alice").await;
        let mut bob = peer(&registry, "bob").await;
        let r = room("race");
        rooms.join(&r, &alice.identity, &alice.conn).await;
        let load = PlaybackCommand::Load {
            url: "https://x/video".to_string(),
        };
        sync.apply(&r, &alice.identity, &load).await.unwrap();

        let driver = {
            let (sync, r, identity) = (sync.clone(), r.clone(), alice.identity.clone());
            tokio::spawn(async move {
                for i in 1..=200 {
                    let seek = PlaybackCommand::Seek {
                        position: i as f64,
                        playing: true,
                    };
                    sync.apply(&r, &identity, &seek).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        tokio::task::yield_now().await;
        rooms.join(&r, &bob.identity, &bob.conn).await;
        driver.await.unwrap();

        let mut frames = Vec::new();
        while let Ok(frame) = bob.rx.try_recv() {
            frames.push(serde_json::from_str::<serde_json::Value>(&frame).unwrap());
        }
        assert_eq!(frames[0]["event"], "room_state");
        let seen = frames[0]["data"]["playback"]["positionSeconds"].as_f64().unwrap();
        for frame in &frames[1..] {
            assert_eq!(frame["event"], "video_sync");
            assert!(frame["data"]["timestamp"].as_f64().unwrap() > seen);
        }
    }
}
