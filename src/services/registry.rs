//! Connection registry: maps live connections to identities and delivers outbound frames.
//!
//! Each user's connections form that user's private channel. Targeted relays
//! (`send_to_user`) and room broadcasts (`send_to_connections`) both resolve to
//! connection handles here and write to the same per-connection outbound queue.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::event::ServerEvent;
use crate::models::identity::Identity;
use crate::models::presence::ConnectionId;

/// Outbound queue of serialized frames for one connection.
pub type OutboundSender = mpsc::UnboundedSender<String>;

struct ConnectionEntry {
    identity: Identity,
    sender: OutboundSender,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    by_user: HashMap<Uuid, HashSet<ConnectionId>>,
}

/// Result of removing a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Unregistered {
    pub identity: Identity,
    /// True when no other connection remains for this user.
    pub last_for_user: bool,
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

fn encode(event: &ServerEvent) -> Option<String> {
    match event.to_frame() {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(error = %e, "failed to encode outbound event");
            None
        }
    }
}

impl RegistryInner {
    fn deliver(&self, conn: &ConnectionId, frame: &str) -> bool {
        self.connections
            .get(conn)
            .map(|entry| entry.sender.send(frame.to_string()).is_ok())
            .unwrap_or(false)
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `conn` to `identity`. Returns true when this is the user's first live connection.
    /// Registering an already known handle changes nothing and returns false.
    pub async fn register(&self, conn: ConnectionId, identity: Identity, sender: OutboundSender) -> bool {
        let mut inner = self.inner.write().await;
        if inner.connections.contains_key(&conn) {
            return false;
        }
        let user_conns = inner.by_user.entry(identity.user_id).or_default();
        let first = user_conns.is_empty();
        user_conns.insert(conn.clone());
        debug!(socket_id = %conn, user_id = %identity.user_id, first, "connection registered");
        inner.connections.insert(conn, ConnectionEntry { identity, sender });
        first
    }

    /// Remove `conn`. Returns `None` if it was not registered.
    pub async fn unregister(&self, conn: &ConnectionId) -> Option<Unregistered> {
        let mut inner = self.inner.write().await;
        let entry = inner.connections.remove(conn)?;
        let user_id = entry.identity.user_id;
        let last_for_user = match inner.by_user.get_mut(&user_id) {
            Some(set) => {
                set.remove(conn);
                set.is_empty()
            }
            None => true,
        };
        if last_for_user {
            inner.by_user.remove(&user_id);
        }
        debug!(socket_id = %conn, user_id = %user_id, last_for_user, "connection unregistered");
        Some(Unregistered {
            identity: entry.identity,
            last_for_user,
        })
    }

    /// All live connections of a user (empty when offline).
    pub async fn lookup(&self, user_id: Uuid) -> HashSet<ConnectionId> {
        let inner = self.inner.read().await;
        inner.by_user.get(&user_id).cloned().unwrap_or_default()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        let inner = self.inner.read().await;
        inner.by_user.contains_key(&user_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// Deliver to every connection of `user_id`. Offline users are a silent no-op.
    pub async fn send_to_user(&self, user_id: Uuid, event: &ServerEvent) -> usize {
        let Some(frame) = encode(event) else { return 0 };
        let inner = self.inner.read().await;
        inner
            .by_user
            .get(&user_id)
            .map(|conns| conns.iter().filter(|c| inner.deliver(c, &frame)).count())
            .unwrap_or(0)
    }

    /// Deliver to every connection of each listed user.
    pub async fn send_to_users<'a, I>(&self, users: I, event: &ServerEvent) -> usize
    where
        I: IntoIterator<Item = &'a Uuid>,
    {
        let Some(frame) = encode(event) else { return 0 };
        let inner = self.inner.read().await;
        users
            .into_iter()
            .filter_map(|u| inner.by_user.get(u))
            .flat_map(|conns| conns.iter())
            .filter(|c| inner.deliver(c, &frame))
            .count()
    }

    pub async fn send_to_connection(&self, conn: &ConnectionId, event: &ServerEvent) -> bool {
        let Some(frame) = encode(event) else { return false };
        self.inner.read().await.deliver(conn, &frame)
    }

    pub async fn send_to_connections(&self, conns: &[ConnectionId], event: &ServerEvent) -> usize {
        if conns.is_empty() {
            return 0;
        }
        let Some(frame) = encode(event) else { return 0 };
        let inner = self.inner.read().await;
        conns.iter().filter(|c| inner.deliver(c, &frame)).count()
    }

    /// Deliver to every live connection except `except`.
    pub async fn broadcast_except(&self, except: Option<&ConnectionId>, event: &ServerEvent) -> usize {
        let Some(frame) = encode(event) else { return 0 };
        let inner = self.inner.read().await;
        inner
            .connections
            .iter()
            .filter(|(conn, _)| Some(*conn) != except)
            .filter(|(_, entry)| entry.sender.send(frame.clone()).is_ok())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> Identity {
        Identity::new(Uuid::new_v4(), name)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(frame);
        }
        out
    }

    #[tokio::test]
    async fn register_is_idempotent_per_handle() {
        let registry = ConnectionRegistry::new();
        let alice = identity("alice");
        let conn = ConnectionId::generate();
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(registry.register(conn.clone(), alice.clone(), tx.clone()).await);
        assert!(!registry.register(conn.clone(), alice.clone(), tx).await);
        assert_eq!(registry.lookup(alice.user_id).await.len(), 1);
        assert_eq!(registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn last_connection_is_reported_once() {
        let registry = ConnectionRegistry::new();
        let alice = identity("alice");
        let (c1, c2) = (ConnectionId::generate(), ConnectionId::generate());
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(registry.register(c1.clone(), alice.clone(), tx.clone()).await);
        assert!(!registry.register(c2.clone(), alice.clone(), tx).await);

        let first = registry.unregister(&c1).await.unwrap();
        assert!(!first.last_for_user);
        assert!(registry.is_online(alice.user_id).await);

        let second = registry.unregister(&c2).await.unwrap();
        assert!(second.last_for_user);
        assert!(!registry.is_online(alice.user_id).await);
        assert!(registry.unregister(&c2).await.is_none());
    }

    #[tokio::test]
    async fn send_to_user_reaches_each_connection_once() {
        let registry = ConnectionRegistry::new();
        let (alice, bob) = (identity("alice"), identity("bob"));
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let (tx3, mut rx3) = mpsc::unbounded_channel();
        registry.register(ConnectionId::generate(), alice.clone(), tx1).await;
        registry.register(ConnectionId::generate(), alice.clone(), tx2).await;
        registry.register(ConnectionId::generate(), bob.clone(), tx3).await;

        let sent = registry.send_to_user(alice.user_id, &ServerEvent::Pong).await;
        assert_eq!(sent, 2);
        assert_eq!(drain(&mut rx1).len(), 1);
        assert_eq!(drain(&mut rx2).len(), 1);
        assert!(drain(&mut rx3).is_empty());
    }

    #[tokio::test]
    async fn send_to_offline_user_is_noop() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.send_to_user(Uuid::new_v4(), &ServerEvent::Pong).await, 0);
    }

    #[tokio::test]
    async fn broadcast_skips_origin() {
        let registry = ConnectionRegistry::new();
        let (c1, c2) = (ConnectionId::generate(), ConnectionId::generate());
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.register(c1.clone(), identity("a"), tx1).await;
        registry.register(c2, identity("b"), tx2).await;

        assert_eq!(registry.broadcast_except(Some(&c1), &ServerEvent::Pong).await, 1);
        assert!(drain(&mut rx1).is_empty());
        assert_eq!(drain(&mut rx2).len(), 1);
    }

    #[tokio::test]
    async fn closed_receiver_is_not_counted() {
        let registry = ConnectionRegistry::new();
        let alice = identity("alice");
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(ConnectionId::generate(), alice.clone(), tx).await;
        drop(rx);
        assert_eq!(registry.send_to_user(alice.user_id, &ServerEvent::Pong).await, 0);
    }
}
