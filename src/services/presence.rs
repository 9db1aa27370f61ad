//! Presence: flip the online flag when a user's first connection opens or last one closes.
//!
//! The registry's per-user connection set is the reference count. Transitions for one
//! user run one at a time behind a per-user gate that remembers what was last announced;
//! each transition re-reads the registry under the gate, so a reload (old tab closing
//! while a new one opens) always settles on the live state. Store writes are
//! best-effort: failures are logged and the broadcast still goes out.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PresenceScope;
use crate::error::AppResult;
use crate::models::event::ServerEvent;
use crate::models::identity::Identity;
use crate::models::presence::{ConnectionId, PresenceState};
use crate::repositories::{PresenceStore, UserDirectory};
use crate::services::registry::ConnectionRegistry;

/// Last announced online flag for one user.
type Gate = Arc<Mutex<bool>>;

#[derive(Clone)]
pub struct PresenceService {
    registry: ConnectionRegistry,
    store: Arc<dyn PresenceStore>,
    directory: Arc<dyn UserDirectory>,
    scope: PresenceScope,
    gates: Arc<Mutex<HashMap<Uuid, Gate>>>,
}

impl PresenceService {
    pub fn new(
        registry: ConnectionRegistry,
        store: Arc<dyn PresenceStore>,
        directory: Arc<dyn UserDirectory>,
        scope: PresenceScope,
    ) -> Self {
        Self {
            registry,
            store,
            directory,
            scope,
            gates: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Called after `conn` registered. Announces `user_online` unless already announced.
    pub async fn connected(&self, identity: &Identity, conn: &ConnectionId) {
        self.reconcile(identity.user_id, Some(conn)).await;
    }

    /// Called after a connection was removed. Announces `user_offline` once no connection remains.
    pub async fn disconnected(&self, identity: &Identity) {
        self.reconcile(identity.user_id, None).await;
    }

    async fn gate(&self, user_id: Uuid) -> Gate {
        let mut gates = self.gates.lock().await;
        gates.entry(user_id).or_default().clone()
    }

    async fn reconcile(&self, user_id: Uuid, origin: Option<&ConnectionId>) {
        let gate = self.gate(user_id).await;
        let is_online = {
            let mut announced = gate.lock().await;
            let is_online = self.registry.is_online(user_id).await;
            if *announced != is_online {
                if let Err(e) = self.store.set_presence(user_id, is_online, Utc::now()).await {
                    warn!(user_id = %user_id, error = %e, "presence write failed");
                }
                let (event, except) = if is_online {
                    (ServerEvent::UserOnline { user_id }, origin)
                } else {
                    (ServerEvent::UserOffline { user_id }, None)
                };
                let reached = self.announce(user_id, except, &event).await;
                *announced = is_online;
                info!(user_id = %user_id, is_online, reached, "presence changed");
            } else {
                debug!(user_id = %user_id, is_online, "presence unchanged");
            }
            is_online
        };

        if !is_online {
            let mut gates = self.gates.lock().await;
            // Only the map and this call hold the gate: nobody is waiting on it.
            if Arc::strong_count(&gate) == 2 {
                gates.remove(&user_id);
            }
        }
    }

    async fn announce(&self, user_id: Uuid, except: Option<&ConnectionId>, event: &ServerEvent) -> usize {
        match self.scope {
            PresenceScope::Global => self.registry.broadcast_except(except, event).await,
            PresenceScope::Friends => match self.directory.friend_ids(user_id).await {
                Ok(friends) => self.registry.send_to_users(friends.iter(), event).await,
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "friend lookup failed, announcing globally");
                    self.registry.broadcast_except(except, event).await
                }
            },
        }
    }

    /// Current presence of a user. A live connection always reads as online.
    pub async fn lookup(&self, user_id: Uuid) -> AppResult<PresenceState> {
        let stored = match self.store.get_presence(user_id).await {
            Ok(state) => state,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "presence read failed");
                None
            }
        };
        let mut state = stored.unwrap_or_else(|| PresenceState::offline(user_id));
        if self.registry.is_online(user_id).await {
            state.is_online = true;
        }
        Ok(state)
    }
}
