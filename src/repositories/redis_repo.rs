//! Redis-backed presence store: one hash per user with the online flag and last activity.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::presence::PresenceState;
use crate::repositories::PresenceStore;

const PRESENCE_PREFIX: &str = "chillhub:presence:";
const FIELD_ONLINE: &str = "online";
const FIELD_LAST_ACTIVE: &str = "last_active";

fn presence_key(user_id: Uuid) -> String {
    format!("{}{}", PRESENCE_PREFIX, user_id)
}

/// Redis-backed repository for presence records.
#[derive(Clone)]
pub struct RedisRepository {
    client: Arc<redis::Client>,
}

impl RedisRepository {
    /// Create repository from Redis URL. Does not connect until first use.
    pub fn new(redis_url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Get a multiplexed connection for commands.
    pub async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, AppError> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }
}

/// Decode the stored hash. Missing or unparsable fields read as offline / unknown.
fn decode_presence(user_id: Uuid, fields: &HashMap<String, String>) -> Option<PresenceState> {
    if fields.is_empty() {
        return None;
    }
    let is_online = fields.get(FIELD_ONLINE).map(|v| v == "1").unwrap_or(false);
    let last_active = fields
        .get(FIELD_LAST_ACTIVE)
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
    Some(PresenceState {
        user_id,
        is_online,
        last_active,
    })
}

#[async_trait]
impl PresenceStore for RedisRepository {
    #[instrument(skip(self))]
    async fn set_presence(
        &self,
        user_id: Uuid,
        is_online: bool,
        last_active: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut conn = self.connection().await?;
        let online = if is_online { "1" } else { "0" };
        conn.hset_multiple::<_, _, _, ()>(
            presence_key(user_id),
            &[
                (FIELD_ONLINE, online.to_string()),
                (FIELD_LAST_ACTIVE, last_active.timestamp_millis().to_string()),
            ],
        )
        .await?;
        debug!(user_id = %user_id, is_online, "presence stored");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_presence(&self, user_id: Uuid) -> AppResult<Option<PresenceState>> {
        let mut conn = self.connection().await?;
        let fields: HashMap<String, String> = conn.hgetall(presence_key(user_id)).await?;
        Ok(decode_presence(user_id, &fields))
    }
}
