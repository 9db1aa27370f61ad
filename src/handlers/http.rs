//! HTTP handlers: health, chat history, room snapshot, presence lookup.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::JwtSecret;
use crate::db::DbPool;
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::chat::ChatMessage;
use crate::models::presence::PresenceState;
use crate::models::room::{RoomId, RoomSnapshot};
use crate::repositories::UserDirectory;
use crate::services::Hub;

/// Shared application state for HTTP and WS handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub db: DbPool,
    pub jwt_secret: JwtSecret,
    pub directory: Arc<dyn UserDirectory>,
}

impl AppState {
    pub fn db(&self) -> &DbPool {
        &self.db
    }
    pub fn jwt_secret(&self) -> &JwtSecret {
        &self.jwt_secret
    }
    pub fn hub(&self) -> &Hub {
        &self.hub
    }
    pub fn directory(&self) -> &dyn UserDirectory {
        self.directory.as_ref()
    }
}

/// GET /health: liveness probe.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let connections = state.hub().registry().connection_count().await;
    let rooms = state.hub().rooms().room_count().await;
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "chillhub",
            "connections": connections,
            "rooms": rooms
        })),
    )
}

/// GET /api/chat/:friend_id: conversation with a friend, oldest first.
pub async fn chat_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(friend_id): Path<Uuid>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    let messages = state.hub().relay().history(user_id, friend_id).await?;
    Ok(Json(messages))
}

/// GET /api/rooms/:room_id: current members and playback of a live room.
pub async fn room_snapshot(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(room_id): Path<String>,
) -> Result<Json<RoomSnapshot>, AppError> {
    let room_id = RoomId::parse(&room_id)?;
    state
        .hub()
        .rooms()
        .snapshot(&room_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("room {}", room_id)))
}

/// GET /api/presence/:user_id
pub async fn presence(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<PresenceState>, AppError> {
    Ok(Json(state.hub().presence().lookup(user_id).await?))
}
