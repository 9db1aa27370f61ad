//! Auth extractors: Bearer JWT for REST routes; token at handshake for WebSocket sessions.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::http::AppState;
use crate::models::identity::Identity;

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

async fn bearer_token(parts: &mut Parts, state: &AppState) -> Option<String> {
    TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
        .await
        .ok()
        .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string())
}

/// Extractor: authenticated user ID from JWT (Bearer token).
#[derive(Clone, Copy, Debug)]
pub struct AuthUser(pub Uuid);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts, state)
            .await
            .ok_or_else(|| AppError::Unauthenticated("Missing or invalid Authorization header".to_string()))?;
        let verified = state.jwt_secret().verify(&token)?;
        Ok(AuthUser(verified.user_id))
    }
}

/// Extractor: identity for a WebSocket session, verified before the upgrade.
/// Token comes from `?token=` or `Authorization: Bearer`.
#[derive(Clone, Debug)]
pub struct SessionIdentity(pub Identity);

#[axum::async_trait]
impl FromRequestParts<AppState> for SessionIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let from_query = Query::<TokenQuery>::from_request_parts(parts, state)
            .await
            .ok()
            .and_then(|Query(q)| q.token);
        let token = match from_query {
            Some(t) => Some(t),
            None => bearer_token(parts, state).await,
        };
        let token = token.ok_or_else(|| {
            debug!("handshake rejected: no token");
            AppError::Unauthenticated("Missing token".to_string())
        })?;

        let verified = state.jwt_secret().verify(&token).map_err(|e| {
            debug!(error = %e, "handshake rejected");
            e
        })?;

        let display_name = match verified.username {
            Some(name) => name,
            None => match state.directory().display_name(verified.user_id).await {
                Ok(Some(name)) => name,
                Ok(None) => verified.user_id.to_string(),
                Err(e) => {
                    warn!(user_id = %verified.user_id, error = %e, "display name lookup failed");
                    verified.user_id.to_string()
                }
            },
        };
        Ok(SessionIdentity(Identity::new(verified.user_id, display_name)))
    }
}
