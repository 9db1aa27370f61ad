//! Auth HTTP handlers: register, login.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::AuthAppService;
use crate::db::{user_create, user_exists, user_find_by_login, UserRow};
use crate::error::AppError;
use crate::handlers::http::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 20))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub avatar: String,
}

impl From<UserRow> for UserInfo {
    fn from(user: UserRow) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username,
            email: user.email,
            avatar: user.avatar,
        }
    }
}

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    body.validate().map_err(|e| AppError::Validation(e.to_string()))?;
    let username = body.username.trim();
    let email = AuthAppService::normalize_email(&body.email);
    AuthAppService::validate_email(&email)?;

    if user_exists(state.db(), &email, username).await? {
        return Err(AppError::Validation("User already exists".to_string()));
    }

    let password_hash = AuthAppService::hash_password(&body.password)?;
    let user = user_create(state.db(), username, &email, &password_hash).await?;
    let token = state.jwt_secret().issue(user.id, &user.username)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: user.into(),
        }),
    ))
}

/// POST /auth/login: by email or username.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let email = body.email.as_deref().map(AuthAppService::normalize_email);
    let username = body.username.as_deref().map(str::trim);
    if email.is_none() && username.is_none() {
        return Err(AppError::Validation(
            "Either email or username is required".to_string(),
        ));
    }

    let user = user_find_by_login(state.db(), email.as_deref(), username)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("Invalid credentials".to_string()))?;

    if !AuthAppService::verify_password(&body.password, &user.password_hash)? {
        return Err(AppError::Unauthenticated("Invalid credentials".to_string()));
    }

    let token = state.jwt_secret().issue(user.id, &user.username)?;

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}
