//! Queries: users, friendships, messages.

use crate::error::AppResult;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::DbPool;
use crate::models::chat::ChatMessage;

// ---- User ----

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub avatar: String,
    pub created_at: DateTime<Utc>,
}

const USER_COLUMNS: &str = "id, username, email, password_hash, avatar, created_at";

pub async fn user_create(
    pool: &DbPool,
    username: &str,
    email: &str,
    password_hash: &str,
) -> AppResult<UserRow> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        INSERT INTO users (username, email, password_hash)
        VALUES ($1, $2, $3)
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Which column a login lookup matches on. Email wins when both are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginKey<'a> {
    Email(&'a str),
    Username(&'a str),
}

impl<'a> LoginKey<'a> {
    fn pick(email: Option<&'a str>, username: Option<&'a str>) -> Option<Self> {
        email
            .filter(|e| !e.is_empty())
            .map(LoginKey::Email)
            .or_else(|| username.filter(|u| !u.is_empty()).map(LoginKey::Username))
    }
}

/// True when either the email or the username is already taken.
pub async fn user_exists(pool: &DbPool, email: &str, username: &str) -> AppResult<bool> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 OR username = $2)",
    )
    .bind(email)
    .bind(username)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

/// Find a user by email, or by username when no email is given.
pub async fn user_find_by_login(
    pool: &DbPool,
    email: Option<&str>,
    username: Option<&str>,
) -> AppResult<Option<UserRow>> {
    let (column, value) = match LoginKey::pick(email, username) {
        Some(LoginKey::Email(e)) => ("email", e),
        Some(LoginKey::Username(u)) => ("username", u),
        None => return Ok(None),
    };
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {} FROM users WHERE {} = $1",
        USER_COLUMNS, column
    ))
    .bind(value)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn user_display_name(pool: &DbPool, id: Uuid) -> AppResult<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT username FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.0))
}

// ---- Friendships ----

/// Friends of a user. Friendships are stored once per direction.
pub async fn friend_ids(pool: &DbPool, user_id: Uuid) -> AppResult<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> =
        sqlx::query_as("SELECT friend_id FROM friendships WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

// ---- Messages ----

#[derive(Debug, FromRow)]
pub struct MessageRow {
    pub id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<MessageRow> for ChatMessage {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            from: row.from_user_id,
            to: row.to_user_id,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

pub async fn message_insert(
    pool: &DbPool,
    from: Uuid,
    to: Uuid,
    content: &str,
) -> AppResult<MessageRow> {
    let row = sqlx::query_as::<_, MessageRow>(
        r#"
        INSERT INTO messages (from_user_id, to_user_id, content)
        VALUES ($1, $2, $3)
        RETURNING id, from_user_id, to_user_id, content, created_at
        "#,
    )
    .bind(from)
    .bind(to)
    .bind(content)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn messages_between(pool: &DbPool, a: Uuid, b: Uuid) -> AppResult<Vec<MessageRow>> {
    let rows = sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT id, from_user_id, to_user_id, content, created_at
        FROM messages
        WHERE (from_user_id = $1 AND to_user_id = $2)
           OR (from_user_id = $2 AND to_user_id = $1)
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(a)
    .bind(b)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_prefers_email() {
        assert_eq!(
            LoginKey::pick(Some("a@b.co"), Some("bob")),
            Some(LoginKey::Email("a@b.co"))
        );
        assert_eq!(LoginKey::pick(None, Some("bob")), Some(LoginKey::Username("bob")));
        assert_eq!(LoginKey::pick(Some(""), Some("bob")), Some(LoginKey::Username("bob")));
        assert_eq!(LoginKey::pick(None, None), None);
    }
}
