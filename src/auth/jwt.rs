//! Credential issue and verification (HS256 JWT).

use crate::error::{AppError, AppResult};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

/// Outcome of verifying a credential. `username` is absent on tokens minted without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub user_id: Uuid,
    pub username: Option<String>,
}

#[derive(Clone)]
pub struct JwtSecret {
    secret: String,
    ttl: Duration,
}

impl JwtSecret {
    pub fn new(secret: String, ttl_days: i64) -> Self {
        Self {
            secret,
            ttl: Duration::days(ttl_days),
        }
    }

    pub fn issue(&self, user_id: Uuid, username: &str) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            username: Some(username.to_string()),
            exp: (now + self.ttl).timestamp(),
            iat: now.timestamp(),
        };
        self.encode_claims(&claims)
    }

    pub(crate) fn encode_claims(&self, claims: &Claims) -> AppResult<String> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("jwt encode: {}", e)))
    }

    /// Check signature and expiry. Every failure is `Unauthenticated`.
    pub fn verify(&self, token: &str) -> AppResult<VerifiedToken> {
        if token.trim().is_empty() {
            return Err(AppError::Unauthenticated("missing token".to_string()));
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| AppError::Unauthenticated(e.to_string()))?;
        let user_id = Uuid::parse_str(&data.claims.sub)
            .map_err(|e| AppError::Unauthenticated(format!("bad subject: {}", e)))?;
        Ok(VerifiedToken {
            user_id,
            username: data.claims.username.filter(|n| !n.trim().is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> JwtSecret {
        JwtSecret::new("test-jwt-secret-min-32-chars!!!!".to_string(), 7)
    }

    #[test]
    fn issued_token_verifies() {
        let id = Uuid::new_v4();
        let token = secret().issue(id, "alice").unwrap();
        let verified = secret().verify(&token).unwrap();
        assert_eq!(verified.user_id, id);
        assert_eq!(verified.username.as_deref(), Some("alice"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = secret().issue(Uuid::new_v4(), "alice").unwrap();
        let other = JwtSecret::new("another-secret-that-is-32-chars-long".to_string(), 7);
        assert!(matches!(other.verify(&token), Err(AppError::Unauthenticated(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let now = Utc::now().timestamp();
        let token = secret()
            .encode_claims(&Claims {
                sub: Uuid::new_v4().to_string(),
                username: Some("alice".to_string()),
                exp: now - 10,
                iat: now - 100,
            })
            .unwrap();
        assert!(matches!(secret().verify(&token), Err(AppError::Unauthenticated(_))));
    }

    #[test]
    fn missing_and_garbage_tokens_are_rejected() {
        assert!(secret().verify("").is_err());
        assert!(secret().verify("not.a.jwt").is_err());
    }

    #[test]
    fn username_claim_is_optional() {
        let now = Utc::now().timestamp();
        let id = Uuid::new_v4();
        let token = secret()
            .encode_claims(&Claims {
                sub: id.to_string(),
                username: None,
                exp: now + 60,
                iat: now,
            })
            .unwrap();
        let verified = secret().verify(&token).unwrap();
        assert_eq!(verified.user_id, id);
        assert!(verified.username.is_none());
    }
}
