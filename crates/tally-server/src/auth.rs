//! Password hashing and bearer-token issuance.
//!
//! Tokens are HS256 JWTs carrying the user id, valid for 72 hours.  The
//! `Authorization` header carries the raw token; a `Bearer ` prefix is
//! tolerated.  Handlers receive the authenticated user through the
//! [`AuthUser`] extractor instead of a middleware.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts, StatusCode};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::state::AppState;

const TOKEN_TTL_HOURS: i64 = 72;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to hash password")]
    Hash(#[source] bcrypt::BcryptError),
    #[error("hashing task failed")]
    HashTask,
    #[error("failed to sign token")]
    Sign(#[source] jsonwebtoken::errors::Error),
    #[error("invalid token")]
    InvalidToken,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    user_id: i64,
    iat: i64,
    exp: i64,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AuthService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl AuthService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(TOKEN_TTL_HOURS),
        }
    }

    pub fn generate_token(&self, user_id: i64) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            user_id,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(AuthError::Sign)
    }

    /// Validate signature and expiry, returning the user id.
    pub fn parse_token(&self, token: &str) -> Result<i64, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|_| AuthError::InvalidToken)?;
        Ok(data.claims.user_id)
    }

    /// bcrypt is deliberately slow; keep it off the async worker threads.
    pub async fn hash_password(&self, password: String) -> Result<String, AuthError> {
        tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
            .await
            .map_err(|_| AuthError::HashTask)?
            .map_err(AuthError::Hash)
    }

    pub async fn verify_password(&self, password: String, hash: String) -> bool {
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
            .await
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// The authenticated user id, extracted from the `Authorization` header.
/// Missing or invalid credentials reject with an empty 401.
pub struct AuthUser(pub i64);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(StatusCode::UNAUTHORIZED)?;
        let token = header.strip_prefix("Bearer ").unwrap_or(header);

        let user_id = state.auth.parse_token(token).map_err(|err| {
            debug!(error = %err, "rejected token");
            StatusCode::UNAUTHORIZED
        })?;

        Ok(AuthUser(user_id))
    }
}
