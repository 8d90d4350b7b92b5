use anyhow::{Context, anyhow};
use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use turfbook_models::{Account, AppRole};

use crate::error::ApiError;
use crate::server::AppState;

// --- Passwords ---

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("hashing password: {e}"))?;
    Ok(hash.to_string())
}

/// False for a wrong password and for a stored hash we cannot parse.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            debug!("Unreadable password hash: {e}");
            false
        }
    }
}

/// Argon2 is slow on purpose; keep it off the async workers.
pub async fn hash_password_blocking(password: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("password hashing task")?
}

pub async fn verify_password_blocking(password: String, stored: String) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .context("password verification task")
}

// --- Tokens ---

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: AppRole,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 signing keys and token lifetime.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl_hours: u32) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            ttl: Duration::hours(i64::from(ttl_hours)),
        }
    }

    pub fn issue(&self, account: &Account) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: account.id.to_string(),
            email: account.email.clone(),
            role: account.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("signing token")
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation).map(|data| data.claims)
    }
}

// --- Extractors ---

/// The signed-in caller. The role is re-read from the database so that a
/// role change takes effect without a new token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub role: AppRole,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;

        let claims = state.tokens.verify(token).map_err(|e| {
            debug!("Rejected token: {e}");
            ApiError::Unauthorized("invalid or expired token".into())
        })?;
        let id: i64 = claims
            .sub
            .parse()
            .map_err(|_| ApiError::Unauthorized("invalid token subject".into()))?;

        let account = turfbook_db::get_account(&state.pool, id)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("account no longer exists".into()))?;

        Ok(AuthUser {
            id: account.id,
            email: account.email,
            role: account.role,
        })
    }
}

async fn require_role(
    parts: &mut Parts,
    state: &AppState,
    role: AppRole,
) -> Result<AuthUser, ApiError> {
    let user = AuthUser::from_request_parts(parts, state).await?;
    if user.role != role {
        return Err(ApiError::Forbidden(format!("{role} access required")));
    }
    Ok(user)
}

/// A signed-in turf owner.
#[derive(Debug, Clone)]
pub struct OwnerUser(pub AuthUser);

impl FromRequestParts<AppState> for OwnerUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        require_role(parts, state, AppRole::Owner).await.map(OwnerUser)
    }
}

/// A signed-in platform admin.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        require_role(parts, state, AppRole::Admin).await.map(AdminUser)
    }
}
