use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::info;
use turfbook_db::ProfileUpdate;
use turfbook_models::{Account, AppRole, Profile};

use crate::auth::{self, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Deserialize)]
pub struct SignupRequest {
    email: String,
    password: String,
    full_name: String,
    #[serde(default = "default_role")]
    role: AppRole,
}

fn default_role() -> AppRole {
    AppRole::Player
}

#[derive(Deserialize)]
pub struct SigninRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
pub struct Session {
    token: String,
    user: Account,
}

fn normalize_email(email: &str) -> ApiResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ApiError::bad_request("a valid email address is required")),
    }
}

pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    let email = normalize_email(&body.email)?;
    if body.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let full_name = body.full_name.trim();
    if full_name.is_empty() {
        return Err(ApiError::bad_request("full name is required"));
    }
    if body.role == AppRole::Admin {
        return Err(ApiError::Forbidden("admin accounts cannot be self-registered".into()));
    }

    let hash = auth::hash_password_blocking(body.password).await?;
    let account = match turfbook_db::create_account(&state.pool, &email, &hash, full_name, body.role).await {
        Ok(account) => account,
        Err(e) if turfbook_db::is_unique_violation(&e) => {
            return Err(ApiError::Conflict("an account with this email already exists".into()));
        }
        Err(e) => return Err(e.into()),
    };
    info!("New {} account {} ({})", account.role, account.id, account.email);

    let token = state.tokens.issue(&account)?;
    Ok((StatusCode::CREATED, Json(Session { token, user: account })))
}

pub async fn signin(
    State(state): State<AppState>,
    Json(body): Json<SigninRequest>,
) -> ApiResult<Json<Session>> {
    let rejected = || ApiError::Unauthorized("invalid email or password".into());
    let email = body.email.trim().to_lowercase();

    let creds = turfbook_db::find_credentials(&state.pool, &email)
        .await?
        .ok_or_else(rejected)?;
    if !auth::verify_password_blocking(body.password, creds.password_hash).await? {
        return Err(rejected());
    }

    let token = state.tokens.issue(&creds.account)?;
    Ok(Json(Session { token, user: creds.account }))
}

pub async fn me(user: AuthUser) -> Json<Account> {
    Json(Account {
        id: user.id,
        email: user.email,
        role: user.role,
    })
}

// --- Profile ---

#[derive(Deserialize)]
pub struct ProfileRequest {
    full_name: Option<String>,
    phone: Option<String>,
    city: Option<String>,
}

pub async fn get_profile(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Profile>> {
    turfbook_db::get_profile(&state.pool, user.id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Profile"))
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<ProfileRequest>,
) -> ApiResult<Json<Profile>> {
    let full_name = body.full_name.map(|n| n.trim().to_string());
    if full_name.as_deref() == Some("") {
        return Err(ApiError::bad_request("full name cannot be empty"));
    }
    let update = ProfileUpdate {
        full_name,
        phone: body.phone.map(|p| p.trim().to_string()),
        city: body.city.map(|c| c.trim().to_string()),
    };
    turfbook_db::update_profile(&state.pool, user.id, &update)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Profile"))
}
