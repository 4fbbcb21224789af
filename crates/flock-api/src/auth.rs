use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Duration;
use rand_core::OsRng;

use flock_db::Database;
use flock_gateway::actions::ActionService;
use flock_gateway::auth::issue_token;
use flock_types::api::{AuthResponse, LoginRequest, RegisterRequest};
use flock_types::models::User;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub actions: ActionService,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::BadRequest("username must be 3-32 characters".into()));
    }
    if !req.email.contains('@') {
        return Err(ApiError::BadRequest("email is invalid".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest("password must be at least 8 characters".into()));
    }

    let password_hash = hash_password(&req.password)?;

    let RegisterRequest { username, email, .. } = req;
    let row = state
        .db
        .call(move |db| db.create_user(&username, &email, &password_hash))
        .await?;

    let user: User = row.into();
    let token = issue_token(&state.jwt_secret, user.id, &user.username, state.token_ttl)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = || ApiError::Unauthorized("invalid credentials".into());

    let username = req.username.clone();
    let row = state
        .db
        .call(move |db| db.get_user_by_username(&username))
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&req.password, &row.password)? {
        return Err(invalid());
    }

    let user: User = row.into();
    let token = issue_token(&state.jwt_secret, user.id, &user.username, state.token_ttl)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(AuthResponse { token, user }))
}

/// Argon2id with a fresh salt from the OS RNG.
fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))?
        .to_string())
}

fn verify_password(password: &str, stored: &str) -> Result<bool, ApiError> {
    let parsed_hash =
        PasswordHash::new(stored).map_err(|e| ApiError::Internal(format!("stored hash unreadable: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
