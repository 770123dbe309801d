/// Authentication endpoints and request extractors
///
/// End users authenticate with an opaque session token (`Authorization: Bearer
/// <token>`) obtained from signup or login. n8n and operators authenticate with
/// shared secrets compared in constant time.

use crate::api::AppState;
use crate::error::{AppError, AppResult};
use crate::store::{types::normalize_phone, User};
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::{
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::Json,
    routing::{delete, post},
    Router,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Header n8n may use instead of a bearer token
pub const INTERNAL_KEY_HEADER: &str = "x-internal-api-key";

const MIN_PASSWORD_LEN: usize = 8;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/account", delete(delete_account))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Constant-time comparison; an unset secret never matches
pub fn secret_matches(provided: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
}

/// Logged-in user resolved from the session token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("Missing session token".into()))?
            .to_string();

        let user = state
            .users
            .user_for_session(&token)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid or expired session".into()))?;

        Ok(AuthUser { user, token })
    }
}

/// Caller presented the shared internal secret
#[derive(Debug, Clone, Copy)]
pub struct InternalKey;

impl FromRequestParts<AppState> for InternalKey {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let provided = bearer_token(&parts.headers).or_else(|| {
            parts
                .headers
                .get(INTERNAL_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
        });

        match provided {
            Some(key) if secret_matches(key, &state.config.security.internal_api_key) => Ok(InternalKey),
            _ => {
                tracing::warn!("🚫 Internal endpoint called without a valid key");
                Err(AppError::Unauthorized("Invalid internal API key".into()))
            }
        }
    }
}

/// Caller presented the admin secret
#[derive(Debug, Clone, Copy)]
pub struct AdminKey;

impl FromRequestParts<AppState> for AdminKey {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match bearer_token(&parts.headers) {
            Some(key) if secret_matches(key, state.config.security.admin_key()) => Ok(AdminKey),
            Some(_) => Err(AppError::Forbidden("Invalid admin key".into())),
            None => Err(AppError::Unauthorized("Missing admin key".into())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: User,
}

/// Django-style username rule: letters, digits and @/./+/-/_
fn valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= 150
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to hash password: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

async fn open_session(state: &AppState, user: User) -> AppResult<SessionResponse> {
    let ttl = chrono::Duration::hours(state.config.security.session_ttl_hours.max(1));
    let token = state.users.create_session(user.id, ttl).await?;
    Ok(SessionResponse { token, user })
}

/// Create an account
///
/// POST /api/auth/signup
/// Body: { "username": "...", "password": "...", "email": "...", "phone_number": "..." }
async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> AppResult<(StatusCode, Json<SessionResponse>)> {
    let username = request.username.trim();
    if !valid_username(username) {
        return Err(AppError::BadRequest(
            "Username may only contain letters, digits and @/./+/-/_".into(),
        ));
    }
    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let phone = request.phone_number.as_deref().and_then(normalize_phone);
    if let Some(phone) = &phone {
        if state.users.get_by_phone(phone).await?.is_some() {
            return Err(AppError::Conflict("Phone number is already registered".into()));
        }
    }
    let email = request
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());

    let password_hash = hash_password(&request.password)?;
    let user = match state
        .users
        .create(username, email, phone.as_deref(), &password_hash)
        .await
    {
        Ok(user) => user,
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            return Err(AppError::Conflict("Username is already taken".into()));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!("👤 Created user {} ({})", user.id, user.username);
    let session = open_session(&state, user).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<SessionResponse>> {
    let user = state.users.get_by_username(request.username.trim()).await?;

    match user {
        Some(user) if verify_password(&request.password, &user.password_hash) => {
            tracing::info!("🔓 User {} logged in", user.id);
            Ok(Json(open_session(&state, user).await?))
        }
        _ => Err(AppError::Unauthorized("Invalid username or password".into())),
    }
}

/// POST /api/auth/logout
async fn logout(State(state): State<AppState>, auth: AuthUser) -> AppResult<StatusCode> {
    state.users.delete_session(&auth.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete the account after removing its workflows and credentials from n8n
///
/// DELETE /api/account
async fn delete_account(State(state): State<AppState>, auth: AuthUser) -> AppResult<StatusCode> {
    let removed = state.provisioner.cleanup_user(auth.user.id).await?;
    state.users.delete(auth.user.id).await?;
    tracing::info!(
        "🗑️ Deleted user {} and {} provisioned workflow(s)",
        auth.user.id,
        removed
    );
    Ok(StatusCode::NO_CONTENT)
}
