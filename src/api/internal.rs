/// Phone-number lookups n8n performs before acting on an incoming message
///
/// All endpoints require the internal key. Phone numbers are compared by their
/// digits only, so `+1 (876) 595-2596` and `18765952596` are the same number.

use crate::api::{auth::InternalKey, AppState};
use crate::error::{AppError, AppResult};
use crate::store::{types::normalize_phone, User};
use axum::{extract::State, response::Json, routing::post, Router};
use serde::{Deserialize, Serialize};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/phone/allowed", post(phone_allowed))
        .route("/api/phone/username", post(phone_username))
        .route("/api/phone/active-service", post(phone_active_service))
}

#[derive(Debug, Deserialize)]
pub struct PhoneRequest {
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct AllowedResponse {
    pub allowed: bool,
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UsernameResponse {
    pub user_id: i64,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct ActiveServiceResponse {
    pub user_id: i64,
    /// Slug of the active service, `null` when nothing is active
    pub active_service: Option<String>,
    pub service_name: Option<String>,
}

async fn lookup(state: &AppState, raw: &str) -> AppResult<Option<User>> {
    let phone = normalize_phone(raw).ok_or_else(|| AppError::BadRequest("Invalid phone number".into()))?;
    Ok(state.users.get_by_phone(&phone).await?)
}

async fn require_user(state: &AppState, raw: &str) -> AppResult<User> {
    lookup(state, raw)
        .await?
        .ok_or_else(|| AppError::NotFound("No user with this phone number".into()))
}

/// Whether the number belongs to a registered user
///
/// POST /api/phone/allowed
async fn phone_allowed(
    State(state): State<AppState>,
    _key: InternalKey,
    Json(request): Json<PhoneRequest>,
) -> AppResult<Json<AllowedResponse>> {
    let user = lookup(&state, &request.phone).await?;
    Ok(Json(AllowedResponse {
        allowed: user.is_some(),
        user_id: user.map(|u| u.id),
    }))
}

/// POST /api/phone/username
async fn phone_username(
    State(state): State<AppState>,
    _key: InternalKey,
    Json(request): Json<PhoneRequest>,
) -> AppResult<Json<UsernameResponse>> {
    let user = require_user(&state, &request.phone).await?;
    Ok(Json(UsernameResponse {
        user_id: user.id,
        username: user.username,
    }))
}

/// Which service should handle messages from this number
///
/// POST /api/phone/active-service
async fn phone_active_service(
    State(state): State<AppState>,
    _key: InternalKey,
    Json(request): Json<PhoneRequest>,
) -> AppResult<Json<ActiveServiceResponse>> {
    let user = require_user(&state, &request.phone).await?;
    let service = state.provisioner.active_service(user.id).await?;

    Ok(Json(ActiveServiceResponse {
        user_id: user.id,
        service_name: service.as_ref().map(|s| s.name.clone()),
        active_service: service.map(|s| s.slug),
    }))
}
