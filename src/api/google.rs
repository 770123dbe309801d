/// Google consent flow and token hand-out
///
/// The start endpoint is called with the user's session; the callback comes
/// from the browser after Google's consent screen and is tied back to the user
/// through the stored state. n8n fetches access tokens via the internal endpoint.

use crate::api::{
    auth::{AuthUser, InternalKey},
    AppState,
};
use crate::error::{AppError, AppResult};
use crate::google::AccessToken;
use crate::store::types::normalize_phone;
use axum::{
    extract::{Query, State},
    response::{Json, Redirect},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/google/oauth/start", get(start))
        .route("/google/oauth/callback", get(callback))
        .route("/api/google/token", post(token))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Identifies the user either directly or by phone number
#[derive(Debug, Default, Deserialize)]
pub struct UserRef {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub user_id: i64,
    #[serde(flatten)]
    pub token: AccessToken,
}

/// GET /google/oauth/start
async fn start(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Value>> {
    let url = state.google.start(auth.user.id).await?;
    Ok(Json(json!({ "authorize_url": url })))
}

/// GET /google/oauth/callback?code=...&state=...
async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> AppResult<Redirect> {
    if let Some(error) = query.error {
        tracing::warn!("❌ Google consent was not granted: {}", error);
        return Err(AppError::BadRequest(format!("Google returned an error: {error}")));
    }

    let (code, oauth_state) = match (query.code, query.state) {
        (Some(code), Some(oauth_state)) if !code.is_empty() && !oauth_state.is_empty() => {
            (code, oauth_state)
        }
        _ => return Err(AppError::BadRequest("Missing code or state".into())),
    };

    state.google.complete(&code, &oauth_state).await?;
    Ok(Redirect::to(&state.config.google.post_auth_redirect))
}

/// The user a request from n8n acts for; `user_id` wins over `phone`
pub async fn resolve_user(state: &AppState, user: &UserRef) -> AppResult<i64> {
    match (user.user_id, user.phone.as_deref()) {
        (Some(user_id), _) => Ok(user_id),
        (None, Some(phone)) => {
            let phone = normalize_phone(phone)
                .ok_or_else(|| AppError::BadRequest("Invalid phone number".into()))?;
            Ok(state
                .users
                .get_by_phone(&phone)
                .await?
                .ok_or_else(|| AppError::NotFound("No user with this phone number".into()))?
                .id)
        }
        (None, None) => Err(AppError::BadRequest("Provide user_id or phone".into())),
    }
}

/// Fresh Google access token for a user, called by n8n
///
/// POST /api/google/token
/// Headers: Authorization: Bearer <internal key>
/// Body: { "user_id": 1 } or { "phone": "+1 555 0100" }
async fn token(
    State(state): State<AppState>,
    _key: InternalKey,
    Json(request): Json<UserRef>,
) -> AppResult<Json<TokenResponse>> {
    let user_id = resolve_user(&state, &request).await?;
    let token = state.google.fresh_access_token(user_id).await?;
    tracing::info!("🔑 Issued Google access token for user {}", user_id);
    Ok(Json(TokenResponse { user_id, token }))
}
