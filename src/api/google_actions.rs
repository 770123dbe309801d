/// Gmail and Calendar actions n8n performs for a user
///
/// All endpoints take the internal key and identify the user with `user_id`
/// or `phone` next to the action's own fields. Google answers are passed
/// through unchanged.

use crate::api::{
    auth::InternalKey,
    google::{resolve_user, UserRef},
    AppState,
};
use crate::error::AppResult;
use crate::google::api::{EventQuery, LabelChange, MessageQuery, NewEvent, OutgoingEmail, ReplyEmail};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/google/gmail/send", post(gmail_send))
        .route("/api/google/gmail/reply", post(gmail_reply))
        .route("/api/google/gmail/draft", post(gmail_draft))
        .route("/api/google/gmail/labels", post(gmail_labels))
        .route("/api/google/gmail/modify-labels", post(gmail_modify_labels))
        .route("/api/google/gmail/messages", post(gmail_messages))
        .route("/api/google/gmail/watch", post(gmail_watch))
        .route("/api/google/calendar/events", post(calendar_events))
        .route("/api/google/calendar/events/post", post(calendar_create_event))
        .route("/api/google/calendar/events/delete", post(calendar_delete_event))
        .route("/api/google/calendar/watch", post(calendar_watch))
        .route("/webhooks/google/calendar", post(calendar_webhook))
}

/// Body of an action: the user reference plus the action's fields
#[derive(Debug, Deserialize)]
pub struct ForUser<T> {
    #[serde(flatten)]
    pub user: UserRef,
    #[serde(flatten)]
    pub action: T,
}

#[derive(Debug, Deserialize)]
pub struct GmailWatch {
    pub topic_name: String,
    #[serde(default)]
    pub label_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventRef {
    #[serde(default)]
    pub calendar_id: Option<String>,
    pub event_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CalendarWatch {
    #[serde(default)]
    pub calendar_id: Option<String>,
    /// HTTPS URL Google posts change notifications to
    pub address: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// Resolve the user and hand back their id with a usable access token
async fn access_token(state: &AppState, user: &UserRef) -> AppResult<(i64, String)> {
    let user_id = resolve_user(state, user).await?;
    let token = state.google.fresh_access_token(user_id).await?;
    Ok((user_id, token.access_token))
}

/// POST /api/google/gmail/send
/// Body: { "user_id": 1, "to": "bob@example.com", "subject": "...", "body": "..." }
async fn gmail_send(
    State(state): State<AppState>,
    _key: InternalKey,
    Json(request): Json<ForUser<OutgoingEmail>>,
) -> AppResult<Json<Value>> {
    let (user_id, token) = access_token(&state, &request.user).await?;
    let sent = state.google_api.send_message(&token, &request.action).await?;
    tracing::info!("📧 Sent Gmail message {} for user {}", sent["id"], user_id);
    Ok(Json(sent))
}

/// POST /api/google/gmail/reply
async fn gmail_reply(
    State(state): State<AppState>,
    _key: InternalKey,
    Json(request): Json<ForUser<ReplyEmail>>,
) -> AppResult<Json<Value>> {
    let (user_id, token) = access_token(&state, &request.user).await?;
    let sent = state.google_api.reply(&token, &request.action).await?;
    tracing::info!("📧 Replied to Gmail message {} for user {}", request.action.message_id, user_id);
    Ok(Json(sent))
}

/// POST /api/google/gmail/draft
async fn gmail_draft(
    State(state): State<AppState>,
    _key: InternalKey,
    Json(request): Json<ForUser<OutgoingEmail>>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let (user_id, token) = access_token(&state, &request.user).await?;
    let draft = state.google_api.create_draft(&token, &request.action).await?;
    tracing::info!("📝 Created Gmail draft {} for user {}", draft["id"], user_id);
    Ok((StatusCode::CREATED, Json(draft)))
}

/// POST /api/google/gmail/labels
async fn gmail_labels(
    State(state): State<AppState>,
    _key: InternalKey,
    Json(user): Json<UserRef>,
) -> AppResult<Json<Value>> {
    let (_, token) = access_token(&state, &user).await?;
    Ok(Json(state.google_api.list_labels(&token).await?))
}

/// POST /api/google/gmail/modify-labels
async fn gmail_modify_labels(
    State(state): State<AppState>,
    _key: InternalKey,
    Json(request): Json<ForUser<LabelChange>>,
) -> AppResult<Json<Value>> {
    let (user_id, token) = access_token(&state, &request.user).await?;
    let message = state.google_api.modify_labels(&token, &request.action).await?;
    tracing::info!("🏷️ Relabelled Gmail message {} for user {}", request.action.message_id, user_id);
    Ok(Json(message))
}

/// POST /api/google/gmail/messages
async fn gmail_messages(
    State(state): State<AppState>,
    _key: InternalKey,
    Json(request): Json<ForUser<MessageQuery>>,
) -> AppResult<Json<Value>> {
    let (_, token) = access_token(&state, &request.user).await?;
    Ok(Json(state.google_api.list_messages(&token, &request.action).await?))
}

/// POST /api/google/gmail/watch
async fn gmail_watch(
    State(state): State<AppState>,
    _key: InternalKey,
    Json(request): Json<ForUser<GmailWatch>>,
) -> AppResult<Json<Value>> {
    let (user_id, token) = access_token(&state, &request.user).await?;
    let watch = &request.action;
    let response = state
        .google_api
        .watch_mailbox(&token, &watch.topic_name, &watch.label_ids)
        .await?;
    tracing::info!("👀 Gmail watch on {} started for user {}", watch.topic_name, user_id);
    Ok(Json(response))
}

/// POST /api/google/calendar/events
/// Body: { "phone": "...", "time_min": "2026-03-01T00:00:00Z", "max_results": 5 }
async fn calendar_events(
    State(state): State<AppState>,
    _key: InternalKey,
    Json(request): Json<ForUser<EventQuery>>,
) -> AppResult<Json<Value>> {
    let (_, token) = access_token(&state, &request.user).await?;
    Ok(Json(state.google_api.list_events(&token, &request.action).await?))
}

/// POST /api/google/calendar/events/post
async fn calendar_create_event(
    State(state): State<AppState>,
    _key: InternalKey,
    Json(request): Json<ForUser<NewEvent>>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let (user_id, token) = access_token(&state, &request.user).await?;
    let event = state.google_api.create_event(&token, &request.action).await?;
    tracing::info!("📅 Created calendar event {} for user {}", event["id"], user_id);
    Ok((StatusCode::CREATED, Json(event)))
}

/// POST /api/google/calendar/events/delete
async fn calendar_delete_event(
    State(state): State<AppState>,
    _key: InternalKey,
    Json(request): Json<ForUser<EventRef>>,
) -> AppResult<StatusCode> {
    let (user_id, token) = access_token(&state, &request.user).await?;
    let event = &request.action;
    state
        .google_api
        .delete_event(&token, event.calendar_id.as_deref(), &event.event_id)
        .await?;
    tracing::info!("🗑️ Deleted calendar event {} for user {}", event.event_id, user_id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/google/calendar/watch
async fn calendar_watch(
    State(state): State<AppState>,
    _key: InternalKey,
    Json(request): Json<ForUser<CalendarWatch>>,
) -> AppResult<Json<Value>> {
    let (user_id, token) = access_token(&state, &request.user).await?;
    let watch = &request.action;
    let channel = state
        .google_api
        .watch_calendar(
            &token,
            watch.calendar_id.as_deref(),
            &watch.address,
            watch.token.as_deref(),
        )
        .await?;
    tracing::info!("👀 Calendar channel {} opened for user {}", channel["id"], user_id);
    Ok(Json(channel))
}

/// Push notification from Google Calendar
///
/// POST /webhooks/google/calendar
/// Google only needs a 2xx; the change itself is fetched by whoever owns the channel.
async fn calendar_webhook(headers: HeaderMap) -> Json<Value> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string()
    };
    tracing::info!(
        "📬 Calendar notification: channel {} state {} resource {}",
        header("x-goog-channel-id"),
        header("x-goog-resource-state"),
        header("x-goog-resource-id")
    );
    Json(json!({ "received": true }))
}
