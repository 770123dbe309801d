/// Service catalog, unlock and toggle endpoints

use crate::api::{auth::AuthUser, AppState};
use crate::error::{AppError, AppResult};
use crate::store::{CredentialSchema, Service, UserWorkflow};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/services", get(list_services))
        .route("/api/services/{slug}", get(get_service))
        .route("/api/services/{slug}/unlock", post(unlock_service))
        .route("/api/services/{slug}/toggle", post(toggle_service))
        .route("/api/services/{slug}/credential-oauth", get(credential_oauth))
}

/// Catalog entry as seen by a particular user
#[derive(Debug, Serialize)]
pub struct ServiceView {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub unlocked: bool,
    pub active: bool,
}

impl ServiceView {
    fn new(service: &Service, workflow: Option<&UserWorkflow>) -> Self {
        Self {
            slug: service.slug.clone(),
            name: service.name.clone(),
            description: service.description.clone(),
            icon: service.icon.clone(),
            unlocked: workflow.is_some(),
            active: workflow.map(|w| w.active).unwrap_or(false),
        }
    }
}

/// Unlock form: the service plus the credential fields to render
#[derive(Debug, Serialize)]
pub struct ServiceDetail {
    #[serde(flatten)]
    pub service: ServiceView,
    pub credential_fields: CredentialSchema,
    pub workflow: Option<UserWorkflow>,
}

#[derive(Debug, Deserialize)]
pub struct CredentialOAuthQuery {
    pub return_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    /// Omitted means "flip the current state"
    pub active: Option<bool>,
}

async fn active_service_by_slug(state: &AppState, slug: &str) -> AppResult<Service> {
    state
        .services
        .get_by_slug(slug)
        .await?
        .filter(|s| s.is_active)
        .ok_or_else(|| AppError::NotFound(format!("service '{slug}' not found")))
}

/// List active services with the caller's unlock state
///
/// GET /api/services
async fn list_services(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<ServiceView>>> {
    let services = state.services.list(true).await?;
    let workflows: HashMap<i64, UserWorkflow> = state
        .workflows
        .list_for_user(auth.user.id)
        .await?
        .into_iter()
        .map(|w| (w.service_id, w))
        .collect();

    let views = services
        .iter()
        .map(|s| ServiceView::new(s, workflows.get(&s.id)))
        .collect();
    Ok(Json(views))
}

/// GET /api/services/{slug}
async fn get_service(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    auth: AuthUser,
) -> AppResult<Json<ServiceDetail>> {
    let service = active_service_by_slug(&state, &slug).await?;
    let workflow = state.workflows.get(auth.user.id, service.id).await?;

    Ok(Json(ServiceDetail {
        service: ServiceView::new(&service, workflow.as_ref()),
        credential_fields: service.credential_ui_schema.clone(),
        workflow,
    }))
}

/// Submit the credential form and provision the service
///
/// POST /api/services/{slug}/unlock
/// Body: one JSON value per credential field
async fn unlock_service(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    auth: AuthUser,
    Json(fields): Json<Map<String, Value>>,
) -> AppResult<(StatusCode, Json<UserWorkflow>)> {
    let service = active_service_by_slug(&state, &slug).await?;
    let workflow = state.provisioner.provision(&auth.user, &service, &fields).await?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

/// POST /api/services/{slug}/toggle
async fn toggle_service(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    auth: AuthUser,
    body: Option<Json<ToggleRequest>>,
) -> AppResult<Json<UserWorkflow>> {
    let service = state
        .services
        .get_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("service '{slug}' not found")))?;

    let desired = match body.and_then(|Json(b)| b.active) {
        Some(active) => active,
        None => {
            let current = state
                .workflows
                .get(auth.user.id, service.id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("service '{slug}' has not been unlocked")))?;
            !current.active
        }
    };

    let workflow = state.provisioner.toggle(&auth.user, &service, desired).await?;
    Ok(Json(workflow))
}

/// Provider consent URL for an OAuth-type n8n credential of the caller
///
/// GET /api/services/{slug}/credential-oauth?return_url=...
async fn credential_oauth(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<CredentialOAuthQuery>,
    auth: AuthUser,
) -> AppResult<Json<Value>> {
    let service = active_service_by_slug(&state, &slug).await?;
    let return_url = query
        .return_url
        .unwrap_or_else(|| state.config.google.post_auth_redirect.clone());
    let url = state
        .provisioner
        .credential_authorize_url(&auth.user, &service, &return_url)
        .await?;
    Ok(Json(json!({ "authorize_url": url })))
}
