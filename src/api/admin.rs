/// Service catalog administration
///
/// Guarded by the admin key (or the internal key when no admin key is set).

use crate::api::{auth::AdminKey, AppState};
use crate::error::{AppError, AppResult};
use crate::store::{types::ServiceDefinition, Service, UserWorkflowSummary};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/services", get(list_services))
        .route(
            "/api/admin/services/{slug}",
            axum::routing::put(upsert_service).delete(delete_service),
        )
        .route("/api/admin/user-workflows", get(list_user_workflows))
}

#[derive(Debug, Deserialize)]
pub struct UserWorkflowFilter {
    pub user_id: Option<i64>,
}

fn valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= 50
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

fn check_definition(definition: &ServiceDefinition) -> AppResult<()> {
    let required = [
        ("name", &definition.name),
        ("template_workflow_id", &definition.template_workflow_id),
        ("credential_type", &definition.credential_type),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(AppError::BadRequest(format!("'{field}' must not be empty")));
        }
    }
    Ok(())
}

/// All services, including inactive ones
///
/// GET /api/admin/services
async fn list_services(State(state): State<AppState>, _key: AdminKey) -> AppResult<Json<Vec<Service>>> {
    Ok(Json(state.services.list(false).await?))
}

/// Create or replace a service
///
/// PUT /api/admin/services/{slug}
async fn upsert_service(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    _key: AdminKey,
    Json(definition): Json<ServiceDefinition>,
) -> AppResult<Json<Service>> {
    if !valid_slug(&slug) {
        return Err(AppError::BadRequest(
            "Slug may only contain lowercase letters, digits, '-' and '_'".into(),
        ));
    }
    check_definition(&definition)?;

    let service = state.services.upsert(&slug, &definition).await?;
    tracing::info!("🛠️ Saved service '{}' (template {})", slug, service.template_workflow_id);
    Ok(Json(service))
}

/// DELETE /api/admin/services/{slug}
async fn delete_service(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    _key: AdminKey,
) -> AppResult<StatusCode> {
    if state.services.delete(&slug).await? {
        tracing::info!("🗑️ Deleted service '{}'", slug);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("service '{slug}' not found")))
    }
}

/// GET /api/admin/user-workflows?user_id=...
async fn list_user_workflows(
    State(state): State<AppState>,
    Query(filter): Query<UserWorkflowFilter>,
    _key: AdminKey,
) -> AppResult<Json<Vec<UserWorkflowSummary>>> {
    Ok(Json(state.workflows.list_summaries(filter.user_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_url_safe() {
        assert!(valid_slug("ultimate-personal-assistant"));
        assert!(valid_slug("crm_v2"));
        assert!(!valid_slug("Has Spaces"));
        assert!(!valid_slug(""));
    }
}
