/// Per-user overview of provisioned workflows and linked accounts

use crate::api::{auth::AuthUser, AppState};
use crate::error::AppResult;
use crate::store::{User, UserWorkflowSummary};
use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/dashboard", get(dashboard))
}

#[derive(Debug, Serialize)]
pub struct ActiveService {
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub user: User,
    pub workflows: Vec<UserWorkflowSummary>,
    pub active_service: Option<ActiveService>,
    pub google_connected: bool,
}

/// GET /api/dashboard
async fn dashboard(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Dashboard>> {
    let workflows = state.workflows.list_summaries(Some(auth.user.id)).await?;
    let active_service = state
        .provisioner
        .active_service(auth.user.id)
        .await?
        .map(|s| ActiveService {
            slug: s.slug,
            name: s.name,
        });
    let google_connected = state.google.is_connected(auth.user.id).await?;

    Ok(Json(Dashboard {
        user: auth.user,
        workflows,
        active_service,
        google_connected,
    }))
}
