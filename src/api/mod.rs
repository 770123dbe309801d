/// HTTP API Layer
///
/// JSON endpoints for end users (authentication, service catalog, unlock,
/// dashboard, toggle, Google consent), for n8n (internal endpoints guarded by the
/// shared secret) and for operators (service administration).

use crate::{
    config::Config,
    google::{GoogleAccounts, GoogleApi},
    provisioning::Provisioner,
    store::{ServiceStorage, UserStorage, UserWorkflowStorage},
};
use axum::Router;
use std::sync::Arc;

// Signup/login/logout, account deletion and the request extractors
pub mod auth;

// Catalog, unlock form, unlock and toggle
pub mod services;

// Per-user overview of provisioned workflows
pub mod dashboard;

// Google consent flow and the internal token endpoint
pub mod google;

// Gmail and Calendar actions on a user's behalf
pub mod google_actions;

// Phone lookups called back by n8n
pub mod internal;

// Service catalog administration
pub mod admin;

/// Application state containing shared resources
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: UserStorage,
    pub services: ServiceStorage,
    pub workflows: UserWorkflowStorage,
    pub provisioner: Provisioner,
    pub google: GoogleAccounts,
    pub google_api: GoogleApi,
}

/// All API routes, still waiting for their state
pub fn create_api_routes() -> Router<AppState> {
    Router::new()
        .merge(auth::routes())
        .merge(services::routes())
        .merge(dashboard::routes())
        .merge(google::routes())
        .merge(google_actions::routes())
        .merge(internal::routes())
        .merge(admin::routes())
}
