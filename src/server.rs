/// Server setup and initialization
///
/// Wires together storage, the n8n client, the provisioning orchestrator, the
/// Google OAuth subsystem and the HTTP routes.

use crate::{
    api::{create_api_routes, AppState},
    config::Config,
    google::{GoogleAccounts, GoogleApi, GoogleOAuth},
    n8n::N8nClient,
    provisioning::Provisioner,
    store::{database, GoogleCredentialStorage, ServiceStorage, UserStorage, UserWorkflowStorage},
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// Build the shared state: open the database and construct the external clients
///
/// Missing n8n or Google settings only disable the features that need them.
pub async fn create_state(config: Config) -> Result<AppState> {
    let pool = database::open(&config.database).await?;

    let users = UserStorage::new(pool.clone());
    let services = ServiceStorage::new(pool.clone());
    let workflows = UserWorkflowStorage::new(pool.clone());

    let n8n = match N8nClient::new(&config.n8n) {
        Ok(client) => {
            tracing::info!("🔗 n8n client ready at {}{}", config.n8n.base_url, config.n8n.api_prefix);
            Some(client)
        }
        Err(e) => {
            tracing::warn!("⚠️ Provisioning disabled: {}", e);
            None
        }
    };

    let oauth = match GoogleOAuth::new(&config.google) {
        Ok(oauth) => Some(oauth),
        Err(e) => {
            tracing::warn!("⚠️ Google account linking disabled: {}", e);
            None
        }
    };

    let google_api = GoogleApi::new(&config.google)?;

    if config.security.internal_api_key.is_empty() {
        tracing::warn!("⚠️ INTERNAL_API_KEY is not set; internal endpoints reject every request");
    }

    Ok(AppState {
        provisioner: Provisioner::new(n8n, services.clone(), workflows.clone()),
        google: GoogleAccounts::new(oauth, GoogleCredentialStorage::new(pool)),
        google_api,
        users,
        services,
        workflows,
        config: Arc::new(config),
    })
}

/// Create the main Axum application with all routes and middleware
pub async fn create_app(config: Config) -> Result<Router> {
    let state = create_state(config).await?;
    Ok(build_router(state))
}

/// Attach the routes and middleware to an existing state
pub fn build_router(state: AppState) -> Router {
    tracing::info!("📡 Creating HTTP router with all endpoints");
    Router::new()
        .route("/healthz", get(health_check))
        .merge(create_api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting flopro server...");

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let app = create_app(config).await?;

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
