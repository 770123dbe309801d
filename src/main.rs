/// flopro server entry point
///
/// Reads configuration from the environment and serves:
/// - Account, catalog, unlock and dashboard API at /api/*
/// - Google consent flow at /google/oauth/*
/// - Internal endpoints for n8n and admin endpoints at /api/{google,phone,admin}/*
/// - Health check at /healthz

use flopro::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::default();
    start_server(config).await
}
