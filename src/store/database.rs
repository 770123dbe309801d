/// SQLite pool creation and schema management
///
/// The schema is created idempotently at startup (`CREATE TABLE IF NOT EXISTS`),
/// followed by seeding of the default service catalog.

use crate::config::DatabaseConfig;
use crate::store::{services::ServiceStorage, types::ServiceDefinition};
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// Open the configured database, creating the file (and its directory) if missing
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .with_context(|| format!("Invalid DATABASE_URL '{}'", config.url))?
        .create_if_missing(true)
        .foreign_keys(true);

    // In-memory databases get a synthetic filename without a parent directory
    if let Some(parent) = options
        .get_filename()
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory '{}'", parent.display())
        })?;
    }

    tracing::info!("🗄️ Opening database: {}", config.url);
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create all tables and indexes
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT,
            phone_number TEXT,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS services (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            icon TEXT NOT NULL DEFAULT '',
            template_workflow_id TEXT NOT NULL,
            credential_type TEXT NOT NULL,
            credential_ui_schema TEXT NOT NULL,
            credential_node_types TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS user_workflows (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            service_id INTEGER NOT NULL REFERENCES services(id) ON DELETE CASCADE,
            n8n_workflow_id TEXT NOT NULL,
            n8n_credential_id TEXT NOT NULL,
            name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (user_id, service_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS google_credentials (
            user_id INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            access_token TEXT,
            refresh_token TEXT NOT NULL,
            token_expiry TEXT,
            scopes TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS oauth_states (
            state TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_users_phone ON users(phone_number)",
        "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_user_workflows_user ON user_workflows(user_id)",
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

/// Slug of the service seeded on every start
pub const ASSISTANT_SLUG: &str = "ultimate-personal-assistant";

/// Ensure the default catalog exists without touching admin edits
pub async fn seed_default_services(services: &ServiceStorage) -> Result<()> {
    let definition: ServiceDefinition = serde_json::from_value(serde_json::json!({
        "name": "Ultimate Personal Assistant",
        "description": "AI assistant that reads your Gmail and manages Google Calendar events.",
        "icon": "fas fa-user-astronaut",
        "template_workflow_id": "2",
        "credential_type": "googleOAuth2",
        "credential_ui_schema": {
            "phone_number": {
                "type": "text",
                "label": "Phone Number",
                "placeholder": "+1 555 123 4567",
                "required": true,
                "help_text": "Used to identify your account for assistant messages"
            }
        },
        "credential_node_types": [
            "n8n-nodes-base.gmail",
            "n8n-nodes-base.googleCalendar"
        ],
        "is_active": true
    }))?;

    if services.insert_if_missing(ASSISTANT_SLUG, &definition).await? {
        tracing::info!("🌱 Seeded service: {}", ASSISTANT_SLUG);
    }

    Ok(())
}

/// Connect, create the schema and seed the catalog
pub async fn open(config: &DatabaseConfig) -> Result<SqlitePool> {
    let pool = connect(config).await?;
    init_schema(&pool).await.context("Failed to initialize schema")?;
    seed_default_services(&ServiceStorage::new(pool.clone()))
        .await
        .context("Failed to seed services")?;
    Ok(pool)
}
