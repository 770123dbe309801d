/// Configuration management for the flopro backend
///
/// Handles server configuration, database connections, the n8n API, Google OAuth
/// and the shared secrets guarding internal and admin endpoints.

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// n8n REST API access
    pub n8n: N8nConfig,
    /// Google OAuth client
    pub google: GoogleConfig,
    /// Shared secrets and session lifetime
    pub security: SecurityConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// SQLite database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection string, e.g. "sqlite://data/flopro.db" or "sqlite::memory:"
    pub url: String,
    /// Pool size. In-memory databases must use 1 so every query sees the same database.
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct N8nConfig {
    /// Base URL of the n8n instance, without the API prefix
    pub base_url: String,
    /// API prefix appended to the base URL ("/api/v1" for the public API, "/rest" for the internal one)
    pub api_prefix: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    /// Callback registered with Google, must point at /google/oauth/callback
    pub redirect_uri: String,
    pub auth_uri: String,
    pub token_uri: String,
    /// Where the browser lands after a successful consent
    pub post_auth_redirect: String,
    /// Root of the Gmail REST API, without the "/gmail/v1" path
    pub gmail_api_base: String,
    /// Root of the Calendar REST API, without the "/calendar/v3" path
    pub calendar_api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Secret n8n presents to the internal endpoints. Empty disables them.
    #[serde(skip_serializing)]
    pub internal_api_key: String,
    #[serde(skip_serializing)]
    pub admin_key: Option<String>,
    /// Lifetime of login sessions in hours
    pub session_ttl_hours: i64,
}

impl SecurityConfig {
    /// Returns the key guarding the admin API.
    /// Falls back to the internal key if FLOPRO_ADMIN_KEY is not set.
    pub fn admin_key(&self) -> &str {
        self.admin_key.as_deref().unwrap_or(&self.internal_api_key)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env_or("FLOPRO_HOST", "0.0.0.0"),
                port: env_parse("FLOPRO_PORT", 8000),
            },
            database: DatabaseConfig {
                url: env_or("DATABASE_URL", "sqlite://data/flopro.db"),
                max_connections: env_parse("FLOPRO_DB_MAX_CONNECTIONS", 5),
            },
            n8n: N8nConfig {
                base_url: env_or("N8N_API_BASE_URL", ""),
                api_prefix: env_or("N8N_API_PREFIX", "/api/v1"),
                api_key: env_or("N8N_API_KEY", "").trim().to_string(),
                timeout_secs: env_parse("N8N_TIMEOUT_SECS", 30),
            },
            google: GoogleConfig {
                client_id: env_or("GOOGLE_CLIENT_ID", ""),
                client_secret: env_or("GOOGLE_CLIENT_SECRET", ""),
                redirect_uri: env_or(
                    "GOOGLE_REDIRECT_URI",
                    "http://localhost:8000/google/oauth/callback",
                ),
                auth_uri: env_or("GOOGLE_AUTH_URI", "https://accounts.google.com/o/oauth2/v2/auth"),
                token_uri: env_or("GOOGLE_TOKEN_URI", "https://oauth2.googleapis.com/token"),
                post_auth_redirect: env_or("GOOGLE_POST_AUTH_REDIRECT", "/dashboard"),
                gmail_api_base: env_or("GOOGLE_GMAIL_API_BASE", "https://gmail.googleapis.com"),
                calendar_api_base: env_or("GOOGLE_CALENDAR_API_BASE", "https://www.googleapis.com"),
            },
            security: SecurityConfig {
                internal_api_key: env_or("INTERNAL_API_KEY", "").trim().to_string(),
                admin_key: std::env::var("FLOPRO_ADMIN_KEY")
                    .ok()
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty()),
                session_ttl_hours: env_parse("FLOPRO_SESSION_TTL_HOURS", 336),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_key_falls_back_to_internal_key() {
        let mut security = SecurityConfig {
            internal_api_key: "internal".into(),
            admin_key: None,
            session_ttl_hours: 1,
        };
        assert_eq!(security.admin_key(), "internal");

        security.admin_key = Some("admin".into());
        assert_eq!(security.admin_key(), "admin");
    }

    #[test]
    fn secrets_are_not_serialized() {
        let mut config = Config::default();
        config.n8n.api_key = "n8n-secret".into();
        config.security.internal_api_key = "internal-secret".into();

        let rendered = serde_json::to_string(&config).unwrap();
        assert!(!rendered.contains("n8n-secret"));
        assert!(!rendered.contains("internal-secret"));
    }
}
