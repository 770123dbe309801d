/// Google OAuth2 client (authorization-code flow with offline access)

use crate::config::GoogleConfig;
use chrono::{DateTime, Utc};
use oauth2::{
    basic::{BasicClient, BasicTokenResponse},
    reqwest::async_http_client,
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl,
    RefreshToken, Scope, TokenResponse, TokenUrl,
};
use thiserror::Error;

/// Scopes requested on the consent screen
pub const GOOGLE_SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/calendar",
];

#[derive(Debug, Error)]
pub enum GoogleError {
    #[error("Google OAuth is not configured")]
    NotConfigured,

    #[error("invalid Google OAuth endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("unknown or already used OAuth state")]
    UnknownState,

    #[error("OAuth state expired")]
    ExpiredState,

    #[error("token exchange with Google failed: {0}")]
    Exchange(String),

    #[error("Google did not return a refresh token")]
    MissingRefreshToken,

    #[error("user has not connected a Google account")]
    NotConnected,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Google API {method} {path} failed with status {status}: {body}")]
    Api {
        method: reqwest::Method,
        path: String,
        status: u16,
        body: String,
    },

    #[error("Google API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected Google API response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

/// Tokens returned by Google's token endpoint
#[derive(Debug, Clone)]
pub struct GrantedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Space separated, when Google reports them
    pub scopes: Option<String>,
}

impl From<BasicTokenResponse> for GrantedTokens {
    fn from(response: BasicTokenResponse) -> Self {
        let expires_at = response
            .expires_in()
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| Utc::now() + ttl);

        Self {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            expires_at,
            scopes: response.scopes().map(|scopes| {
                scopes
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            }),
        }
    }
}

/// Thin wrapper over `oauth2::BasicClient` configured for Google
#[derive(Debug, Clone)]
pub struct GoogleOAuth {
    client: BasicClient,
}

impl GoogleOAuth {
    pub fn new(config: &GoogleConfig) -> Result<Self, GoogleError> {
        if config.client_id.trim().is_empty() || config.client_secret.trim().is_empty() {
            return Err(GoogleError::NotConfigured);
        }

        let endpoint = |e: oauth2::url::ParseError| GoogleError::InvalidEndpoint(e.to_string());
        let client = BasicClient::new(
            ClientId::new(config.client_id.trim().to_string()),
            Some(ClientSecret::new(config.client_secret.trim().to_string())),
            AuthUrl::new(config.auth_uri.clone()).map_err(endpoint)?,
            Some(TokenUrl::new(config.token_uri.clone()).map_err(endpoint)?),
        )
        .set_redirect_uri(RedirectUrl::new(config.redirect_uri.clone()).map_err(endpoint)?)
        .set_auth_type(AuthType::RequestBody);

        Ok(Self { client })
    }

    /// Consent screen URL carrying `state`
    pub fn authorize_url(&self, state: &str) -> String {
        let (url, _) = self
            .client
            .authorize_url(|| CsrfToken::new(state.to_string()))
            .add_scopes(GOOGLE_SCOPES.iter().map(|s| Scope::new(s.to_string())))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .add_extra_param("include_granted_scopes", "true")
            .url();
        url.to_string()
    }

    pub async fn exchange_code(&self, code: &str) -> Result<GrantedTokens, GoogleError> {
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| GoogleError::Exchange(e.to_string()))?;
        Ok(response.into())
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<GrantedTokens, GoogleError> {
        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| GoogleError::Exchange(e.to_string()))?;
        Ok(response.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GoogleConfig {
        GoogleConfig {
            client_id: "client-123".into(),
            client_secret: "secret".into(),
            redirect_uri: "https://app.example.com/google/oauth/callback".into(),
            auth_uri: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            token_uri: "https://oauth2.googleapis.com/token".into(),
            post_auth_redirect: "/dashboard".into(),
            gmail_api_base: "https://gmail.googleapis.com".into(),
            calendar_api_base: "https://www.googleapis.com".into(),
        }
    }

    #[test]
    fn missing_client_credentials_disable_the_flow() {
        let mut config = config();
        config.client_secret = String::new();
        assert!(matches!(GoogleOAuth::new(&config), Err(GoogleError::NotConfigured)));
    }

    #[test]
    fn authorize_url_requests_offline_gmail_and_calendar_access() {
        let oauth = GoogleOAuth::new(&config()).unwrap();
        let url = url::Url::parse(&oauth.authorize_url("state-xyz")).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(params["state"], "state-xyz");
        assert_eq!(params["client_id"], "client-123");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
        assert_eq!(params["redirect_uri"], "https://app.example.com/google/oauth/callback");
        for scope in GOOGLE_SCOPES {
            assert!(params["scope"].split(' ').any(|s| s == scope));
        }
    }
}
