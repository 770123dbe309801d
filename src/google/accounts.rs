/// Linking Google accounts to users and handing out fresh access tokens

use crate::google::oauth::{GoogleError, GoogleOAuth, GOOGLE_SCOPES};
use crate::store::{GoogleCredential, GoogleCredentialStorage};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// How long a consent round trip may take
const STATE_TTL_MINUTES: i64 = 10;

/// Access tokens closer than this to expiry are refreshed before being handed out
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Token handed to n8n
#[derive(Debug, Clone, Serialize)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct GoogleAccounts {
    /// `None` when GOOGLE_CLIENT_ID or GOOGLE_CLIENT_SECRET is missing
    oauth: Option<GoogleOAuth>,
    storage: GoogleCredentialStorage,
}

impl GoogleAccounts {
    pub fn new(oauth: Option<GoogleOAuth>, storage: GoogleCredentialStorage) -> Self {
        Self { oauth, storage }
    }

    fn oauth(&self) -> Result<&GoogleOAuth, GoogleError> {
        self.oauth.as_ref().ok_or(GoogleError::NotConfigured)
    }

    /// Begin the consent flow for a user and return the Google URL to visit
    pub async fn start(&self, user_id: i64) -> Result<String, GoogleError> {
        let oauth = self.oauth()?;
        let state = uuid::Uuid::new_v4().simple().to_string();
        self.purge_stale_states().await;
        self.storage.save_state(&state, user_id).await?;
        tracing::info!("🔑 Google consent started for user {}", user_id);
        Ok(oauth.authorize_url(&state))
    }

    /// Finish the consent flow: resolve the state, exchange the code, store tokens
    pub async fn complete(&self, code: &str, state: &str) -> Result<GoogleCredential, GoogleError> {
        let oauth = self.oauth()?;
        let (user_id, issued_at) = self
            .storage
            .take_state(state)
            .await?
            .ok_or(GoogleError::UnknownState)?;
        self.purge_stale_states().await;

        if Utc::now() - issued_at > Duration::minutes(STATE_TTL_MINUTES) {
            return Err(GoogleError::ExpiredState);
        }

        let granted = oauth.exchange_code(code).await?;

        // Google only sends a refresh token on first consent unless forced
        let refresh_token = match granted.refresh_token {
            Some(token) => token,
            None => self
                .storage
                .get(user_id)
                .await?
                .map(|existing| existing.refresh_token)
                .ok_or(GoogleError::MissingRefreshToken)?,
        };
        let scopes = granted.scopes.unwrap_or_else(|| GOOGLE_SCOPES.join(" "));

        let credential = self
            .storage
            .upsert(user_id, &granted.access_token, &refresh_token, granted.expires_at, &scopes)
            .await?;

        tracing::info!("✅ Google account linked for user {}", user_id);
        Ok(credential)
    }

    /// Drop states whose consent round trip can no longer complete
    async fn purge_stale_states(&self) {
        let cutoff = Utc::now() - Duration::minutes(STATE_TTL_MINUTES);
        match self.storage.purge_states_before(cutoff).await {
            Ok(0) => {}
            Ok(n) => tracing::debug!("🧹 Purged {} abandoned OAuth state(s)", n),
            Err(e) => tracing::warn!("⚠️ Could not purge OAuth states: {}", e),
        }
    }

    /// A valid access token for the user, refreshed when close to expiry
    pub async fn fresh_access_token(&self, user_id: i64) -> Result<AccessToken, GoogleError> {
        let credential = self
            .storage
            .get(user_id)
            .await?
            .ok_or(GoogleError::NotConnected)?;
        let scopes = split_scopes(&credential.scopes);

        if let (Some(token), Some(expiry)) = (&credential.access_token, credential.token_expiry) {
            if expiry - Utc::now() > Duration::seconds(EXPIRY_MARGIN_SECS) {
                return Ok(AccessToken {
                    access_token: token.clone(),
                    expires_at: Some(expiry),
                    scopes,
                });
            }
        }

        tracing::debug!("🔄 Refreshing Google access token for user {}", user_id);
        let granted = self.oauth()?.refresh(&credential.refresh_token).await?;

        match &granted.refresh_token {
            Some(rotated) => {
                self.storage
                    .upsert(
                        user_id,
                        &granted.access_token,
                        rotated,
                        granted.expires_at,
                        &credential.scopes,
                    )
                    .await?;
            }
            None => {
                self.storage
                    .update_access_token(user_id, &granted.access_token, granted.expires_at)
                    .await?;
            }
        }

        Ok(AccessToken {
            access_token: granted.access_token,
            expires_at: granted.expires_at,
            scopes,
        })
    }

    pub async fn is_connected(&self, user_id: i64) -> Result<bool, GoogleError> {
        Ok(self.storage.get(user_id).await?.is_some())
    }
}

fn split_scopes(scopes: &str) -> Vec<String> {
    scopes.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, GoogleConfig};
    use crate::store::{database, UserStorage};
    use serde_json::json;
    use sqlx::sqlite::SqlitePool;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        accounts: GoogleAccounts,
        storage: GoogleCredentialStorage,
        pool: SqlitePool,
        user_id: i64,
    }

    async fn fixture(google: &MockServer) -> Fixture {
        let pool = database::open(&DatabaseConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
        })
        .await
        .unwrap();
        let user = UserStorage::new(pool.clone())
            .create("alice", None, None, "hash")
            .await
            .unwrap();
        let oauth = GoogleOAuth::new(&GoogleConfig {
            client_id: "client-id".into(),
            client_secret: "client-secret".into(),
            redirect_uri: "http://localhost:8000/google/oauth/callback".into(),
            auth_uri: format!("{}/o/oauth2/auth", google.uri()),
            token_uri: format!("{}/token", google.uri()),
            post_auth_redirect: "/dashboard".into(),
            gmail_api_base: google.uri(),
            calendar_api_base: google.uri(),
        })
        .unwrap();
        let storage = GoogleCredentialStorage::new(pool.clone());

        Fixture {
            accounts: GoogleAccounts::new(Some(oauth), storage.clone()),
            storage,
            pool,
            user_id: user.id,
        }
    }

    fn state_of(authorize_url: &str) -> String {
        url::Url::parse(authorize_url)
            .unwrap()
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .unwrap()
    }

    /// Token endpoint answer without a refresh token, as on repeated consent
    async fn mount_token_without_refresh(google: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access",
                "token_type": "Bearer",
                "expires_in": 3599
            })))
            .mount(google)
            .await;
    }

    #[tokio::test]
    async fn states_older_than_ten_minutes_are_rejected() {
        let google = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&google)
            .await;
        let f = fixture(&google).await;

        let state = state_of(&f.accounts.start(f.user_id).await.unwrap());
        sqlx::query("UPDATE oauth_states SET created_at = ? WHERE state = ?")
            .bind(Utc::now() - Duration::minutes(11))
            .bind(&state)
            .execute(&f.pool)
            .await
            .unwrap();

        let err = f.accounts.complete("code", &state).await.unwrap_err();
        assert!(matches!(err, GoogleError::ExpiredState));
        assert!(!f.accounts.is_connected(f.user_id).await.unwrap());
    }

    #[tokio::test]
    async fn missing_refresh_token_without_a_stored_one_fails() {
        let google = MockServer::start().await;
        mount_token_without_refresh(&google).await;
        let f = fixture(&google).await;

        let state = state_of(&f.accounts.start(f.user_id).await.unwrap());
        let err = f.accounts.complete("code", &state).await.unwrap_err();

        assert!(matches!(err, GoogleError::MissingRefreshToken));
        assert!(f.storage.get(f.user_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_refresh_token_keeps_the_stored_one() {
        let google = MockServer::start().await;
        mount_token_without_refresh(&google).await;
        let f = fixture(&google).await;
        f.storage
            .upsert(f.user_id, "old-access", "stored-refresh", None, "scope-a")
            .await
            .unwrap();

        let state = state_of(&f.accounts.start(f.user_id).await.unwrap());
        let credential = f.accounts.complete("code", &state).await.unwrap();

        assert_eq!(credential.refresh_token, "stored-refresh");
        assert_eq!(credential.access_token.as_deref(), Some("new-access"));
        assert!(credential.token_expiry.is_some());
    }

    #[tokio::test]
    async fn tokens_close_to_expiry_are_refreshed() {
        let google = MockServer::start().await;
        mount_token_without_refresh(&google).await;
        let f = fixture(&google).await;
        f.storage
            .upsert(
                f.user_id,
                "stale-access",
                "stored-refresh",
                Some(Utc::now() + Duration::seconds(30)),
                "scope-a scope-b",
            )
            .await
            .unwrap();

        let token = f.accounts.fresh_access_token(f.user_id).await.unwrap();
        assert_eq!(token.access_token, "new-access");
        assert_eq!(token.scopes, vec!["scope-a", "scope-b"]);

        let stored = f.storage.get(f.user_id).await.unwrap().unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("new-access"));
        assert_eq!(stored.refresh_token, "stored-refresh");
    }

    #[tokio::test]
    async fn starting_a_flow_forgets_abandoned_states() {
        let google = MockServer::start().await;
        let f = fixture(&google).await;

        let abandoned = state_of(&f.accounts.start(f.user_id).await.unwrap());
        sqlx::query("UPDATE oauth_states SET created_at = ? WHERE state = ?")
            .bind(Utc::now() - Duration::hours(2))
            .bind(&abandoned)
            .execute(&f.pool)
            .await
            .unwrap();

        f.accounts.start(f.user_id).await.unwrap();
        let err = f.accounts.complete("code", &abandoned).await.unwrap_err();
        assert!(matches!(err, GoogleError::UnknownState));
    }
}
