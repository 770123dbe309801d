/// Google OAuth token storage and pending authorization states

use crate::store::types::GoogleCredential;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqlitePool, SqliteRow},
    Row,
};

#[derive(Debug, Clone)]
pub struct GoogleCredentialStorage {
    pool: SqlitePool,
}

fn credential_from_row(row: &SqliteRow) -> sqlx::Result<GoogleCredential> {
    Ok(GoogleCredential {
        user_id: row.try_get("user_id")?,
        access_token: row.try_get("access_token")?,
        refresh_token: row.try_get("refresh_token")?,
        token_expiry: row.try_get("token_expiry")?,
        scopes: row.try_get("scopes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl GoogleCredentialStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: i64) -> sqlx::Result<Option<GoogleCredential>> {
        let row = sqlx::query(
            "SELECT user_id, access_token, refresh_token, token_expiry, scopes, created_at, updated_at \
             FROM google_credentials WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(credential_from_row).transpose()
    }

    /// Store the full token set obtained from an authorization code
    pub async fn upsert(
        &self,
        user_id: i64,
        access_token: &str,
        refresh_token: &str,
        token_expiry: Option<DateTime<Utc>>,
        scopes: &str,
    ) -> sqlx::Result<GoogleCredential> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO google_credentials (user_id, access_token, refresh_token, token_expiry, scopes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_expiry = excluded.token_expiry,
                scopes = excluded.scopes,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(access_token)
        .bind(refresh_token)
        .bind(token_expiry)
        .bind(scopes)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(user_id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    /// Persist a refreshed access token
    pub async fn update_access_token(
        &self,
        user_id: i64,
        access_token: &str,
        token_expiry: Option<DateTime<Utc>>,
    ) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE google_credentials SET access_token = ?, token_expiry = ?, updated_at = ? WHERE user_id = ?",
        )
        .bind(access_token)
        .bind(token_expiry)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remember the CSRF state handed to Google for this user
    pub async fn save_state(&self, state: &str, user_id: i64) -> sqlx::Result<()> {
        sqlx::query("INSERT INTO oauth_states (state, user_id, created_at) VALUES (?, ?, ?)")
            .bind(state)
            .bind(user_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Consume a state. Each state resolves at most once.
    pub async fn take_state(&self, state: &str) -> sqlx::Result<Option<(i64, DateTime<Utc>)>> {
        let row = sqlx::query("DELETE FROM oauth_states WHERE state = ? RETURNING user_id, created_at")
            .bind(state)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some((row.try_get("user_id")?, row.try_get("created_at")?))),
            None => Ok(None),
        }
    }

    /// Forget states issued before `cutoff`; consent flows abandoned halfway leave them behind
    pub async fn purge_states_before(&self, cutoff: DateTime<Utc>) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM oauth_states WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{database, users::UserStorage};

    #[tokio::test]
    async fn states_are_single_use_and_tokens_upsert() {
        let pool = database::open(&crate::config::DatabaseConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
        })
        .await
        .unwrap();
        let user = UserStorage::new(pool.clone())
            .create("alice", None, None, "hash")
            .await
            .unwrap();
        let storage = GoogleCredentialStorage::new(pool);

        storage.save_state("state-1", user.id).await.unwrap();
        assert_eq!(storage.take_state("state-1").await.unwrap().unwrap().0, user.id);
        assert!(storage.take_state("state-1").await.unwrap().is_none());

        storage.upsert(user.id, "a1", "r1", None, "scope").await.unwrap();
        let updated = storage.upsert(user.id, "a2", "r2", None, "scope").await.unwrap();
        assert_eq!(updated.refresh_token, "r2");

        storage.update_access_token(user.id, "a3", Some(Utc::now())).await.unwrap();
        let current = storage.get(user.id).await.unwrap().unwrap();
        assert_eq!(current.access_token.as_deref(), Some("a3"));
        assert_eq!(current.refresh_token, "r2");
        assert!(current.token_expiry.is_some());
    }

    #[tokio::test]
    async fn abandoned_states_are_purged() {
        let pool = database::open(&crate::config::DatabaseConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
        })
        .await
        .unwrap();
        let user = UserStorage::new(pool.clone())
            .create("alice", None, None, "hash")
            .await
            .unwrap();
        let storage = GoogleCredentialStorage::new(pool);

        storage.save_state("old", user.id).await.unwrap();
        sqlx::query("UPDATE oauth_states SET created_at = ? WHERE state = 'old'")
            .bind(Utc::now() - chrono::Duration::hours(1))
            .execute(&storage.pool)
            .await
            .unwrap();
        storage.save_state("fresh", user.id).await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::minutes(10);
        assert_eq!(storage.purge_states_before(cutoff).await.unwrap(), 1);
        assert!(storage.take_state("old").await.unwrap().is_none());
        assert!(storage.take_state("fresh").await.unwrap().is_some());
    }
}
