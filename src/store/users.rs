/// User accounts and login sessions

use crate::store::types::User;
use chrono::{DateTime, Duration, Utc};
use sqlx::{
    sqlite::{SqlitePool, SqliteRow},
    Row,
};

#[derive(Debug, Clone)]
pub struct UserStorage {
    pool: SqlitePool,
}

const USER_COLUMNS: &str = "id, username, email, phone_number, password_hash, created_at";

fn user_from_row(row: &SqliteRow) -> sqlx::Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        phone_number: row.try_get("phone_number")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get("created_at")?,
    })
}

impl UserStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a user. A taken username surfaces as a unique violation.
    pub async fn create(
        &self,
        username: &str,
        email: Option<&str>,
        phone_number: Option<&str>,
        password_hash: &str,
    ) -> sqlx::Result<User> {
        let result = sqlx::query(
            "INSERT INTO users (username, email, phone_number, password_hash, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(username)
        .bind(email)
        .bind(phone_number)
        .bind(password_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get(&self, id: i64) -> sqlx::Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn get_by_username(&self, username: &str) -> sqlx::Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    /// Look up by an already normalized phone number
    pub async fn get_by_phone(&self, phone: &str) -> sqlx::Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE phone_number = ? ORDER BY id LIMIT 1"
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    /// Delete a user; sessions, workflows and tokens go with it
    pub async fn delete(&self, id: i64) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Open a session and return its bearer token
    pub async fn create_session(&self, user_id: i64, ttl: Duration) -> sqlx::Result<String> {
        let token = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        let now = Utc::now();
        self.purge_expired_sessions(now).await?;

        sqlx::query("INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)")
            .bind(&token)
            .bind(user_id)
            .bind(now)
            .bind(now + ttl)
            .execute(&self.pool)
            .await?;

        Ok(token)
    }

    /// Resolve a bearer token to its user, ignoring expired sessions
    pub async fn user_for_session(&self, token: &str) -> sqlx::Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT u.id, u.username, u.email, u.phone_number, u.password_hash, u.created_at, s.expires_at
            FROM sessions s JOIN users u ON u.id = s.user_id
            WHERE s.token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let expires_at: DateTime<Utc> = row.try_get("expires_at")?;
        if expires_at <= Utc::now() {
            self.delete_session(token).await?;
            return Ok(None);
        }
        user_from_row(&row).map(Some)
    }

    /// Drop every session that expired before `now`
    pub async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_session(&self, token: &str) -> sqlx::Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::database;

    async fn storage() -> UserStorage {
        let pool = database::connect(&crate::config::DatabaseConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
        })
        .await
        .unwrap();
        database::init_schema(&pool).await.unwrap();
        UserStorage::new(pool)
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let users = storage().await;
        users.create("alice", None, Some("15550001"), "hash").await.unwrap();

        let err = users.create("alice", None, None, "hash").await.unwrap_err();
        match err {
            sqlx::Error::Database(db) => assert!(db.is_unique_violation()),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(users.get_by_phone("15550001").await.unwrap().unwrap().username, "alice");
    }

    #[tokio::test]
    async fn expired_sessions_do_not_resolve() {
        let users = storage().await;
        let alice = users.create("alice", None, None, "hash").await.unwrap();

        let live = users.create_session(alice.id, Duration::hours(1)).await.unwrap();
        let expired = users.create_session(alice.id, Duration::hours(-1)).await.unwrap();

        assert_eq!(users.user_for_session(&live).await.unwrap().unwrap().id, alice.id);
        assert!(users.user_for_session(&expired).await.unwrap().is_none());

        users.delete_session(&live).await.unwrap();
        assert!(users.user_for_session(&live).await.unwrap().is_none());
    }

    async fn session_count(users: &UserStorage) -> i64 {
        sqlx::query("SELECT COUNT(*) AS n FROM sessions")
            .fetch_one(&users.pool)
            .await
            .unwrap()
            .get("n")
    }

    #[tokio::test]
    async fn expired_sessions_are_deleted() {
        let users = storage().await;
        let alice = users.create("alice", None, None, "hash").await.unwrap();

        let stale = users.create_session(alice.id, Duration::hours(-2)).await.unwrap();
        assert_eq!(session_count(&users).await, 1);

        // Resolving an expired token removes it
        assert!(users.user_for_session(&stale).await.unwrap().is_none());
        assert_eq!(session_count(&users).await, 0);

        // Logging in sweeps whatever expired meanwhile
        users.create_session(alice.id, Duration::hours(-1)).await.unwrap();
        assert_eq!(session_count(&users).await, 1);
        let live = users.create_session(alice.id, Duration::hours(1)).await.unwrap();
        assert_eq!(users.user_for_session(&live).await.unwrap().unwrap().id, alice.id);
        assert_eq!(session_count(&users).await, 1);
    }
}
