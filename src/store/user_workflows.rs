/// Persistence of provisioned user workflows
///
/// One row per (user, service), enforced by a UNIQUE constraint. Rows are only
/// written after n8n confirmed the workflow, so the external ids are always set.

use crate::store::types::UserWorkflow;
use chrono::Utc;
use serde::Serialize;
use sqlx::{
    sqlite::{SqlitePool, SqliteRow},
    Row,
};

#[derive(Debug, Clone)]
pub struct UserWorkflowStorage {
    pool: SqlitePool,
}

/// Values of a freshly provisioned workflow
#[derive(Debug, Clone)]
pub struct NewUserWorkflow<'a> {
    pub user_id: i64,
    pub service_id: i64,
    pub n8n_workflow_id: &'a str,
    pub n8n_credential_id: &'a str,
    pub name: &'a str,
    pub active: bool,
}

/// Workflow row joined with its service, for dashboards and the admin listing
#[derive(Debug, Clone, Serialize)]
pub struct UserWorkflowSummary {
    #[serde(flatten)]
    pub workflow: UserWorkflow,
    pub username: String,
    pub service_slug: String,
    pub service_name: String,
    pub service_icon: String,
}

const WORKFLOW_COLUMNS: &str = "w.id, w.user_id, w.service_id, w.n8n_workflow_id, w.n8n_credential_id, \
     w.name, w.active, w.created_at, w.updated_at";

fn workflow_from_row(row: &SqliteRow) -> sqlx::Result<UserWorkflow> {
    Ok(UserWorkflow {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        service_id: row.try_get("service_id")?,
        n8n_workflow_id: row.try_get("n8n_workflow_id")?,
        n8n_credential_id: row.try_get("n8n_credential_id")?,
        name: row.try_get("name")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn summary_from_row(row: &SqliteRow) -> sqlx::Result<UserWorkflowSummary> {
    Ok(UserWorkflowSummary {
        workflow: workflow_from_row(row)?,
        username: row.try_get("username")?,
        service_slug: row.try_get("service_slug")?,
        service_name: row.try_get("service_name")?,
        service_icon: row.try_get("service_icon")?,
    })
}

impl UserWorkflowStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: i64, service_id: i64) -> sqlx::Result<Option<UserWorkflow>> {
        let row = sqlx::query(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM user_workflows w WHERE w.user_id = ? AND w.service_id = ?"
        ))
        .bind(user_id)
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(workflow_from_row).transpose()
    }

    /// All workflows of a user, newest first
    pub async fn list_for_user(&self, user_id: i64) -> sqlx::Result<Vec<UserWorkflow>> {
        let rows = sqlx::query(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM user_workflows w WHERE w.user_id = ? ORDER BY w.created_at DESC, w.id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(workflow_from_row).collect()
    }

    /// Workflows joined with user and service, optionally for one user only
    pub async fn list_summaries(&self, user_id: Option<i64>) -> sqlx::Result<Vec<UserWorkflowSummary>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {WORKFLOW_COLUMNS}, u.username AS username, s.slug AS service_slug,
                   s.name AS service_name, s.icon AS service_icon
            FROM user_workflows w
            JOIN users u ON u.id = w.user_id
            JOIN services s ON s.id = w.service_id
            WHERE (? IS NULL OR w.user_id = ?)
            ORDER BY w.created_at DESC, w.id DESC
            "#
        ))
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(summary_from_row).collect()
    }

    /// The user's currently active workflow, if any
    pub async fn active_for_user(&self, user_id: i64) -> sqlx::Result<Option<UserWorkflow>> {
        let row = sqlx::query(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM user_workflows w WHERE w.user_id = ? AND w.active = 1 \
             ORDER BY w.updated_at DESC, w.id DESC LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(workflow_from_row).transpose()
    }

    /// Insert a provisioned workflow. A second row for the same (user, service)
    /// surfaces as a unique violation.
    pub async fn insert(&self, new: &NewUserWorkflow<'_>) -> sqlx::Result<UserWorkflow> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO user_workflows (user_id, service_id, n8n_workflow_id, n8n_credential_id, name, active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.user_id)
        .bind(new.service_id)
        .bind(new.n8n_workflow_id)
        .bind(new.n8n_credential_id)
        .bind(new.name)
        .bind(new.active)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM user_workflows w WHERE w.id = ?"
        ))
        .bind(result.last_insert_rowid())
        .fetch_one(&self.pool)
        .await?;
        workflow_from_row(&row)
    }

    pub async fn set_active(&self, id: i64, active: bool) -> sqlx::Result<()> {
        sqlx::query("UPDATE user_workflows SET active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_for_user(&self, user_id: i64) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM user_workflows WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
