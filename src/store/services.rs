/// Service catalog persistence

use crate::store::types::{Service, ServiceDefinition};
use chrono::Utc;
use sqlx::{
    sqlite::{SqlitePool, SqliteRow},
    Row,
};

/// SQLite-backed service catalog
#[derive(Debug, Clone)]
pub struct ServiceStorage {
    pool: SqlitePool,
}

const SERVICE_COLUMNS: &str = "id, slug, name, description, icon, template_workflow_id, \
     credential_type, credential_ui_schema, credential_node_types, is_active, created_at, updated_at";

fn decode_json<T: serde::de::DeserializeOwned>(row: &SqliteRow, column: &str) -> sqlx::Result<T> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn encode_json<T: serde::Serialize>(value: &T) -> sqlx::Result<String> {
    serde_json::to_string(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

fn service_from_row(row: &SqliteRow) -> sqlx::Result<Service> {
    Ok(Service {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        icon: row.try_get("icon")?,
        template_workflow_id: row.try_get("template_workflow_id")?,
        credential_type: row.try_get("credential_type")?,
        credential_ui_schema: decode_json(row, "credential_ui_schema")?,
        credential_node_types: decode_json(row, "credential_node_types")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl ServiceStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List services ordered by name, optionally only the ones open to users
    pub async fn list(&self, only_active: bool) -> sqlx::Result<Vec<Service>> {
        let sql = if only_active {
            format!("SELECT {SERVICE_COLUMNS} FROM services WHERE is_active = 1 ORDER BY name")
        } else {
            format!("SELECT {SERVICE_COLUMNS} FROM services ORDER BY name")
        };

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(service_from_row).collect()
    }

    pub async fn get_by_slug(&self, slug: &str) -> sqlx::Result<Option<Service>> {
        let row = sqlx::query(&format!("SELECT {SERVICE_COLUMNS} FROM services WHERE slug = ?"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(service_from_row).transpose()
    }

    pub async fn get(&self, id: i64) -> sqlx::Result<Option<Service>> {
        let row = sqlx::query(&format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(service_from_row).transpose()
    }

    /// Create or replace the service with the given slug
    pub async fn upsert(&self, slug: &str, definition: &ServiceDefinition) -> sqlx::Result<Service> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO services (slug, name, description, icon, template_workflow_id, credential_type,
                                  credential_ui_schema, credential_node_types, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                icon = excluded.icon,
                template_workflow_id = excluded.template_workflow_id,
                credential_type = excluded.credential_type,
                credential_ui_schema = excluded.credential_ui_schema,
                credential_node_types = excluded.credential_node_types,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(slug)
        .bind(&definition.name)
        .bind(&definition.description)
        .bind(&definition.icon)
        .bind(&definition.template_workflow_id)
        .bind(&definition.credential_type)
        .bind(encode_json(&definition.credential_ui_schema)?)
        .bind(encode_json(&definition.credential_node_types)?)
        .bind(definition.is_active)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_by_slug(slug).await?.ok_or(sqlx::Error::RowNotFound)
    }

    /// Insert the service unless the slug is taken. Returns whether a row was created.
    pub async fn insert_if_missing(
        &self,
        slug: &str,
        definition: &ServiceDefinition,
    ) -> sqlx::Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO services (slug, name, description, icon, template_workflow_id, credential_type,
                                  credential_ui_schema, credential_node_types, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(slug) DO NOTHING
            "#,
        )
        .bind(slug)
        .bind(&definition.name)
        .bind(&definition.description)
        .bind(&definition.icon)
        .bind(&definition.template_workflow_id)
        .bind(&definition.credential_type)
        .bind(encode_json(&definition.credential_ui_schema)?)
        .bind(encode_json(&definition.credential_node_types)?)
        .bind(definition.is_active)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a service and, through the foreign key, its user workflows
    pub async fn delete(&self, slug: &str) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM services WHERE slug = ?")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
