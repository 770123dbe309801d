/// Persistent record types
///
/// Rows are mapped by hand from `sqlx::sqlite::SqliteRow`; JSON columns
/// (credential schema, node types) are stored as serialized text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An account that can unlock services
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    /// Digits only, see [`normalize_phone`]
    pub phone_number: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Input form field kinds understood by the unlock form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Password,
    Number,
    Email,
    Url,
    Checkbox,
    Textarea,
    /// Anything else is treated as free text
    #[serde(other)]
    Other,
}

impl Default for FieldKind {
    fn default() -> Self {
        FieldKind::Text
    }
}

/// Descriptor of one credential input field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialField {
    #[serde(rename = "type", default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
}

/// Field name -> descriptor
pub type CredentialSchema = BTreeMap<String, CredentialField>;

/// A catalog entry backed by an n8n template workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    /// Workflow id of the template inside n8n
    pub template_workflow_id: String,
    /// n8n credential type, e.g. "googleOAuth2" or "httpBasicAuth"
    pub credential_type: String,
    pub credential_ui_schema: CredentialSchema,
    /// n8n node types allowed to use the credential
    pub credential_node_types: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Admin-supplied service definition (everything but ids and timestamps)
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    pub template_workflow_id: String,
    pub credential_type: String,
    #[serde(default)]
    pub credential_ui_schema: CredentialSchema,
    #[serde(default)]
    pub credential_node_types: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// A user's provisioned copy of a service
#[derive(Debug, Clone, Serialize)]
pub struct UserWorkflow {
    pub id: i64,
    pub user_id: i64,
    pub service_id: i64,
    pub n8n_workflow_id: String,
    pub n8n_credential_id: String,
    /// Name of the workflow in n8n
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Google tokens stored for a user
#[derive(Debug, Clone)]
pub struct GoogleCredential {
    pub user_id: i64,
    pub access_token: Option<String>,
    pub refresh_token: String,
    pub token_expiry: Option<DateTime<Utc>>,
    /// Space separated scope list as granted by Google
    pub scopes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Strip everything but digits so "+1 (876) 595-2596" and "18765952596" match
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}
