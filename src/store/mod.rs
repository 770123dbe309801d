/// Persistence layer
///
/// SQLite storage for users, the service catalog, provisioned workflows and
/// Google tokens. Each storage type wraps a cloned `SqlitePool`.

pub mod database;
pub mod google_credentials;
pub mod services;
pub mod types;
pub mod user_workflows;
pub mod users;

pub use google_credentials::GoogleCredentialStorage;
pub use services::ServiceStorage;
pub use types::{CredentialField, CredentialSchema, FieldKind, GoogleCredential, Service, User, UserWorkflow};
pub use user_workflows::{NewUserWorkflow, UserWorkflowStorage, UserWorkflowSummary};
pub use users::UserStorage;
