/// Provisioning layer
///
/// Turns a service template plus user credentials into an active, user-specific
/// n8n workflow:
/// - Credential form validation against the service schema
/// - Template duplication with credential rebinding
/// - Orchestration, activation toggling and cleanup

pub mod credentials;
pub mod orchestrator;
pub mod template;

pub use credentials::{validate_credentials, FieldErrors};
pub use orchestrator::{ProvisionError, Provisioner};
pub use template::prepare_workflow_copy;
