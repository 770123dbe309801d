/// flopro: unlock automation services by provisioning n8n workflows per user
///
/// Users pick a service from the catalog, submit the credentials it needs and
/// get their own activated copy of the service's template workflow. Google
/// accounts can be linked so n8n can act on Gmail and Calendar.

// Core configuration and setup
pub mod config;

// HTTP error type and status mapping
pub mod error;

// SQLite persistence - users, sessions, catalog, provisioned workflows, Google tokens
pub mod store;

// n8n REST client
pub mod n8n;

// Credential validation, template copying and the unlock/toggle orchestration
pub mod provisioning;

// Google consent flow, token refresh and the Gmail/Calendar client
pub mod google;

// HTTP API layer - user, internal and admin endpoints
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use config::Config;
pub use error::{AppError, AppResult};
pub use n8n::N8nClient;
pub use provisioning::Provisioner;
pub use server::{create_app, start_server};
pub use store::{Service, User, UserWorkflow};
