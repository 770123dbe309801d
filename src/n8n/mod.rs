/// n8n REST API access
///
/// A thin wrapper over the workflow and credential endpoints used to provision
/// per-user copies of template workflows. No retries: every failure propagates to
/// the caller with the HTTP status and body attached.

pub mod client;

pub use client::{N8nClient, N8nError};
