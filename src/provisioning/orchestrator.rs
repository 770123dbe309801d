/// Provisioning orchestration
///
/// Drives the n8n client through the unlock sequence (fetch template, create
/// credential, copy workflow, activate) and records the result. There is no
/// compensation: when a later step fails, objects already created in n8n stay
/// there and their ids are logged so an operator can remove them.

use crate::n8n::{client::id_of, N8nClient, N8nError};
use crate::provisioning::{
    credentials::{validate_credentials, FieldErrors},
    template::prepare_workflow_copy,
};
use crate::store::{
    NewUserWorkflow, Service, ServiceStorage, User, UserWorkflow, UserWorkflowStorage,
};
use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("credential validation failed")]
    Validation(FieldErrors),

    #[error("service '{0}' is not available")]
    ServiceUnavailable(String),

    #[error("service '{0}' is already unlocked")]
    AlreadyProvisioned(String),

    #[error("service '{0}' has not been unlocked")]
    NotProvisioned(String),

    #[error("workflow platform is not configured")]
    PlatformUnavailable,

    #[error("template workflow {0} is not a JSON object")]
    InvalidTemplate(String),

    #[error(transparent)]
    Platform(#[from] N8nError),

    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

/// Orchestrates n8n calls and workflow bookkeeping
#[derive(Debug, Clone)]
pub struct Provisioner {
    /// `None` when N8N_API_BASE_URL or N8N_API_KEY is missing
    client: Option<N8nClient>,
    services: ServiceStorage,
    workflows: UserWorkflowStorage,
}

impl Provisioner {
    pub fn new(
        client: Option<N8nClient>,
        services: ServiceStorage,
        workflows: UserWorkflowStorage,
    ) -> Self {
        Self {
            client,
            services,
            workflows,
        }
    }

    fn client(&self) -> Result<&N8nClient, ProvisionError> {
        self.client.as_ref().ok_or(ProvisionError::PlatformUnavailable)
    }

    /// Unlock `service` for `user` with the submitted credential fields
    ///
    /// Validation and the duplicate check happen before any n8n call. The
    /// user's other active workflows are switched off before the copy is
    /// activated, and the workflow row is written only after n8n activated it.
    pub async fn provision(
        &self,
        user: &User,
        service: &Service,
        submitted: &Map<String, Value>,
    ) -> Result<UserWorkflow, ProvisionError> {
        if !service.is_active {
            return Err(ProvisionError::ServiceUnavailable(service.slug.clone()));
        }

        let credential_data = validate_credentials(&service.credential_ui_schema, submitted)
            .map_err(ProvisionError::Validation)?;

        if self.workflows.get(user.id, service.id).await?.is_some() {
            return Err(ProvisionError::AlreadyProvisioned(service.slug.clone()));
        }

        let client = self.client()?;
        tracing::info!("🚀 Provisioning '{}' for user {}", service.slug, user.id);

        let template = client.get_workflow(&service.template_workflow_id).await?;
        let template = template
            .as_object()
            .ok_or_else(|| ProvisionError::InvalidTemplate(service.template_workflow_id.clone()))?;

        let credential_name = format!("{}:{}:{}", service.slug, user.id, Utc::now().timestamp());
        let workflow_name = format!("{} - {} (#{})", service.name, user.username, user.id);

        let credential = client
            .create_credential(
                &credential_name,
                &service.credential_type,
                &credential_data,
                &service.credential_node_types,
            )
            .await?;
        let credential_id = id_of(&credential)?;

        let payload = prepare_workflow_copy(
            template,
            &workflow_name,
            &service.credential_type,
            &credential_id,
            &credential_name,
        );

        let workflow_id = match client.create_workflow(&payload).await.and_then(|w| id_of(&w)) {
            Ok(id) => id,
            Err(e) => {
                log_orphans(&credential_id, None, &e);
                return Err(e.into());
            }
        };

        self.deactivate_others(client, user.id, None).await?;
        if let Err(e) = client.activate_workflow(&workflow_id).await {
            log_orphans(&credential_id, Some(&workflow_id), &e);
            return Err(e.into());
        }

        let row = self
            .workflows
            .insert(&NewUserWorkflow {
                user_id: user.id,
                service_id: service.id,
                n8n_workflow_id: &workflow_id,
                n8n_credential_id: &credential_id,
                name: &workflow_name,
                active: true,
            })
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    log_orphans(&credential_id, Some(&workflow_id), &"concurrent unlock");
                    ProvisionError::AlreadyProvisioned(service.slug.clone())
                }
                other => ProvisionError::Storage(other),
            })?;

        tracing::info!(
            "✅ Provisioned '{}' for user {}: workflow {} credential {}",
            service.slug,
            user.id,
            workflow_id,
            credential_id
        );

        Ok(row)
    }

    /// Set the activation state of the user's workflow for `service`
    ///
    /// Activating deactivates the user's other active workflows first, so a user
    /// has at most one active service. The stored flag follows n8n only after the
    /// call for the target workflow succeeded.
    pub async fn toggle(
        &self,
        user: &User,
        service: &Service,
        desired_active: bool,
    ) -> Result<UserWorkflow, ProvisionError> {
        let row = self
            .workflows
            .get(user.id, service.id)
            .await?
            .ok_or_else(|| ProvisionError::NotProvisioned(service.slug.clone()))?;
        let client = self.client()?;

        if desired_active {
            self.deactivate_others(client, user.id, Some(row.id)).await?;
            client.activate_workflow(&row.n8n_workflow_id).await?;
        } else {
            client.deactivate_workflow(&row.n8n_workflow_id).await?;
        }

        self.workflows.set_active(row.id, desired_active).await?;
        tracing::info!(
            "🔁 Workflow {} of user {} is now {}",
            row.n8n_workflow_id,
            user.id,
            if desired_active { "active" } else { "inactive" }
        );

        self.workflows
            .get(user.id, service.id)
            .await?
            .ok_or_else(|| ProvisionError::NotProvisioned(service.slug.clone()))
    }

    /// Deactivate every active workflow of the user except `keep`
    ///
    /// n8n failures are logged; the local flag is cleared regardless since the
    /// workflow might already be inactive there.
    async fn deactivate_others(
        &self,
        client: &N8nClient,
        user_id: i64,
        keep: Option<i64>,
    ) -> Result<(), ProvisionError> {
        let others = self.workflows.list_for_user(user_id).await?;
        for other in others.iter().filter(|w| w.active && Some(w.id) != keep) {
            if let Err(e) = client.deactivate_workflow(&other.n8n_workflow_id).await {
                tracing::warn!(
                    "⚠️ Could not deactivate workflow {} of user {}: {}",
                    other.n8n_workflow_id,
                    user_id,
                    e
                );
            }
            self.workflows.set_active(other.id, false).await?;
        }
        Ok(())
    }

    /// Consent URL for the provider behind the user's n8n credential
    pub async fn credential_authorize_url(
        &self,
        user: &User,
        service: &Service,
        return_url: &str,
    ) -> Result<String, ProvisionError> {
        let row = self
            .workflows
            .get(user.id, service.id)
            .await?
            .ok_or_else(|| ProvisionError::NotProvisioned(service.slug.clone()))?;
        Ok(self
            .client()?
            .build_oauth_authorize_url(&row.n8n_credential_id, return_url)
            .await?)
    }

    /// The service whose workflow is currently active for the user
    pub async fn active_service(&self, user_id: i64) -> Result<Option<Service>, ProvisionError> {
        match self.workflows.active_for_user(user_id).await? {
            Some(workflow) => Ok(self.services.get(workflow.service_id).await?),
            None => Ok(None),
        }
    }

    /// Remove every n8n workflow and credential of a user, then their rows
    ///
    /// n8n failures are logged and skipped so one broken workflow does not keep
    /// the rest around.
    pub async fn cleanup_user(&self, user_id: i64) -> Result<u64, ProvisionError> {
        let workflows = self.workflows.list_for_user(user_id).await?;

        match &self.client {
            Some(client) => {
                for workflow in &workflows {
                    let result = async {
                        if workflow.active {
                            client.deactivate_workflow(&workflow.n8n_workflow_id).await?;
                        }
                        client.delete_workflow(&workflow.n8n_workflow_id).await?;
                        client.delete_credential(&workflow.n8n_credential_id).await
                    }
                    .await;

                    if let Err(e) = result {
                        tracing::warn!(
                            "⚠️ Cleanup of workflow {} / credential {} failed: {}",
                            workflow.n8n_workflow_id,
                            workflow.n8n_credential_id,
                            e
                        );
                    }
                }
            }
            None if !workflows.is_empty() => {
                tracing::warn!(
                    "⚠️ n8n is not configured; {} workflow(s) of user {} stay in n8n",
                    workflows.len(),
                    user_id
                );
            }
            None => {}
        }

        Ok(self.workflows.delete_for_user(user_id).await?)
    }
}

fn log_orphans(credential_id: &str, workflow_id: Option<&str>, error: &dyn std::fmt::Display) {
    tracing::warn!(
        "⚠️ Provisioning aborted ({}); left behind in n8n: credential {}, workflow {}",
        error,
        credential_id,
        workflow_id.unwrap_or("-")
    );
}
