/// HTTP error type shared by all handlers
///
/// Rendered as `{"error": {"message", "type", "code"}}`; validation errors add a
/// `fields` object with one message per form field.

use crate::google::GoogleError;
use crate::n8n::N8nError;
use crate::provisioning::{FieldErrors, ProvisionError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("validation failed")]
    Validation(FieldErrors),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<ProvisionError> for AppError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::Validation(fields) => AppError::Validation(fields),
            ProvisionError::ServiceUnavailable(slug) => {
                AppError::NotFound(format!("service '{slug}' is not available"))
            }
            ProvisionError::AlreadyProvisioned(slug) => {
                AppError::Conflict(format!("service '{slug}' is already unlocked"))
            }
            ProvisionError::NotProvisioned(slug) => {
                AppError::NotFound(format!("service '{slug}' has not been unlocked"))
            }
            ProvisionError::PlatformUnavailable => {
                AppError::Unavailable("workflow platform is not configured".to_string())
            }
            err @ ProvisionError::InvalidTemplate(_) => AppError::Upstream(err.to_string()),
            ProvisionError::Platform(e) => {
                tracing::error!("n8n call failed: {}", e);
                match &e {
                    N8nError::Status { status, body, .. } if body.trim().is_empty() => AppError::Upstream(
                        format!("workflow platform rejected the request (status {status})"),
                    ),
                    N8nError::Status { status, body, .. } => AppError::Upstream(format!(
                        "workflow platform rejected the request (status {status}): {}",
                        body.trim()
                    )),
                    N8nError::InvalidResponse(detail) => AppError::Upstream(format!(
                        "workflow platform sent an unexpected response: {detail}"
                    )),
                    _ => AppError::Upstream("workflow platform is unreachable".to_string()),
                }
            }
            ProvisionError::Storage(e) => AppError::Database(e),
        }
    }
}

impl From<GoogleError> for AppError {
    fn from(err: GoogleError) -> Self {
        match err {
            GoogleError::NotConfigured => AppError::Unavailable(err.to_string()),
            GoogleError::UnknownState | GoogleError::ExpiredState => AppError::BadRequest(err.to_string()),
            GoogleError::NotConnected => AppError::NotFound(err.to_string()),
            GoogleError::Exchange(_) | GoogleError::MissingRefreshToken => {
                tracing::error!("Google OAuth failed: {}", err);
                AppError::Upstream(err.to_string())
            }
            GoogleError::InvalidRequest(m) => AppError::BadRequest(m),
            GoogleError::Api { status: 404, .. } => {
                AppError::NotFound("Google could not find the requested resource".to_string())
            }
            GoogleError::Api { status, ref body, .. } => {
                tracing::error!("Google API call failed: {}", err);
                AppError::Upstream(format!("Google rejected the request (status {status}): {}", body.trim()))
            }
            GoogleError::Transport(_) | GoogleError::InvalidResponse(_) => {
                tracing::error!("Google API call failed: {}", err);
                AppError::Upstream(err.to_string())
            }
            GoogleError::InvalidEndpoint(_) => AppError::Internal(anyhow::anyhow!(err.to_string())),
            GoogleError::Storage(e) => AppError::Database(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::Unauthorized(m) => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "unauthorized",
                m.clone(),
            ),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "permission_error", "forbidden", m.clone()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "invalid_request_error", "not_found", m.clone()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "invalid_request_error", "conflict", m.clone()),
            AppError::BadRequest(m) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "bad_request",
                m.clone(),
            ),
            AppError::Validation(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_request_error",
                "validation_failed",
                "submitted credentials are invalid".to_string(),
            ),
            AppError::Unavailable(m) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable_error",
                "not_configured",
                m.clone(),
            ),
            AppError::Upstream(m) => (StatusCode::BAD_GATEWAY, "upstream_error", "upstream_failed", m.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let mut error = json!({
            "message": msg,
            "type": error_type,
            "code": code,
        });
        if let AppError::Validation(fields) = &self {
            error["fields"] = json!(fields);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn provisioning_errors_map_to_statuses() {
        let cases = [
            (ProvisionError::AlreadyProvisioned("crm".into()), StatusCode::CONFLICT),
            (ProvisionError::NotProvisioned("crm".into()), StatusCode::NOT_FOUND),
            (ProvisionError::PlatformUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (
                ProvisionError::Platform(N8nError::Status {
                    method: reqwest::Method::POST,
                    url: "http://n8n/api/v1/workflows".into(),
                    status: 500,
                    body: "boom".into(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ProvisionError::Validation(FieldErrors(BTreeMap::from([(
                    "phone_number".to_string(),
                    "This field is required.".to_string(),
                )]))),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];

        for (err, expected) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[tokio::test]
    async fn platform_rejection_carries_the_response_body() {
        let err = ProvisionError::Platform(N8nError::Status {
            method: reqwest::Method::POST,
            url: "http://n8n/api/v1/credentials".into(),
            status: 400,
            body: "request/body/data must have required property 'clientId'\n".into(),
        });
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body["error"]["message"],
            "workflow platform rejected the request (status 400): request/body/data must have required property 'clientId'"
        );
    }

    #[test]
    fn google_state_errors_are_client_errors() {
        let response = AppError::from(GoogleError::UnknownState).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = AppError::from(GoogleError::ExpiredState).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = AppError::from(GoogleError::NotConfigured).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
