/// reqwest-based client for the n8n workflow and credential endpoints

use crate::config::N8nConfig;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LOCATION},
    redirect::Policy,
    Method, StatusCode,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;

/// Maximum number of response body characters kept in error messages
const ERROR_BODY_LIMIT: usize = 500;

#[derive(Debug, Error)]
pub enum N8nError {
    #[error("n8n is not configured: {0} is not set")]
    NotConfigured(&'static str),

    #[error("n8n API key contains characters that cannot be sent in a header")]
    InvalidApiKey,

    #[error("{method} {url} failed with status {status}: {body}")]
    Status {
        method: Method,
        url: String,
        status: u16,
        body: String,
    },

    #[error("n8n request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected n8n response: {0}")]
    InvalidResponse(String),
}

impl N8nError {
    /// HTTP status returned by n8n, if the request got that far
    pub fn status(&self) -> Option<u16> {
        match self {
            N8nError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Credential body accepted by `POST /credentials`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCredential<'a> {
    pub name: &'a str,
    #[serde(rename = "type")]
    pub credential_type: &'a str,
    pub data: &'a Map<String, Value>,
    pub nodes_access: Vec<NodeAccess<'a>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAccess<'a> {
    pub node_type: &'a str,
}

/// Client for the n8n REST API
///
/// Every request carries the API key both as `X-N8N-API-KEY` and as a bearer
/// token so that proxies in front of n8n accept it as well.
#[derive(Debug, Clone)]
pub struct N8nClient {
    http: reqwest::Client,
    /// Base URL with the API prefix already appended, without trailing slash
    base: String,
}

impl N8nClient {
    pub fn new(config: &N8nConfig) -> Result<Self, N8nError> {
        let base_url = config.base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(N8nError::NotConfigured("N8N_API_BASE_URL"));
        }
        let key = config.api_key.trim();
        if key.is_empty() {
            return Err(N8nError::NotConfigured("N8N_API_KEY"));
        }

        let mut prefix = config.api_prefix.trim().trim_end_matches('/').to_string();
        if !prefix.is_empty() && !prefix.starts_with('/') {
            prefix.insert(0, '/');
        }

        let mut key_value = HeaderValue::from_str(key).map_err(|_| N8nError::InvalidApiKey)?;
        key_value.set_sensitive(true);
        let mut bearer =
            HeaderValue::from_str(&format!("Bearer {key}")).map_err(|_| N8nError::InvalidApiKey)?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("x-n8n-api-key", key_value);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        // Redirects are never followed: the OAuth helper needs the raw Location header.
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            http,
            base: format!("{base_url}{prefix}"),
        })
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, N8nError> {
        let url = format!("{}{}", self.base, endpoint);
        tracing::debug!("🌍 n8n request: {} {}", method, url);

        let mut builder = self.http.request(method.clone(), &url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let body: String = text.chars().take(ERROR_BODY_LIMIT).collect();
            tracing::warn!("❌ n8n {} {} returned {}: {}", method, url, status, body);
            return Err(N8nError::Status {
                method,
                url,
                status: status.as_u16(),
                body,
            });
        }

        // Some endpoints answer with an empty body
        if text.trim().is_empty() {
            return Ok(json!({}));
        }

        serde_json::from_str(&text)
            .map_err(|e| N8nError::InvalidResponse(format!("{method} {url}: {e}")))
    }

    /// Fetch a workflow definition (used to read templates)
    pub async fn get_workflow(&self, workflow_id: &str) -> Result<Value, N8nError> {
        self.request(Method::GET, &format!("/workflows/{workflow_id}"), None)
            .await
    }

    pub async fn create_workflow(&self, workflow: &Value) -> Result<Value, N8nError> {
        self.request(Method::POST, "/workflows", Some(workflow)).await
    }

    pub async fn update_workflow(
        &self,
        workflow_id: &str,
        workflow: &Value,
    ) -> Result<Value, N8nError> {
        self.request(Method::PATCH, &format!("/workflows/{workflow_id}"), Some(workflow))
            .await
    }

    pub async fn delete_workflow(&self, workflow_id: &str) -> Result<(), N8nError> {
        self.request(Method::DELETE, &format!("/workflows/{workflow_id}"), None)
            .await
            .map(|_| ())
    }

    pub async fn activate_workflow(&self, workflow_id: &str) -> Result<Value, N8nError> {
        self.request(Method::POST, &format!("/workflows/{workflow_id}/activate"), None)
            .await
    }

    pub async fn deactivate_workflow(&self, workflow_id: &str) -> Result<Value, N8nError> {
        self.request(Method::POST, &format!("/workflows/{workflow_id}/deactivate"), None)
            .await
    }

    /// Create a credential usable by the given node types
    pub async fn create_credential(
        &self,
        name: &str,
        credential_type: &str,
        data: &Map<String, Value>,
        node_types: &[String],
    ) -> Result<Value, N8nError> {
        let payload = NewCredential {
            name,
            credential_type,
            data,
            nodes_access: node_types
                .iter()
                .map(|node_type| NodeAccess { node_type })
                .collect(),
        };
        let body = serde_json::to_value(&payload)
            .map_err(|e| N8nError::InvalidResponse(format!("credential payload: {e}")))?;
        self.request(Method::POST, "/credentials", Some(&body)).await
    }

    pub async fn delete_credential(&self, credential_id: &str) -> Result<(), N8nError> {
        self.request(Method::DELETE, &format!("/credentials/{credential_id}"), None)
            .await
            .map(|_| ())
    }

    /// Ask n8n for the provider consent URL of an OAuth credential
    ///
    /// n8n answers with a redirect to the provider; the `Location` header is
    /// returned so the end user can be sent there directly.
    pub async fn build_oauth_authorize_url(
        &self,
        credential_id: &str,
        return_url: &str,
    ) -> Result<String, N8nError> {
        let url = format!("{}/oauth2-credential/auth", self.base);
        let response = self
            .http
            .get(&url)
            .query(&[("id", credential_id), ("redirectAfterAuth", return_url)])
            .send()
            .await?;

        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match location {
            Some(location) if status == StatusCode::OK || status == StatusCode::FOUND => Ok(location),
            _ => {
                let body: String = response
                    .text()
                    .await
                    .unwrap_or_default()
                    .chars()
                    .take(200)
                    .collect();
                Err(N8nError::Status {
                    method: Method::GET,
                    url,
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

/// Extract the `id` of an n8n object; n8n returns either strings or numbers
pub fn id_of(value: &Value) -> Result<String, N8nError> {
    match value.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(N8nError::InvalidResponse(
            "response object has no id".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> N8nConfig {
        N8nConfig {
            base_url: format!("{}/", server.uri()),
            api_prefix: "api/v1/".into(),
            api_key: "n8n-key".into(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn new_requires_base_url_and_key() {
        let mut config = N8nConfig {
            base_url: String::new(),
            api_prefix: "/api/v1".into(),
            api_key: "key".into(),
            timeout_secs: 5,
        };
        assert!(matches!(
            N8nClient::new(&config),
            Err(N8nError::NotConfigured("N8N_API_BASE_URL"))
        ));

        config.base_url = "http://n8n.local".into();
        config.api_key = "  ".into();
        assert!(matches!(
            N8nClient::new(&config),
            Err(N8nError::NotConfigured("N8N_API_KEY"))
        ));
    }

    #[test]
    fn id_of_accepts_strings_and_numbers() {
        assert_eq!(id_of(&json!({"id": "abc"})).unwrap(), "abc");
        assert_eq!(id_of(&json!({"id": 42})).unwrap(), "42");
        assert!(id_of(&json!({"name": "x"})).is_err());
    }

    #[tokio::test]
    async fn sends_both_auth_headers_under_the_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/workflows/7"))
            .and(header("x-n8n-api-key", "n8n-key"))
            .and(header("authorization", "Bearer n8n-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "7", "nodes": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = N8nClient::new(&config_for(&server)).unwrap();
        let workflow = client.get_workflow("7").await.unwrap();
        assert_eq!(workflow["id"], "7");
    }

    #[tokio::test]
    async fn non_success_status_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/workflows"))
            .respond_with(ResponseTemplate::new(400).set_body_string("request/body must NOT have additional properties"))
            .mount(&server)
            .await;

        let client = N8nClient::new(&config_for(&server)).unwrap();
        let err = client.create_workflow(&json!({"name": "x"})).await.unwrap_err();

        assert_eq!(err.status(), Some(400));
        match err {
            N8nError::Status { body, url, .. } => {
                assert!(body.contains("additional properties"));
                assert!(url.ends_with("/api/v1/workflows"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_body_parses_as_empty_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/workflows/9/activate"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = N8nClient::new(&config_for(&server)).unwrap();
        assert_eq!(client.activate_workflow("9").await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn update_workflow_patches_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/v1/workflows/12"))
            .and(body_json(json!({"name": "renamed"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 12, "name": "renamed"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = N8nClient::new(&config_for(&server)).unwrap();
        let updated = client
            .update_workflow("12", &json!({"name": "renamed"}))
            .await
            .unwrap();
        assert_eq!(id_of(&updated).unwrap(), "12");
    }

    #[tokio::test]
    async fn credential_payload_lists_node_access() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/credentials"))
            .and(body_json(json!({
                "name": "assistant:1:100",
                "type": "googleOAuth2",
                "data": {"phone_number": "15550001"},
                "nodesAccess": [
                    {"nodeType": "n8n-nodes-base.gmail"},
                    {"nodeType": "n8n-nodes-base.googleCalendar"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 31})))
            .expect(1)
            .mount(&server)
            .await;

        let client = N8nClient::new(&config_for(&server)).unwrap();
        let mut data = Map::new();
        data.insert("phone_number".into(), json!("15550001"));
        let created = client
            .create_credential(
                "assistant:1:100",
                "googleOAuth2",
                &data,
                &[
                    "n8n-nodes-base.gmail".to_string(),
                    "n8n-nodes-base.googleCalendar".to_string(),
                ],
            )
            .await
            .unwrap();
        assert_eq!(id_of(&created).unwrap(), "31");
    }

    #[tokio::test]
    async fn oauth_authorize_url_returns_location() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/oauth2-credential/auth"))
            .and(query_param("id", "5"))
            .and(query_param("redirectAfterAuth", "https://app.example.com/dashboard"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", "https://accounts.google.com/o/oauth2/v2/auth?x=1"),
            )
            .mount(&server)
            .await;

        let client = N8nClient::new(&config_for(&server)).unwrap();
        let url = client
            .build_oauth_authorize_url("5", "https://app.example.com/dashboard")
            .await
            .unwrap();
        assert!(url.starts_with("https://accounts.google.com/"));
    }

    #[tokio::test]
    async fn oauth_authorize_url_without_redirect_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/oauth2-credential/auth"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let client = N8nClient::new(&config_for(&server)).unwrap();
        let err = client
            .build_oauth_authorize_url("5", "https://app.example.com")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }
}
