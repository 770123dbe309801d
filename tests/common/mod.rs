//! Shared helpers for HTTP-level integration tests.
//!
//! Each test gets its own in-memory SQLite database and, where needed, wiremock
//! servers standing in for n8n and for Google's token, Gmail and Calendar endpoints.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, Response, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use flopro::api::AppState;
use flopro::config::{Config, DatabaseConfig, GoogleConfig, N8nConfig, SecurityConfig, ServerConfig};
use flopro::server::{build_router, create_state};

pub const INTERNAL_KEY: &str = "internal-test-key";
pub const ASSISTANT: &str = "ultimate-personal-assistant";

/// Config pointing at the given mock servers; `None` leaves that integration unconfigured
pub fn test_config(n8n: Option<&MockServer>, google: Option<&MockServer>) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        },
        n8n: N8nConfig {
            base_url: n8n.map(|s| s.uri()).unwrap_or_default(),
            api_prefix: "/api/v1".to_string(),
            api_key: if n8n.is_some() { "n8n-test-key".to_string() } else { String::new() },
            timeout_secs: 5,
        },
        google: GoogleConfig {
            client_id: if google.is_some() { "client-id".to_string() } else { String::new() },
            client_secret: if google.is_some() { "client-secret".to_string() } else { String::new() },
            redirect_uri: "http://localhost:8000/google/oauth/callback".to_string(),
            auth_uri: google
                .map(|s| format!("{}/o/oauth2/auth", s.uri()))
                .unwrap_or_else(|| "https://accounts.google.com/o/oauth2/v2/auth".to_string()),
            token_uri: google
                .map(|s| format!("{}/token", s.uri()))
                .unwrap_or_else(|| "https://oauth2.googleapis.com/token".to_string()),
            post_auth_redirect: "/dashboard".to_string(),
            gmail_api_base: google
                .map(|s| s.uri())
                .unwrap_or_else(|| "https://gmail.googleapis.com".to_string()),
            calendar_api_base: google
                .map(|s| s.uri())
                .unwrap_or_else(|| "https://www.googleapis.com".to_string()),
        },
        security: SecurityConfig {
            internal_api_key: INTERNAL_KEY.to_string(),
            admin_key: None,
            session_ttl_hours: 1,
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

pub async fn build_test_app(config: Config) -> TestApp {
    let state = create_state(config).await.expect("test state");
    TestApp {
        router: build_router(state.clone()),
        state,
    }
}

impl TestApp {
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, bearer: Option<&str>) -> Response<Body> {
        self.send(Method::GET, uri, bearer, None).await
    }

    pub async fn post_json(&self, uri: &str, bearer: Option<&str>, body: Value) -> Response<Body> {
        self.send(Method::POST, uri, bearer, Some(body)).await
    }

    /// Sign up a user and return their session token
    pub async fn signup(&self, username: &str, phone: Option<&str>) -> String {
        let response = self
            .post_json(
                "/api/auth/signup",
                None,
                json!({
                    "username": username,
                    "password": "password123",
                    "email": format!("{username}@example.com"),
                    "phone_number": phone,
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    /// Number of provisioned workflows across all users
    pub async fn workflow_count(&self) -> usize {
        self.state.workflows.list_summaries(None).await.unwrap().len()
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    }
}

/// Template workflow with one Gmail node bound to a placeholder credential
pub fn template_workflow() -> Value {
    json!({
        "id": "2",
        "name": "Ultimate Personal Assistant (template)",
        "active": false,
        "versionId": "abc",
        "nodes": [
            {
                "name": "Gmail",
                "type": "n8n-nodes-base.gmail",
                "credentials": { "googleOAuth2": { "id": "0", "name": "placeholder" } }
            },
            { "name": "Start", "type": "n8n-nodes-base.start" }
        ],
        "connections": {},
        "settings": {}
    })
}

/// Mount the happy-path n8n endpoints used by an unlock
pub async fn mount_n8n_success(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/workflows/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(template_workflow()))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "cred-1"})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/workflows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "wf-100", "active": false})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/workflows/wf-100/activate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "wf-100", "active": true})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/workflows/wf-100/deactivate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "wf-100", "active": false})))
        .mount(server)
        .await;
}

/// Requests n8n received at `request_path` with `http_method`
pub async fn hits(server: &MockServer, http_method: &str, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == http_method && r.url.path() == request_path)
        .count()
}

/// Link a Google account to the user behind `session`; Google's token endpoint
/// hands out "google-access" valid for an hour
pub async fn link_google(app: &TestApp, session: &str, google: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "google-access",
            "refresh_token": "google-refresh",
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "https://www.googleapis.com/auth/gmail.modify https://www.googleapis.com/auth/calendar"
        })))
        .mount(google)
        .await;

    let started = body_json(app.get("/google/oauth/start", Some(session)).await).await;
    let url = url::Url::parse(started["authorize_url"].as_str().unwrap()).unwrap();
    let state = url
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .unwrap();

    let callback = app
        .get(&format!("/google/oauth/callback?code=linked&state={state}"), None)
        .await;
    assert_eq!(callback.status(), StatusCode::SEE_OTHER);
}
