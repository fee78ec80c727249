// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for unit tests: a local stand-in for the authorization
//! provider and service APIs, and a broker wired to it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::json;
use tokio::net::TcpListener;

use crate::account::AccountRegistry;
use crate::credential::broker::CredentialBroker;
use crate::credential::flow::{AuthorizationFlow, FlowSettings};
use crate::credential::persist::{TokenRecord, TokenStore};
use crate::credential::service_account::ServiceAccountKey;
use crate::credential::Endpoints;

pub const TEST_KEY_PEM: &str = include_str!("../tests/fixtures/test_key.pem");
pub const KEY_EMAIL: &str = "broker@test-project.iam.gserviceaccount.com";
pub const SETUP_SECRET: &str = "setup-secret";

/// Service-account key JSON pointing at `token_uri`.
pub fn key_json(token_uri: &str) -> String {
    json!({
        "type": "service_account",
        "client_email": KEY_EMAIL,
        "private_key": TEST_KEY_PEM,
        "private_key_id": "kid-1",
        "token_uri": token_uri,
    })
    .to_string()
}

pub fn test_key(token_uri: &str) -> anyhow::Result<ServiceAccountKey> {
    ServiceAccountKey::from_json(&key_json(token_uri))
}

/// A 200 token response body.
pub fn token_ok(access: &str, refresh: Option<&str>) -> (u16, String) {
    let mut body = json!({ "access_token": access, "expires_in": 3600, "token_type": "Bearer" });
    if let Some(refresh) = refresh {
        body["refresh_token"] = json!(refresh);
    }
    (200, body.to_string())
}

pub fn token_err(status: u16, error: &str, description: &str) -> (u16, String) {
    (status, json!({ "error": error, "error_description": description }).to_string())
}

pub fn record(refresh: &str) -> TokenRecord {
    TokenRecord {
        client_id: "cid".to_owned(),
        client_secret: "csecret".to_owned(),
        refresh_token: refresh.to_owned(),
    }
}

struct MockState {
    token_responses: Vec<(u16, String)>,
    token_calls: Arc<AtomicU32>,
    token_forms: Arc<Mutex<Vec<String>>>,
    profile_email: Arc<Mutex<String>>,
}

/// Handle to a running mock upstream.
pub struct MockUpstream {
    pub addr: SocketAddr,
    pub token_calls: Arc<AtomicU32>,
    pub token_forms: Arc<Mutex<Vec<String>>>,
    pub profile_email: Arc<Mutex<String>>,
}

impl MockUpstream {
    pub fn base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn token_uri(&self) -> String {
        format!("http://{}/token", self.addr)
    }

    pub fn token_call_count(&self) -> u32 {
        self.token_calls.load(Ordering::Relaxed)
    }

    pub fn set_profile_email(&self, email: &str) {
        *self.profile_email.lock() = email.to_owned();
    }
}

/// Start a mock upstream.
///
/// - `POST /token` answers with `token_responses` in order, repeating the last.
/// - `GET /mail/users/me/profile` reports the configured `emailAddress`.
/// - Any other path echoes method, path, authorization header and body, except
///   paths ending in `missing` (404), `unauthorized` (401), `throttled` (429)
///   and `empty` (204).
pub async fn mock_upstream(token_responses: Vec<(u16, String)>) -> anyhow::Result<MockUpstream> {
    let state = Arc::new(MockState {
        token_responses,
        token_calls: Arc::new(AtomicU32::new(0)),
        token_forms: Arc::new(Mutex::new(Vec::new())),
        profile_email: Arc::new(Mutex::new("alice@example.com".to_owned())),
    });
    let token_calls = Arc::clone(&state.token_calls);
    let token_forms = Arc::clone(&state.token_forms);
    let profile_email = Arc::clone(&state.profile_email);

    let app = Router::new()
        .route("/token", post(mock_token))
        .route("/mail/users/me/profile", get(mock_profile))
        .fallback(mock_echo)
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Ok(MockUpstream { addr, token_calls, token_forms, profile_email })
}

async fn mock_token(State(s): State<Arc<MockState>>, body: String) -> Response {
    let idx = s.token_calls.fetch_add(1, Ordering::Relaxed) as usize;
    s.token_forms.lock().push(body);
    let (status, body) = s
        .token_responses
        .get(idx)
        .or_else(|| s.token_responses.last())
        .cloned()
        .unwrap_or((500, "{}".to_owned()));
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [("content-type", "application/json")], body).into_response()
}

async fn mock_profile(State(s): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !headers.contains_key("authorization") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let email = s.profile_email.lock().clone();
    Json(json!({ "emailAddress": email, "messagesTotal": 7 })).into_response()
}

async fn mock_echo(method: Method, uri: Uri, headers: HeaderMap, body: String) -> Response {
    let path = uri.path().to_owned();
    if path.ends_with("missing") {
        return (StatusCode::NOT_FOUND, r#"{"error":{"code":404,"message":"Not Found"}}"#)
            .into_response();
    }
    if path.ends_with("throttled") {
        return (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response();
    }
    if path.ends_with("unauthorized") {
        return (StatusCode::UNAUTHORIZED, r#"{"error":{"code":401}}"#).into_response();
    }
    if path.ends_with("empty") {
        return StatusCode::NO_CONTENT.into_response();
    }
    let authorization =
        headers.get("authorization").and_then(|v| v.to_str().ok()).unwrap_or_default();
    Json(json!({
        "method": method.as_str(),
        "path": path,
        "query": uri.query(),
        "authorization": authorization,
        "body": body,
    }))
    .into_response()
}

/// A broker over the default registry, a temp token file, and a mock upstream.
pub struct Harness {
    pub broker: Arc<CredentialBroker>,
    pub upstream: MockUpstream,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn token_path(&self) -> std::path::PathBuf {
        self.dir.path().join("oauth_tokens.json")
    }

    pub fn flow(&self) -> AuthorizationFlow {
        AuthorizationFlow::new(
            FlowSettings {
                client_id: "cid".to_owned(),
                client_secret: "csecret".to_owned(),
                setup_secret: SETUP_SECRET.to_owned(),
                redirect_uri: "https://broker.example.com/oauth2callback".to_owned(),
            },
            Arc::clone(&self.broker),
        )
    }
}

pub async fn harness(token_responses: Vec<(u16, String)>) -> anyhow::Result<Harness> {
    let upstream = mock_upstream(token_responses).await?;
    let dir = tempfile::tempdir()?;
    let tokens = TokenStore::empty(dir.path().join("oauth_tokens.json"));
    let broker = CredentialBroker::new(
        AccountRegistry::default(),
        test_key(&upstream.token_uri())?,
        tokens,
        Endpoints::rooted_at(&upstream.base()),
        crate::http_client()?,
    );
    Ok(Harness { broker, upstream, dir })
}
