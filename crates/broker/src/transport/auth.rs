// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::credential::flow::secrets_match;
use crate::error::ApiError;
use crate::state::AppState;

/// Validate a Bearer token from HTTP headers.
pub fn validate_bearer(headers: &HeaderMap, expected: &str) -> Result<(), ApiError> {
    let header =
        headers.get("authorization").and_then(|v| v.to_str().ok()).ok_or(ApiError::Unauthorized)?;

    let token = header.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;
    if secrets_match(token.trim(), expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// Axum middleware that enforces Bearer token authentication.
///
/// Exempt: `/health`, plus `/setup` and `/oauth2callback`, which are browser
/// pages gated by the setup secret instead.
pub async fn auth_layer(
    state: State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();

    if path == "/health" || path == "/setup" || path == "/oauth2callback" {
        return next.run(req).await;
    }

    if let Err(code) = validate_bearer(req.headers(), &state.auth_token) {
        tracing::debug!(path, "rejected request without valid bearer token");
        return code.to_http_response("unauthorized").into_response();
    }

    next.run(req).await
}
