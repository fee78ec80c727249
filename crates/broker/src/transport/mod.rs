// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the credential broker.

pub mod auth;
pub mod http;
pub mod mcp;
pub mod setup;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum `Router` with all broker routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/health", get(http::health))
        // Authorization flow (setup secret)
        .route("/setup", get(setup::setup))
        .route("/oauth2callback", get(setup::oauth_callback))
        // Tool endpoint (bearer token)
        .route("/mcp", post(mcp::mcp))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
