// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use crate::credential::broker::CredentialBroker;
use crate::credential::flow::AuthorizationFlow;

/// Shared state handed to every HTTP handler.
pub struct AppState {
    /// Bearer token required on the tool endpoint.
    pub auth_token: String,
    pub broker: Arc<CredentialBroker>,
    pub flow: AuthorizationFlow,
}

impl AppState {
    pub fn new(auth_token: impl Into<String>, flow: AuthorizationFlow) -> Self {
        let broker = Arc::clone(flow.broker());
        Self { auth_token: auth_token.into(), broker, flow }
    }
}
