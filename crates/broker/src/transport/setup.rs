// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser-facing authorization pages: `/setup` and `/oauth2callback`.

use std::fmt::Write as _;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;

use crate::account::Strategy;
use crate::error::{ApiError, BrokerError};
use crate::state::AppState;
use crate::translate::translate;

#[derive(Debug, Default, Deserialize)]
pub struct SetupQuery {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    /// Set by the provider when the user denies consent.
    #[serde(default)]
    pub error: Option<String>,
}

/// `GET /setup?token=&account=`: list accounts, or redirect to consent.
pub async fn setup(State(s): State<Arc<AppState>>, Query(q): Query<SetupQuery>) -> Response {
    let token = q.token.unwrap_or_default();
    if s.flow.check_secret(&token).is_err() {
        tracing::warn!("setup request with invalid token");
        return page(StatusCode::UNAUTHORIZED, "Unauthorized", "Invalid or missing setup token.");
    }

    let account = q.account.map(|a| a.trim().to_owned()).filter(|a| !a.is_empty());
    match account {
        None => Html(render_listing(&s, &token)).into_response(),
        Some(account) => match s.flow.start(&token, &account) {
            Ok(url) => Redirect::to(&url).into_response(),
            Err(e) => error_page(&e),
        },
    }
}

/// `GET /oauth2callback?code=&state=`: finish the authorization flow.
pub async fn oauth_callback(
    State(s): State<Arc<AppState>>,
    Query(q): Query<CallbackQuery>,
) -> Response {
    // The state is checked before anything else the provider sent back.
    let Some(raw_state) = q.state else {
        return error_page(&BrokerError::AuthorizationStateInvalid);
    };
    let state = match s.flow.validate_state(&raw_state) {
        Ok(state) => state,
        Err(e) => return error_page(&e),
    };
    if let Some(err) = q.error {
        tracing::warn!(account = %state.account, error = %err, "provider reported authorization error");
        return page(
            StatusCode::BAD_REQUEST,
            "Authorization failed",
            &format!("The authorization provider returned an error: {err}"),
        );
    }
    let Some(code) = q.code.filter(|c| !c.is_empty()) else {
        return page(StatusCode::BAD_REQUEST, "Authorization failed", "Missing authorization code.");
    };

    match s.flow.finish(&code, state).await {
        Ok(account) => page(
            StatusCode::OK,
            "Authorization complete",
            &format!("Stored credentials for {account}. You can close this window."),
        ),
        Err(e) => error_page(&e),
    }
}

fn render_listing(s: &AppState, token: &str) -> String {
    let mut items = String::new();
    for info in s.broker.account_status() {
        let account = escape_html(&info.account);
        let _ = match info.strategy {
            Strategy::Delegated => {
                writeln!(items, "<li><strong>{account}</strong>: delegated (service account)</li>")
            }
            Strategy::OAuth => {
                let status = if info.ready { "authorized" } else { "not authorized" };
                let query = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("token", token)
                    .append_pair("account", &info.account)
                    .finish();
                let label = if info.ready { "Re-authorize" } else { "Authorize" };
                writeln!(
                    items,
                    "<li><strong>{account}</strong>: {status} \
                     <a href=\"/setup?{}\">{label}</a></li>",
                    escape_html(&query)
                )
            }
        };
    }
    format!(
        "<!doctype html><html><head><title>Account setup</title></head><body>\
         <h1>Account setup</h1><ul>\n{items}</ul>\
         <p>Callback URL: <code>{}</code></p></body></html>",
        escape_html(s.flow.redirect_uri())
    )
}

fn error_page(err: &BrokerError) -> Response {
    let code = ApiError::from_kind(err.kind());
    page(code.status_code(), "Authorization failed", &translate(err))
}

fn page(status: StatusCode, title: &str, message: &str) -> Response {
    let body = format!(
        "<!doctype html><html><head><title>{title}</title></head><body>\
         <h1>{title}</h1><p>{}</p></body></html>",
        escape_html(message)
    );
    (status, Html(body)).into_response()
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
