// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Translate broker failures into operator-facing messages.

use crate::account::Strategy;
use crate::error::BrokerError;

const REAUTHORIZE: &str =
    "Re-run the authorization flow for this account at /setup?token=<setup secret>&account=<account>.";

/// Human-readable diagnostic for `err`. Never fails.
///
/// Errors with an upstream HTTP status are described by status alone (the
/// body is only echoed for unclassified statuses). Local errors are matched
/// against the revoked-token and missing-credential conditions.
pub fn translate(err: &BrokerError) -> String {
    match err {
        BrokerError::Upstream { status, body, strategy } => {
            translate_status(*status, body, *strategy)
        }
        _ => translate_local(err),
    }
}

fn translate_status(status: u16, body: &str, strategy: Option<Strategy>) -> String {
    match status {
        400 => format!("The upstream API rejected the request as malformed: {}", excerpt(body)),
        401 => match strategy {
            Some(Strategy::Delegated) => "Authentication failed for the delegated account. \
                 Check that the service account key is valid and that domain-wide delegation \
                 grants it the required scopes."
                .to_owned(),
            _ => format!(
                "Authentication failed for this account: its refresh token may have been \
                 revoked or expired. {REAUTHORIZE}"
            ),
        },
        403 => "Permission denied: the credential is missing a required scope, or the API is \
                not enabled for this account."
            .to_owned(),
        404 => "The requested resource was not found.".to_owned(),
        429 => "Rate limit exceeded. Back off and retry the request later.".to_owned(),
        _ => format!("Upstream API error (HTTP {status}): {}", excerpt(body)),
    }
}

fn translate_local(err: &BrokerError) -> String {
    match err {
        BrokerError::CredentialRevoked { account, .. } => revoked_message(Some(account)),
        BrokerError::MissingCredential { account } => missing_message(Some(account)),
        BrokerError::NoRefreshTokenIssued { account } => format!(
            "The provider issued no refresh token for {account}, usually because this client was \
             already granted access. Revoke the app's access in the account's security settings, \
             then run the authorization flow again."
        ),
        BrokerError::PathOutsideService { service, path } => format!(
            "The path {path:?} does not stay under the {service} API. Pass a path relative to \
             the service base URL."
        ),
        BrokerError::AccountNotAllowed { account } => {
            format!("Account {account} is not configured for this service.")
        }
        _ => {
            let text = err.to_string();
            let lower = text.to_lowercase();
            if lower.contains("invalid_grant") || lower.contains("expired or revoked") {
                revoked_message(None)
            } else if lower.contains("no oauth credential") || lower.contains("not authorized yet")
            {
                missing_message(None)
            } else {
                format!("Error: {text}")
            }
        }
    }
}

fn revoked_message(account: Option<&str>) -> String {
    let who = account.map(|a| format!(" for {a}")).unwrap_or_default();
    format!("The stored refresh token{who} has expired or been revoked. {REAUTHORIZE}")
}

fn missing_message(account: Option<&str>) -> String {
    match account {
        Some(a) => format!(
            "No OAuth credential is stored for {a}. Authorize it at \
             /setup?token=<setup secret>&account={a}."
        ),
        None => format!("No OAuth credential is stored for this account. {REAUTHORIZE}"),
    }
}

/// Bound upstream bodies so a large HTML error page does not flood the caller.
fn excerpt(body: &str) -> String {
    const LIMIT: usize = 500;
    let body = body.trim();
    if body.is_empty() {
        return "(empty body)".to_owned();
    }
    match body.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_owned(),
    }
}

#[cfg(test)]
#[path = "translate_tests.rs"]
mod tests;
