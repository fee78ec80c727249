// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth token endpoint calls and the refresh-token credential.

use serde::{Deserialize, Serialize};

use crate::account::Strategy;
use crate::credential::persist::TokenRecord;
use crate::credential::TokenCache;
use crate::error::BrokerError;

/// Standard OAuth2 token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// OAuth2 error body (`{"error": "...", "error_description": "..."}`).
#[derive(Debug, Default, Deserialize)]
struct TokenErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// POST a form to a token endpoint and decode the token response.
///
/// Non-2xx responses come back as `Upstream` errors carrying the raw body;
/// callers decide whether an `invalid_grant` means something more specific.
pub async fn post_token_form(
    http: &reqwest::Client,
    token_uri: &str,
    form: &[(&str, &str)],
    strategy: Option<Strategy>,
) -> Result<TokenResponse, BrokerError> {
    let resp = http.post(token_uri).form(form).send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(BrokerError::Upstream { status: status.as_u16(), body, strategy });
    }
    let token: TokenResponse = resp.json().await?;
    Ok(token)
}

/// Description of an `invalid_grant` rejection, if that is what `err` is.
pub fn invalid_grant_detail(err: &BrokerError) -> Option<String> {
    let BrokerError::Upstream { body, .. } = err else {
        return None;
    };
    let parsed: TokenErrorBody = serde_json::from_str(body).unwrap_or_default();
    if parsed.error == "invalid_grant" {
        Some(parsed.error_description.unwrap_or(parsed.error))
    } else {
        None
    }
}

/// Exchange a refresh token for an access token.
pub async fn refresh_access_token(
    http: &reqwest::Client,
    token_uri: &str,
    account: &str,
    record: &TokenRecord,
) -> Result<TokenResponse, BrokerError> {
    let form = [
        ("grant_type", "refresh_token"),
        ("client_id", record.client_id.as_str()),
        ("client_secret", record.client_secret.as_str()),
        ("refresh_token", record.refresh_token.as_str()),
    ];
    post_token_form(http, token_uri, &form, Some(Strategy::OAuth)).await.map_err(|e| {
        match invalid_grant_detail(&e) {
            Some(detail) => BrokerError::CredentialRevoked { account: account.to_owned(), detail },
            None => e,
        }
    })
}

/// Exchange an authorization code for tokens.
pub async fn exchange_code(
    http: &reqwest::Client,
    token_uri: &str,
    client_id: &str,
    client_secret: &str,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenResponse, BrokerError> {
    let form = [
        ("grant_type", "authorization_code"),
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("code", code),
        ("redirect_uri", redirect_uri),
    ];
    post_token_form(http, token_uri, &form, None).await
}

/// Refreshable credential seeded from a stored [`TokenRecord`].
#[derive(Debug)]
pub struct RefreshTokenCredential {
    account: String,
    record: TokenRecord,
    token_uri: String,
    http: reqwest::Client,
    cache: TokenCache,
}

impl RefreshTokenCredential {
    pub fn new(account: &str, record: TokenRecord, token_uri: &str, http: reqwest::Client) -> Self {
        Self {
            account: account.to_owned(),
            record,
            token_uri: token_uri.to_owned(),
            http,
            cache: TokenCache::default(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// The refresh token this credential was built from.
    pub fn refresh_token(&self) -> &str {
        &self.record.refresh_token
    }

    pub async fn forget_access_token(&self) {
        self.cache.clear().await;
        tracing::debug!(account = %self.account, "cached access token dropped");
    }

    pub async fn access_token(&self) -> Result<String, BrokerError> {
        self.cache
            .get_or_fetch(|| {
                refresh_access_token(&self.http, &self.token_uri, &self.account, &self.record)
            })
            .await
            .inspect_err(|e| {
                tracing::warn!(account = %self.account, err = %e, "access token refresh failed");
            })
    }
}

#[cfg(test)]
#[path = "oauth_tests.rs"]
mod tests;
