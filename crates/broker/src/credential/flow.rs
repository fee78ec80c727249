// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interactive OAuth authorization: consent redirect and callback exchange.
//!
//! The `state` parameter carries the requested account and the setup secret.
//! The callback refuses any state whose secret does not match, before the
//! authorization code is ever sent to the token endpoint. The account named in
//! `state` is only a hint: the token is stored under the identity the provider
//! reports for the freshly issued access token.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::account::{normalize, Strategy};
use crate::credential::broker::CredentialBroker;
use crate::credential::oauth::exchange_code;
use crate::credential::persist::TokenRecord;
use crate::credential::SCOPES;
use crate::error::BrokerError;

/// Constant-time string comparison to prevent timing side-channel attacks.
pub fn secrets_match(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// OAuth client registration and setup gate for the flow.
#[derive(Clone)]
pub struct FlowSettings {
    pub client_id: String,
    pub client_secret: String,
    pub setup_secret: String,
    /// Absolute URL of the `/oauth2callback` endpoint.
    pub redirect_uri: String,
}

impl std::fmt::Debug for FlowSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowSettings")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

/// Opaque `state` round-tripped through the authorization provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    pub account: String,
    pub secret: String,
}

impl AuthState {
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(raw: &str) -> Result<Self, BrokerError> {
        let bytes =
            URL_SAFE_NO_PAD.decode(raw.trim()).map_err(|_| BrokerError::AuthorizationStateInvalid)?;
        serde_json::from_slice(&bytes).map_err(|_| BrokerError::AuthorizationStateInvalid)
    }
}

/// Profile fields returned by the mail service's identity endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MailProfile {
    email_address: String,
}

pub struct AuthorizationFlow {
    settings: FlowSettings,
    broker: Arc<CredentialBroker>,
}

impl AuthorizationFlow {
    pub fn new(settings: FlowSettings, broker: Arc<CredentialBroker>) -> Self {
        Self { settings, broker }
    }

    pub fn broker(&self) -> &Arc<CredentialBroker> {
        &self.broker
    }

    pub fn redirect_uri(&self) -> &str {
        &self.settings.redirect_uri
    }

    /// Check a caller-supplied setup secret.
    pub fn check_secret(&self, supplied: &str) -> Result<(), BrokerError> {
        if secrets_match(supplied, &self.settings.setup_secret) {
            Ok(())
        } else {
            Err(BrokerError::AuthorizationSecretMismatch)
        }
    }

    /// Build the consent URL for `account`.
    ///
    /// Requests offline access with forced consent so the provider issues a
    /// refresh token even when the account authorized this client before.
    pub fn start(&self, secret: &str, account: &str) -> Result<String, BrokerError> {
        self.check_secret(secret)?;
        let account = normalize(account);
        if self.broker.registry().classify(&account)? == Strategy::Delegated {
            return Err(BrokerError::NotOAuthAccount { account });
        }

        let state = AuthState { account: account.clone(), secret: secret.to_owned() }.encode();
        let scope = SCOPES.join(" ");
        let url = url::Url::parse_with_params(
            &self.broker.endpoints().auth_uri,
            &[
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("include_granted_scopes", "true"),
                ("login_hint", account.as_str()),
                ("state", state.as_str()),
            ],
        )
        .map_err(|e| BrokerError::Internal(format!("invalid authorization URI: {e}")))?;

        tracing::info!(account = %account, "authorization started");
        Ok(url.into())
    }

    /// Complete the flow: validate `state`, exchange `code`, confirm the
    /// account identity, and store the refresh token. Returns the confirmed
    /// account.
    pub async fn complete(&self, code: &str, state: &str) -> Result<String, BrokerError> {
        let state = self.validate_state(state)?;
        self.finish(code, state).await
    }

    /// Decode a callback `state` and check its embedded setup secret.
    pub fn validate_state(&self, raw: &str) -> Result<AuthState, BrokerError> {
        let state = AuthState::decode(raw).inspect_err(|_| {
            tracing::warn!("authorization callback with malformed state");
        })?;
        if !secrets_match(&state.secret, &self.settings.setup_secret) {
            tracing::warn!(account = %state.account, "authorization callback with wrong setup secret");
            return Err(BrokerError::AuthorizationSecretMismatch);
        }
        Ok(state)
    }

    /// Exchange `code` for a state already accepted by [`Self::validate_state`].
    pub async fn finish(&self, code: &str, state: AuthState) -> Result<String, BrokerError> {
        let broker = &self.broker;
        let token = exchange_code(
            broker.http(),
            &broker.endpoints().token_uri,
            &self.settings.client_id,
            &self.settings.client_secret,
            code,
            &self.settings.redirect_uri,
        )
        .await?;

        let Some(refresh_token) = token.refresh_token else {
            tracing::warn!(account = %state.account, "authorization returned no refresh token");
            return Err(BrokerError::NoRefreshTokenIssued { account: state.account });
        };

        let confirmed = normalize(&self.fetch_identity(&token.access_token).await?);
        if confirmed != normalize(&state.account) {
            tracing::warn!(
                requested = %state.account,
                confirmed = %confirmed,
                "authorized account differs from requested account"
            );
        }

        let record = TokenRecord {
            client_id: self.settings.client_id.clone(),
            client_secret: self.settings.client_secret.clone(),
            refresh_token,
        };
        broker.upsert_token(&confirmed, record)?;
        tracing::info!(account = %confirmed, "authorization completed");
        Ok(confirmed)
    }

    /// Ask the mail service which account an access token belongs to.
    async fn fetch_identity(&self, access_token: &str) -> Result<String, BrokerError> {
        let url = format!("{}users/me/profile", self.broker.endpoints().mail);
        let resp = self.broker.http().get(url).bearer_auth(access_token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BrokerError::Upstream {
                status: status.as_u16(),
                body,
                strategy: Some(Strategy::OAuth),
            });
        }
        let profile: MailProfile = resp.json().await?;
        Ok(profile.email_address)
    }
}

#[cfg(test)]
#[path = "flow_tests.rs"]
mod tests;
