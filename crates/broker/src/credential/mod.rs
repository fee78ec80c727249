// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential brokering: per-account credentials under two strategies.
//!
//! The delegated account signs its own assertions with a service-account key.
//! Every other account exchanges a stored refresh token. Both kinds produce
//! access tokens lazily, on first use by a service client, and cache them
//! until shortly before expiry.

pub mod broker;
pub mod flow;
pub mod oauth;
pub mod persist;
pub mod service_account;

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::account::Strategy;
use crate::client::ServiceKind;
use crate::credential::oauth::{RefreshTokenCredential, TokenResponse};
use crate::credential::service_account::ServiceAccountCredential;
use crate::error::BrokerError;

/// Scope set requested by both strategies and by the consent screen.
pub const SCOPES: &[&str] = &[
    "https://mail.google.com/",
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/contacts",
];

/// Refresh access tokens this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Upstream URLs for authorization, token exchange and each service surface.
///
/// Service bases end with `/` so relative paths join under them.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub auth_uri: String,
    pub token_uri: String,
    pub mail: String,
    pub calendar: String,
    pub files: String,
    pub contacts: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth_uri: "https://accounts.google.com/o/oauth2/v2/auth".to_owned(),
            token_uri: "https://oauth2.googleapis.com/token".to_owned(),
            mail: "https://gmail.googleapis.com/gmail/v1/".to_owned(),
            calendar: "https://www.googleapis.com/calendar/v3/".to_owned(),
            files: "https://www.googleapis.com/drive/v3/".to_owned(),
            contacts: "https://people.googleapis.com/v1/".to_owned(),
        }
    }
}

impl Endpoints {
    /// Every endpoint under one origin (`{base}/auth`, `{base}/token`,
    /// `{base}/mail/`, ...). Used to point the broker at a local server.
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            auth_uri: format!("{base}/auth"),
            token_uri: format!("{base}/token"),
            mail: format!("{base}/mail/"),
            calendar: format!("{base}/calendar/"),
            files: format!("{base}/files/"),
            contacts: format!("{base}/contacts/"),
        }
    }

    pub fn service_base(&self, kind: ServiceKind) -> &str {
        match kind {
            ServiceKind::Mail => &self.mail,
            ServiceKind::Calendar => &self.calendar,
            ServiceKind::Files => &self.files,
            ServiceKind::Contacts => &self.contacts,
        }
    }
}

/// A credential able to mint access tokens for one account.
///
/// Exactly one variant per [`Strategy`]; the broker picks the variant from the
/// account registry, never from the shape of stored data.
#[derive(Debug)]
pub enum Credential {
    Delegated(ServiceAccountCredential),
    OAuth(RefreshTokenCredential),
}

impl Credential {
    pub fn account(&self) -> &str {
        match self {
            Self::Delegated(c) => c.subject(),
            Self::OAuth(c) => c.account(),
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Delegated(_) => Strategy::Delegated,
            Self::OAuth(_) => Strategy::OAuth,
        }
    }

    /// Drop the cached access token so the next request fetches a new one.
    pub async fn forget_access_token(&self) {
        match self {
            Self::Delegated(c) => c.forget_access_token().await,
            Self::OAuth(c) => c.forget_access_token().await,
        }
    }

    /// Current access token, fetching a new one if the cached one is stale.
    pub async fn access_token(&self) -> Result<String, BrokerError> {
        match self {
            Self::Delegated(c) => c.access_token().await,
            Self::OAuth(c) => c.access_token().await,
        }
    }
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Single-slot access token cache. The async mutex is held across the fetch
/// so concurrent callers share one token request.
#[derive(Default)]
pub(crate) struct TokenCache {
    slot: Mutex<Option<AccessToken>>,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenCache")
    }
}

impl TokenCache {
    pub(crate) async fn clear(&self) {
        *self.slot.lock().await = None;
    }

    pub(crate) async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<String, BrokerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TokenResponse, BrokerError>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(ref token) = *slot {
            if Instant::now() + EXPIRY_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }
        let fresh = fetch().await?;
        let ttl = if fresh.expires_in == 0 {
            DEFAULT_TOKEN_TTL
        } else {
            Duration::from_secs(fresh.expires_in)
        };
        let value = fresh.access_token;
        *slot = Some(AccessToken { value: value.clone(), expires_at: Instant::now() + ttl });
        Ok(value)
    }
}

/// Current Unix time in seconds.
pub(crate) fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
