// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-account, per-service API clients.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::credential::Credential;
use crate::error::BrokerError;

/// The API surfaces a credential can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Mail,
    Calendar,
    Files,
    Contacts,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 4] = [Self::Mail, Self::Calendar, Self::Files, Self::Contacts];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mail => "mail",
            Self::Calendar => "calendar",
            Self::Files => "files",
            Self::Contacts => "contacts",
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServiceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mail" | "gmail" => Ok(Self::Mail),
            "calendar" => Ok(Self::Calendar),
            "files" | "drive" => Ok(Self::Files),
            "contacts" | "people" => Ok(Self::Contacts),
            other => anyhow::bail!("unknown service: {other}"),
        }
    }
}

/// A credential bound to one service surface.
///
/// Built without network I/O; the first request pulls an access token from
/// the credential. Never mutated: cache invalidation drops it and a new one
/// is built on the next lookup.
#[derive(Debug)]
pub struct ServiceClient {
    kind: ServiceKind,
    base_url: String,
    credential: Arc<Credential>,
    http: reqwest::Client,
}

impl ServiceClient {
    pub fn new(
        kind: ServiceKind,
        base_url: &str,
        credential: Arc<Credential>,
        http: reqwest::Client,
    ) -> Self {
        Self { kind, base_url: base_url.to_owned(), credential, http }
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn account(&self) -> &str {
        self.credential.account()
    }

    pub fn credential(&self) -> &Arc<Credential> {
        &self.credential
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a path relative to this service's base.
    ///
    /// The joined URL must keep the base's origin and path prefix after
    /// dot-segment resolution (`..`, `%2e%2e`, `\`), and may not smuggle
    /// separators as `%2f` / `%5c`.
    pub fn url(&self, path: &str) -> Result<reqwest::Url, BrokerError> {
        let outside = || BrokerError::PathOutsideService {
            service: self.kind.to_string(),
            path: path.to_owned(),
        };
        let base = reqwest::Url::parse(&self.base_url)
            .map_err(|e| BrokerError::Internal(format!("invalid {} base URL: {e}", self.kind)))?;
        let relative = path.trim_start_matches(['/', '\\']);
        let joined = base.join(relative).map_err(|_| outside())?;

        let lowered = joined.path().to_ascii_lowercase();
        if joined.origin() != base.origin()
            || !joined.path().starts_with(base.path())
            || lowered.contains("%2f")
            || lowered.contains("%5c")
        {
            return Err(outside());
        }
        Ok(joined)
    }

    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value, BrokerError> {
        self.request_json(reqwest::Method::GET, path, None).await
    }

    /// Send an authenticated request and decode the JSON response.
    ///
    /// Empty 2xx bodies decode as `null`. No retries: failures are classified
    /// and returned.
    pub async fn request_json(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, BrokerError> {
        let url = self.url(path)?;
        let token = self.credential.access_token().await?;
        let mut req = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                self.credential.forget_access_token().await;
            }
            tracing::warn!(
                account = %self.account(),
                service = %self.kind,
                status = status.as_u16(),
                "upstream request failed"
            );
            return Err(BrokerError::Upstream {
                status: status.as_u16(),
                body: text,
                strategy: Some(self.credential.strategy()),
            });
        }
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| BrokerError::Internal(format!("invalid JSON from {}: {e}", self.kind)))
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
