// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delegated credentials: service-account JWT bearer grant (RFC 7523).

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use ring::rand::SystemRandom;
use ring::signature::{RsaKeyPair, RSA_PKCS1_SHA256};
use serde::{Deserialize, Serialize};

use crate::account::Strategy;
use crate::credential::oauth::post_token_form;
use crate::credential::{epoch_secs, TokenCache};
use crate::error::BrokerError;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Assertion lifetime accepted by the token endpoint (one hour max).
const ASSERTION_TTL_SECS: u64 = 3600;

/// On-disk service-account key (the JSON downloaded from the cloud console).
#[derive(Deserialize)]
struct ServiceAccountKeyFile {
    client_email: String,
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_owned()
}

#[derive(Serialize)]
struct JwtHeader<'a> {
    alg: &'static str,
    typ: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'a str>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub iss: String,
    pub sub: String,
    pub scope: String,
    pub aud: String,
    pub iat: u64,
    pub exp: u64,
}

/// Parsed service-account key, able to sign delegation assertions.
pub struct ServiceAccountKey {
    client_email: String,
    key_id: Option<String>,
    token_uri: String,
    key_pair: RsaKeyPair,
    rng: SystemRandom,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("key_id", &self.key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read service account key {}", path.display()))?;
        Self::from_json(&contents)
            .with_context(|| format!("load service account key {}", path.display()))
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let file: ServiceAccountKeyFile =
            serde_json::from_str(json).context("parse service account key JSON")?;
        let key_pair = parse_private_key(&file.private_key)?;
        Ok(Self {
            client_email: file.client_email,
            key_id: file.private_key_id,
            token_uri: file.token_uri,
            key_pair,
            rng: SystemRandom::new(),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    /// Build a signed RS256 JWT asserting `subject` for `scope`.
    pub fn assertion(&self, subject: &str, scope: &str, now: u64) -> Result<String, BrokerError> {
        let header = JwtHeader { alg: "RS256", typ: "JWT", kid: self.key_id.as_deref() };
        let claims = JwtClaims {
            iss: self.client_email.clone(),
            sub: subject.to_owned(),
            scope: scope.to_owned(),
            aud: self.token_uri.clone(),
            iat: now,
            exp: now + ASSERTION_TTL_SECS,
        };
        let header = serde_json::to_vec(&header).map_err(|e| BrokerError::Internal(e.to_string()))?;
        let claims = serde_json::to_vec(&claims).map_err(|e| BrokerError::Internal(e.to_string()))?;
        let signing_input =
            format!("{}.{}", URL_SAFE_NO_PAD.encode(header), URL_SAFE_NO_PAD.encode(claims));

        let mut signature = vec![0u8; self.key_pair.public().modulus_len()];
        self.key_pair
            .sign(&RSA_PKCS1_SHA256, &self.rng, signing_input.as_bytes(), &mut signature)
            .map_err(|_| BrokerError::Internal("failed to sign delegation assertion".to_owned()))?;
        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }
}

/// Decode a PEM private key (PKCS#8 `PRIVATE KEY` or PKCS#1 `RSA PRIVATE KEY`).
fn parse_private_key(pem: &str) -> anyhow::Result<RsaKeyPair> {
    let pkcs1 = pem.contains("BEGIN RSA PRIVATE KEY");
    let body: String = pem
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect();
    if body.is_empty() {
        anyhow::bail!("private_key is empty");
    }
    let der = STANDARD.decode(body.as_bytes()).context("decode private_key PEM body")?;
    let key_pair = if pkcs1 { RsaKeyPair::from_der(&der) } else { RsaKeyPair::from_pkcs8(&der) };
    key_pair.map_err(|e| anyhow::anyhow!("rejected private key: {e}"))
}

/// Credential for the delegated account: the shared key impersonating one subject.
#[derive(Debug)]
pub struct ServiceAccountCredential {
    key: Arc<ServiceAccountKey>,
    subject: String,
    scope: String,
    http: reqwest::Client,
    cache: TokenCache,
}

impl ServiceAccountCredential {
    pub fn new(
        key: Arc<ServiceAccountKey>,
        subject: &str,
        scopes: &[&str],
        http: reqwest::Client,
    ) -> Self {
        Self {
            key,
            subject: subject.to_owned(),
            scope: scopes.join(" "),
            http,
            cache: TokenCache::default(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub async fn forget_access_token(&self) {
        self.cache.clear().await;
        tracing::debug!(account = %self.subject, "cached access token dropped");
    }

    pub async fn access_token(&self) -> Result<String, BrokerError> {
        self.cache
            .get_or_fetch(|| async {
                let assertion = self.key.assertion(&self.subject, &self.scope, epoch_secs())?;
                let form = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];
                post_token_form(&self.http, self.key.token_uri(), &form, Some(Strategy::Delegated))
                    .await
            })
            .await
            .inspect_err(|e| {
                tracing::warn!(account = %self.subject, err = %e, "delegated token request failed");
            })
    }
}

#[cfg(test)]
#[path = "service_account_tests.rs"]
mod tests;
