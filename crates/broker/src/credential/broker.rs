// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential broker: resolves accounts to credentials and caches service
//! clients on top of them.
//!
//! The token store and both caches live behind one lock so that an upsert,
//! its file write, and the cache wipe happen as one step. Resolution after an
//! upsert returns always sees the new refresh token.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::account::{normalize, AccountRegistry, Strategy};
use crate::client::{ServiceClient, ServiceKind};
use crate::credential::oauth::RefreshTokenCredential;
use crate::credential::persist::{TokenRecord, TokenStore};
use crate::credential::service_account::{ServiceAccountCredential, ServiceAccountKey};
use crate::credential::{Credential, Endpoints, SCOPES};
use crate::error::BrokerError;

#[derive(Default)]
struct Caches {
    credentials: HashMap<String, Arc<Credential>>,
    clients: HashMap<(String, ServiceKind), Arc<ServiceClient>>,
}

struct Inner {
    tokens: TokenStore,
    caches: Caches,
}

impl Inner {
    fn invalidate(&mut self) {
        let dropped = self.caches.credentials.len() + self.caches.clients.len();
        self.caches = Caches::default();
        tracing::debug!(dropped, "credential caches invalidated");
    }
}

/// One account's place in the configured-accounts listing.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AccountInfo {
    pub account: String,
    pub strategy: Strategy,
    /// Whether a credential can be built without running the authorization flow.
    pub ready: bool,
}

pub struct CredentialBroker {
    registry: AccountRegistry,
    key: Arc<ServiceAccountKey>,
    endpoints: Endpoints,
    http: reqwest::Client,
    inner: RwLock<Inner>,
}

impl CredentialBroker {
    pub fn new(
        registry: AccountRegistry,
        key: ServiceAccountKey,
        tokens: TokenStore,
        endpoints: Endpoints,
        http: reqwest::Client,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            key: Arc::new(key),
            endpoints,
            http,
            inner: RwLock::new(Inner { tokens, caches: Caches::default() }),
        })
    }

    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Credential for `account`, built on first use and memoized.
    pub fn resolve(&self, account: &str) -> Result<Arc<Credential>, BrokerError> {
        let strategy = self.registry.classify(account)?;
        let account = normalize(account);
        if let Some(cred) = self.inner.read().caches.credentials.get(&account) {
            return Ok(Arc::clone(cred));
        }
        let mut inner = self.inner.write();
        self.credential_locked(&mut inner, &account, strategy)
    }

    /// Service client for `(account, kind)`, built on first use and memoized.
    pub fn client(
        &self,
        account: &str,
        kind: ServiceKind,
    ) -> Result<Arc<ServiceClient>, BrokerError> {
        let strategy = self.registry.classify(account)?;
        let key = (normalize(account), kind);
        if let Some(client) = self.inner.read().caches.clients.get(&key) {
            return Ok(Arc::clone(client));
        }
        let mut inner = self.inner.write();
        if let Some(client) = inner.caches.clients.get(&key) {
            return Ok(Arc::clone(client));
        }
        let credential = self.credential_locked(&mut inner, &key.0, strategy)?;
        let client = Arc::new(ServiceClient::new(
            kind,
            self.endpoints.service_base(kind),
            credential,
            self.http.clone(),
        ));
        inner.caches.clients.insert(key, Arc::clone(&client));
        Ok(client)
    }

    fn credential_locked(
        &self,
        inner: &mut Inner,
        account: &str,
        strategy: Strategy,
    ) -> Result<Arc<Credential>, BrokerError> {
        if let Some(cred) = inner.caches.credentials.get(account) {
            return Ok(Arc::clone(cred));
        }
        let credential = match strategy {
            Strategy::Delegated => Credential::Delegated(ServiceAccountCredential::new(
                Arc::clone(&self.key),
                account,
                SCOPES,
                self.http.clone(),
            )),
            Strategy::OAuth => {
                let record = inner.tokens.get(account).cloned().ok_or_else(|| {
                    BrokerError::MissingCredential { account: account.to_owned() }
                })?;
                Credential::OAuth(RefreshTokenCredential::new(
                    account,
                    record,
                    &self.endpoints.token_uri,
                    self.http.clone(),
                ))
            }
        };
        tracing::debug!(account, strategy = %strategy, "credential built");
        let credential = Arc::new(credential);
        inner.caches.credentials.insert(account.to_owned(), Arc::clone(&credential));
        Ok(credential)
    }

    /// Store a refresh token for an OAuth account and drop every cached
    /// credential and client before returning.
    pub fn upsert_token(&self, account: &str, record: TokenRecord) -> Result<(), BrokerError> {
        match self.registry.classify(account)? {
            Strategy::OAuth => {}
            Strategy::Delegated => {
                return Err(BrokerError::NotOAuthAccount { account: normalize(account) })
            }
        }
        let account = normalize(account);
        let mut inner = self.inner.write();
        inner
            .tokens
            .upsert(&account, record)
            .map_err(|e| BrokerError::Internal(format!("failed to persist token: {e:#}")))?;
        inner.invalidate();
        tracing::info!(account = %account, path = %inner.tokens.path().display(), "token stored");
        Ok(())
    }

    /// Re-read the token file; invalidates caches when its content changed.
    pub fn reload_tokens(&self) -> anyhow::Result<bool> {
        let mut inner = self.inner.write();
        let changed = inner.tokens.reload()?;
        if changed {
            inner.invalidate();
            tracing::info!(accounts = inner.tokens.len(), "token store reloaded");
        }
        Ok(changed)
    }

    /// Drop every cached credential and service client.
    pub fn invalidate_all(&self) {
        self.inner.write().invalidate();
    }

    /// Delegated account first, then every account in the token store, once each.
    pub fn configured_accounts(&self) -> Vec<String> {
        let delegated = self.registry.delegated();
        let mut accounts = vec![delegated.to_owned()];
        let inner = self.inner.read();
        accounts.extend(
            inner.tokens.accounts().filter(|a| *a != delegated).map(str::to_owned),
        );
        accounts
    }

    /// Every allow-listed account with its strategy and readiness.
    pub fn account_status(&self) -> Vec<AccountInfo> {
        let inner = self.inner.read();
        let mut out = vec![AccountInfo {
            account: self.registry.delegated().to_owned(),
            strategy: Strategy::Delegated,
            ready: true,
        }];
        for account in self.registry.oauth_accounts() {
            out.push(AccountInfo {
                account: account.clone(),
                strategy: Strategy::OAuth,
                ready: inner.tokens.contains(account),
            });
        }
        out
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
