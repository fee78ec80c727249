// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Account registry: the fixed allow-list and its strategy bindings.

use serde::{Deserialize, Serialize};

use crate::error::BrokerError;

/// The one identity served through service-account delegation.
pub const DELEGATED_ACCOUNT: &str = "ops@example.com";

/// Identities served through per-account OAuth refresh tokens.
pub const OAUTH_ACCOUNTS: &[&str] = &["alice@example.com", "bob@example.com", "ci@example.org"];

/// How an account obtains access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Service-account key impersonating the account as delegation subject.
    Delegated,
    /// Stored refresh token from the authorization flow.
    OAuth,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delegated => "delegated",
            Self::OAuth => "oauth",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical form of an account identity (trimmed, ASCII-lowercased).
pub fn normalize(account: &str) -> String {
    account.trim().to_ascii_lowercase()
}

/// Static allow-list. Strategy is decided here and nowhere else.
#[derive(Debug, Clone)]
pub struct AccountRegistry {
    delegated: String,
    oauth: Vec<String>,
}

impl Default for AccountRegistry {
    fn default() -> Self {
        Self::new(DELEGATED_ACCOUNT, OAUTH_ACCOUNTS.iter().copied())
    }
}

impl AccountRegistry {
    pub fn new<I, S>(delegated: &str, oauth: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let delegated = normalize(delegated);
        let mut accounts: Vec<String> = Vec::new();
        for account in oauth {
            let account = normalize(account.as_ref());
            if account != delegated && !accounts.contains(&account) {
                accounts.push(account);
            }
        }
        Self { delegated, oauth: accounts }
    }

    pub fn delegated(&self) -> &str {
        &self.delegated
    }

    pub fn oauth_accounts(&self) -> &[String] {
        &self.oauth
    }

    /// Classify an identity, rejecting anything outside the allow-list.
    pub fn classify(&self, account: &str) -> Result<Strategy, BrokerError> {
        let account = normalize(account);
        if account == self.delegated {
            Ok(Strategy::Delegated)
        } else if self.oauth.contains(&account) {
            Ok(Strategy::OAuth)
        } else {
            Err(BrokerError::AccountNotAllowed { account })
        }
    }
}

#[cfg(test)]
#[path = "account_tests.rs"]
mod tests;
