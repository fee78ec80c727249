// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

/// Default token file name, placed next to the service-account key.
const DEFAULT_TOKEN_FILE: &str = "oauth_tokens.json";

/// Credential broker for delegated and per-account OAuth access.
#[derive(Debug, Clone, Parser)]
#[command(name = "credbroker", version, about)]
pub struct BrokerConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "CREDBROKER_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080, env = "CREDBROKER_PORT")]
    pub port: u16,

    /// Service-account JSON key used for the delegated account.
    #[arg(long, env = "CREDBROKER_KEY_FILE")]
    pub key_file: PathBuf,

    /// OAuth token store. Defaults to `oauth_tokens.json` next to the key file.
    #[arg(long, env = "CREDBROKER_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    /// Externally reachable base URL (used to build the OAuth redirect URI).
    #[arg(long, env = "CREDBROKER_PUBLIC_URL")]
    pub public_url: String,

    /// OAuth client ID used for per-account authorization.
    #[arg(long, env = "CREDBROKER_CLIENT_ID")]
    pub client_id: String,

    /// OAuth client secret used for per-account authorization.
    #[arg(long, env = "CREDBROKER_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// Shared secret gating `/setup` and the OAuth callback.
    #[arg(long, env = "CREDBROKER_SETUP_SECRET", hide_env_values = true)]
    pub setup_secret: String,

    /// Bearer token required on `/mcp`.
    #[arg(long, env = "CREDBROKER_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: String,

    /// Log format (json or text).
    #[arg(long, default_value = "text", env = "CREDBROKER_LOG_FORMAT")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "CREDBROKER_LOG_LEVEL")]
    pub log_level: String,
}

impl BrokerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("--client-id", &self.client_id),
            ("--client-secret", &self.client_secret),
            ("--setup-secret", &self.setup_secret),
            ("--auth-token", &self.auth_token),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{name} must not be empty");
            }
        }

        let url = url::Url::parse(&self.public_url)
            .map_err(|e| anyhow::anyhow!("invalid --public-url {}: {e}", self.public_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("--public-url must be http or https");
        }

        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("invalid --log-format: {}", self.log_format);
        }

        Ok(())
    }

    pub fn token_file_path(&self) -> PathBuf {
        match self.token_file {
            Some(ref path) => path.clone(),
            None => self.key_file.with_file_name(DEFAULT_TOKEN_FILE),
        }
    }

    /// Absolute URL of the OAuth callback endpoint.
    pub fn redirect_uri(&self) -> String {
        format!("{}/oauth2callback", self.public_url.trim_end_matches('/'))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
