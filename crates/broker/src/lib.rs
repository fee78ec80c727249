// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credbroker: per-account API credentials behind one process.
//!
//! One delegated account authenticates with a service-account key; every
//! other allow-listed account uses a refresh token provisioned through the
//! `/setup` authorization flow.

pub mod account;
pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod state;
pub mod transport;
pub mod translate;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::account::AccountRegistry;
use crate::config::BrokerConfig;
use crate::credential::broker::CredentialBroker;
use crate::credential::flow::{AuthorizationFlow, FlowSettings};
use crate::credential::persist::TokenStore;
use crate::credential::service_account::ServiceAccountKey;
use crate::credential::Endpoints;
use crate::state::AppState;
use crate::transport::build_router;

/// Install the process-wide rustls crypto provider (idempotent).
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Shared outbound HTTP client.
pub fn http_client() -> anyhow::Result<reqwest::Client> {
    install_crypto_provider();
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("build HTTP client")
}

/// Run the broker server until shutdown.
pub async fn run(config: BrokerConfig) -> anyhow::Result<()> {
    let key = ServiceAccountKey::from_file(&config.key_file)?;
    let token_path = config.token_file_path();
    let tokens = TokenStore::load(&token_path)?;
    tracing::info!(path = %token_path.display(), accounts = tokens.len(), "token store loaded");

    let broker = CredentialBroker::new(
        AccountRegistry::default(),
        key,
        tokens,
        Endpoints::default(),
        http_client()?,
    );
    let flow = AuthorizationFlow::new(
        FlowSettings {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            setup_secret: config.setup_secret.clone(),
            redirect_uri: config.redirect_uri(),
        },
        Arc::clone(&broker),
    );
    let state = Arc::new(AppState::new(config.auth_token.clone(), flow));

    let shutdown = CancellationToken::new();
    spawn_signal_handlers(Arc::clone(&broker), shutdown.clone())?;

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await.with_context(|| format!("bind {addr}"))?;
    tracing::info!("credbroker listening on {addr}");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}

/// SIGHUP reloads the token file; Ctrl-C / SIGTERM cancel `shutdown`.
fn spawn_signal_handlers(
    broker: Arc<CredentialBroker>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = signal(SignalKind::hangup()).context("install SIGHUP handler")?;
        tokio::spawn(async move {
            while hangup.recv().await.is_some() {
                match broker.reload_tokens() {
                    Ok(true) => {}
                    Ok(false) => tracing::debug!("token store unchanged"),
                    Err(e) => {
                        tracing::warn!(err = %format!("{e:#}"), "token reload failed, keeping current tokens");
                    }
                }
            }
        });

        let mut terminate = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
            tracing::info!("shutting down");
            shutdown.cancel();
        });
    }

    #[cfg(not(unix))]
    {
        let _ = broker;
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
            shutdown.cancel();
        });
    }

    Ok(())
}
