// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{mock_upstream, record, token_err, token_ok};

#[tokio::test]
async fn refresh_returns_access_token() -> anyhow::Result<()> {
    let upstream = mock_upstream(vec![token_ok("at-1", None)]).await?;
    let http = crate::http_client()?;

    let token =
        refresh_access_token(&http, &upstream.token_uri(), "alice@example.com", &record("rt-1"))
            .await?;
    assert_eq!(token.access_token, "at-1");
    assert_eq!(token.expires_in, 3600);

    let forms = upstream.token_forms.lock().clone();
    assert_eq!(forms.len(), 1);
    assert!(forms[0].contains("grant_type=refresh_token"), "{}", forms[0]);
    assert!(forms[0].contains("refresh_token=rt-1"), "{}", forms[0]);
    assert!(forms[0].contains("client_id=cid"), "{}", forms[0]);
    Ok(())
}

#[tokio::test]
async fn invalid_grant_means_revoked() -> anyhow::Result<()> {
    let upstream =
        mock_upstream(vec![token_err(400, "invalid_grant", "Token has been expired or revoked.")])
            .await?;
    let http = crate::http_client()?;

    let err =
        refresh_access_token(&http, &upstream.token_uri(), "alice@example.com", &record("rt-1"))
            .await
            .err();
    match err {
        Some(BrokerError::CredentialRevoked { account, detail }) => {
            assert_eq!(account, "alice@example.com");
            assert_eq!(detail, "Token has been expired or revoked.");
        }
        other => anyhow::bail!("expected CredentialRevoked, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn server_error_stays_upstream() -> anyhow::Result<()> {
    let upstream = mock_upstream(vec![(503, "backend down".to_owned())]).await?;
    let http = crate::http_client()?;

    let err =
        refresh_access_token(&http, &upstream.token_uri(), "alice@example.com", &record("rt-1"))
            .await
            .err();
    match err {
        Some(BrokerError::Upstream { status, body, strategy }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "backend down");
            assert_eq!(strategy, Some(Strategy::OAuth));
        }
        other => anyhow::bail!("expected Upstream, got {other:?}"),
    }
    Ok(())
}

#[test]
fn invalid_grant_detail_ignores_other_errors() {
    let other = BrokerError::Upstream {
        status: 400,
        body: r#"{"error":"invalid_client"}"#.to_owned(),
        strategy: None,
    };
    assert_eq!(invalid_grant_detail(&other), None);

    let bare = BrokerError::Upstream {
        status: 400,
        body: r#"{"error":"invalid_grant"}"#.to_owned(),
        strategy: None,
    };
    assert_eq!(invalid_grant_detail(&bare).as_deref(), Some("invalid_grant"));

    assert_eq!(invalid_grant_detail(&BrokerError::Network("x".to_owned())), None);
}

#[tokio::test]
async fn exchange_code_posts_authorization_code_grant() -> anyhow::Result<()> {
    let upstream = mock_upstream(vec![token_ok("at-1", Some("rt-new"))]).await?;
    let http = crate::http_client()?;

    let token = exchange_code(
        &http,
        &upstream.token_uri(),
        "cid",
        "csecret",
        "code-123",
        "https://broker.example.com/oauth2callback",
    )
    .await?;
    assert_eq!(token.refresh_token.as_deref(), Some("rt-new"));

    let forms = upstream.token_forms.lock().clone();
    assert!(forms[0].contains("grant_type=authorization_code"), "{}", forms[0]);
    assert!(forms[0].contains("code=code-123"), "{}", forms[0]);
    Ok(())
}

#[tokio::test]
async fn credential_caches_access_token() -> anyhow::Result<()> {
    let upstream = mock_upstream(vec![token_ok("at-1", None)]).await?;
    let cred = RefreshTokenCredential::new(
        "alice@example.com",
        record("rt-1"),
        &upstream.token_uri(),
        crate::http_client()?,
    );
    assert_eq!(cred.refresh_token(), "rt-1");

    assert_eq!(cred.access_token().await?, "at-1");
    assert_eq!(cred.access_token().await?, "at-1");
    assert_eq!(upstream.token_call_count(), 1);
    Ok(())
}
