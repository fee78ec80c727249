// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn upstream(status: u16) -> BrokerError {
    BrokerError::Upstream { status, body: String::new(), strategy: None }
}

#[yare::parameterized(
    bad_request = { 400, ErrorKind::UpstreamRejected },
    unauthorized = { 401, ErrorKind::UpstreamRejected },
    not_found = { 404, ErrorKind::UpstreamRejected },
    rate_limited = { 429, ErrorKind::UpstreamRateLimited },
    internal = { 500, ErrorKind::UpstreamUnavailable },
    unavailable = { 503, ErrorKind::UpstreamUnavailable },
)]
fn upstream_status_kind(status: u16, expected: ErrorKind) {
    assert_eq!(upstream(status).kind(), expected);
}

#[test]
fn network_failure_is_unavailable() {
    let err = BrokerError::Network("connection refused".to_owned());
    assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    assert_eq!(err.status(), None);
}

#[test]
fn delegated_account_is_reported_as_not_allowed() {
    let err = BrokerError::NotOAuthAccount { account: "ops@example.com".to_owned() };
    assert_eq!(err.kind(), ErrorKind::AccountNotAllowed);
    assert_eq!(ApiError::from_kind(err.kind()), ApiError::Forbidden);
}

#[test]
fn missing_credential_message_explains_provisioning() {
    let err = BrokerError::MissingCredential { account: "alice@example.com".to_owned() };
    let msg = err.to_string();
    assert!(msg.contains("/setup?"), "{msg}");
    assert!(msg.contains("account=alice@example.com"), "{msg}");
}

#[test]
fn kind_wire_strings_roundtrip() -> anyhow::Result<()> {
    let kinds = [
        ErrorKind::AccountNotAllowed,
        ErrorKind::MissingCredential,
        ErrorKind::CredentialRevoked,
        ErrorKind::UpstreamRateLimited,
        ErrorKind::AuthorizationSecretMismatch,
        ErrorKind::InvalidRequest,
    ];
    for kind in kinds {
        let json = serde_json::to_string(&kind)?;
        assert_eq!(json, format!("\"{}\"", kind.as_str()));
        let back: ErrorKind = serde_json::from_str(&json)?;
        assert_eq!(back, kind);
    }
    Ok(())
}

#[test]
fn api_error_envelope() {
    let (status, body) = ApiError::Unauthorized.to_http_response("unauthorized");
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body.error.code, "UNAUTHORIZED");
    assert_eq!(body.error.message, "unauthorized");
}

#[test]
fn flow_failures_map_to_client_errors() {
    assert_eq!(
        ApiError::from_kind(BrokerError::AuthorizationSecretMismatch.kind()),
        ApiError::Unauthorized
    );
    assert_eq!(
        ApiError::from_kind(BrokerError::AuthorizationStateInvalid.kind()),
        ApiError::BadRequest
    );
}

#[test]
fn escaping_path_is_a_client_error() {
    let err = BrokerError::PathOutsideService {
        service: "calendar".to_owned(),
        path: "%2e%2e/drive".to_owned(),
    };
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert_eq!(err.kind().as_str(), "invalid_request");
    assert_eq!(ApiError::from_kind(err.kind()), ApiError::BadRequest);
}
