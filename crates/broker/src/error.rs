// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::account::Strategy;

/// Failures produced by the credential broker and the authorization flow.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("account {account} is not in the allow-list")]
    AccountNotAllowed { account: String },

    #[error("account {account} uses delegated credentials and cannot be authorized via OAuth")]
    NotOAuthAccount { account: String },

    #[error(
        "no OAuth credential provisioned for {account}; authorize it at /setup?token=<setup secret>&account={account}"
    )]
    MissingCredential { account: String },

    #[error("refresh token for {account} was rejected (invalid_grant): {detail}")]
    CredentialRevoked { account: String, detail: String },

    #[error("authorization for {account} returned no refresh token")]
    NoRefreshTokenIssued { account: String },

    #[error("authorization state is missing or malformed")]
    AuthorizationStateInvalid,

    #[error("authorization state does not carry the configured setup secret")]
    AuthorizationSecretMismatch,

    #[error("path {path:?} resolves outside the {service} service")]
    PathOutsideService { service: String, path: String },

    #[error("upstream returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String, strategy: Option<Strategy> },

    #[error("upstream request failed: {0}")]
    Network(String),

    #[error("{0}")]
    Internal(String),
}

impl BrokerError {
    /// Upstream HTTP status, when the failure came from an HTTP response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AccountNotAllowed { .. } | Self::NotOAuthAccount { .. } => {
                ErrorKind::AccountNotAllowed
            }
            Self::MissingCredential { .. } => ErrorKind::MissingCredential,
            Self::CredentialRevoked { .. } => ErrorKind::CredentialRevoked,
            Self::NoRefreshTokenIssued { .. } => ErrorKind::NoRefreshTokenIssued,
            Self::AuthorizationStateInvalid => ErrorKind::AuthorizationStateInvalid,
            Self::AuthorizationSecretMismatch => ErrorKind::AuthorizationSecretMismatch,
            Self::PathOutsideService { .. } => ErrorKind::InvalidRequest,
            Self::Upstream { status: 429, .. } => ErrorKind::UpstreamRateLimited,
            Self::Upstream { status, .. } if *status >= 500 => ErrorKind::UpstreamUnavailable,
            Self::Upstream { .. } => ErrorKind::UpstreamRejected,
            Self::Network(_) => ErrorKind::UpstreamUnavailable,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<reqwest::Error> for BrokerError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Stable error categories exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AccountNotAllowed,
    MissingCredential,
    CredentialRevoked,
    NoRefreshTokenIssued,
    AuthorizationStateInvalid,
    AuthorizationSecretMismatch,
    InvalidRequest,
    UpstreamRateLimited,
    UpstreamRejected,
    UpstreamUnavailable,
    Internal,
}

impl ErrorKind {
    /// Wire-format string for this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccountNotAllowed => "account_not_allowed",
            Self::MissingCredential => "missing_credential",
            Self::CredentialRevoked => "credential_revoked",
            Self::NoRefreshTokenIssued => "no_refresh_token_issued",
            Self::AuthorizationStateInvalid => "authorization_state_invalid",
            Self::AuthorizationSecretMismatch => "authorization_secret_mismatch",
            Self::InvalidRequest => "invalid_request",
            Self::UpstreamRateLimited => "upstream_rate_limited",
            Self::UpstreamRejected => "upstream_rejected",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error codes for the HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiError {
    Unauthorized,
    BadRequest,
    Forbidden,
    UpstreamError,
    Internal,
}

impl ApiError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::Forbidden => 403,
            Self::UpstreamError => 502,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::Forbidden => "FORBIDDEN",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::Internal => "INTERNAL",
        }
    }

    /// Pick the HTTP-facing code for a broker failure.
    pub fn from_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::AccountNotAllowed => Self::Forbidden,
            ErrorKind::MissingCredential
            | ErrorKind::CredentialRevoked
            | ErrorKind::NoRefreshTokenIssued
            | ErrorKind::AuthorizationStateInvalid
            | ErrorKind::InvalidRequest => Self::BadRequest,
            ErrorKind::AuthorizationSecretMismatch => Self::Unauthorized,
            ErrorKind::UpstreamRateLimited
            | ErrorKind::UpstreamRejected
            | ErrorKind::UpstreamUnavailable => Self::UpstreamError,
            ErrorKind::Internal => Self::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let body = ErrorResponse { error: self.to_error_body(message) };
        (self.status_code(), Json(body))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
