//! Error types for edge-trust
//!
//! [`Error`] covers start-up and infrastructure failures. [`AuthError`] is the
//! HTTP boundary: every trust-validation failure is turned into one of its
//! variants and serialized as `{"message": "..."}`.

use std::io;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use trust_core::{KeyError, TokenError, ValidationErrors};

/// Result type alias for edge-trust
pub type Result<T> = std::result::Result<T, Error>;

/// edge-trust errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key material could not be loaded
    #[error("Key error: {0}")]
    Keys(#[from] KeyError),

    /// Token could not be minted
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Authentication and authorization failures, as seen by HTTP clients.
///
/// | Variant | Status |
/// |---------|--------|
/// | `MissingTrustHeader`, `InvalidToken`, `MalformedToken`, `MalformedCredential`, `CredentialMismatch` | 401 |
/// | `IdentityRequired`, `InsufficientAuthority` | 403 |
/// | `NoRoute` | 404 |
/// | `PayloadTooLarge` | 413 |
/// | `UpstreamUnavailable` | 502 |
/// | `Internal` | 500 |
///
/// Messages are fixed per variant (or per validation failure) and never
/// carry claim contents.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The credential this hop requires was not presented.
    #[error("authentication required")]
    MissingTrustHeader,

    /// A token parsed but failed validation.
    #[error("{}", .0.first())]
    InvalidToken(ValidationErrors),

    /// A bearer value that is not a JWT.
    #[error("malformed token")]
    MalformedToken,

    /// A relayed Basic credential that cannot be decoded.
    #[error("malformed credential")]
    MalformedCredential,

    /// Username/password did not match the credential store.
    #[error("invalid username or password")]
    CredentialMismatch,

    /// The route needs a human identity and the request carries none.
    #[error("user identity required")]
    IdentityRequired,

    /// The principal lacks an authority the route requires.
    #[error("insufficient authority")]
    InsufficientAuthority,

    /// No upstream route matches the request path.
    #[error("no route for request path")]
    NoRoute,

    /// Request body exceeds the configured limit.
    #[error("request body too large")]
    PayloadTooLarge,

    /// The upstream service could not be reached.
    #[error("upstream service unavailable")]
    UpstreamUnavailable,

    /// Anything else. The detail is logged, never returned.
    #[error("internal error")]
    Internal(String),
}

impl AuthError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingTrustHeader
            | Self::InvalidToken(_)
            | Self::MalformedToken
            | Self::MalformedCredential
            | Self::CredentialMismatch => StatusCode::UNAUTHORIZED,
            Self::IdentityRequired | Self::InsufficientAuthority => StatusCode::FORBIDDEN,
            Self::NoRoute => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable kind, used in audit events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingTrustHeader => "missing_trust_header",
            Self::InvalidToken(_) => "invalid_token",
            Self::MalformedToken => "malformed_token",
            Self::MalformedCredential => "malformed_credential",
            Self::CredentialMismatch => "credential_mismatch",
            Self::IdentityRequired => "identity_required",
            Self::InsufficientAuthority => "insufficient_authority",
            Self::NoRoute => "no_route",
            Self::PayloadTooLarge => "payload_too_large",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Rejected(errors) => Self::InvalidToken(errors),
            TokenError::Malformed(_) => Self::MalformedToken,
            TokenError::Signing(reason) => Self::Internal(reason),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let Self::Internal(ref detail) = self {
            tracing::error!(error = %detail, "Internal error");
        }

        let mut response = (status, Json(json!({ "message": self.to_string() }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
