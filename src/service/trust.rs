//! The robot-token trust gate.
//!
//! Runs first in every internal service. Per request:
//!
//! ```text
//! Received -> RobotTokenValidated | Rejected (401, terminal)
//!          -> IdentityExtracted (principal stored in request extensions)
//! ```
//!
//! Identity headers are not even looked at until the robot token has passed.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;
use trust_core::{
    AuthenticatedPrincipal, HeaderIdentityExtractor, RobotTokenValidator, RobotVerifyingKey,
    TokenCodec, X_USER, X_USER_ROLES,
};

use crate::audit::{self, AuditEvent};
use crate::config::Config;
use crate::error::AuthError;
use crate::headers::{bearer_token, header_str};

/// Robot-token validator plus header identity extraction.
pub struct RobotGate {
    validator: RobotTokenValidator,
    extractor: HeaderIdentityExtractor,
}

impl RobotGate {
    /// Gate trusting robot tokens signed by `key` and issued by `gateway_issuer`.
    pub fn new(key: RobotVerifyingKey, gateway_issuer: impl Into<String>, codec: TokenCodec) -> Self {
        Self {
            validator: RobotTokenValidator::new(key, gateway_issuer, codec),
            extractor: HeaderIdentityExtractor,
        }
    }

    /// Gate built from the robot public key and issuer in `config`.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        Ok(Self::new(
            config.keys.robot_verifying_key()?,
            config.tokens.robot_issuer.clone(),
            config.codec(),
        ))
    }

    /// Validate the robot token, then build the principal from identity headers.
    pub fn admit(&self, headers: &HeaderMap, path: &str) -> Result<AuthenticatedPrincipal, AuthError> {
        let Some(token) = bearer_token(headers) else {
            audit::emit(&AuditEvent::robot_token_rejected(path, None));
            return Err(AuthError::MissingTrustHeader);
        };

        if let Err(err) = self.validator.validate(token) {
            audit::emit(&AuditEvent::robot_token_rejected(path, Some(&err)));
            return Err(err.into());
        }

        Ok(self
            .extractor
            .extract(header_str(headers, X_USER), header_str(headers, X_USER_ROLES)))
    }
}

/// Middleware: reject anything without a valid robot token, otherwise attach
/// the header-derived [`AuthenticatedPrincipal`] to the request.
pub async fn robot_trust(
    State(gate): State<Arc<RobotGate>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    match gate.admit(request.headers(), &path) {
        Ok(principal) => {
            debug!(path = %path, subject = ?principal.subject, "Robot token accepted");
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}
