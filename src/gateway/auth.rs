//! User token validation at the gateway.
//!
//! Rules, in order:
//! - A bearer token that fails validation is rejected with 401, on every path.
//! - Public paths (and the login path) pass without a user token.
//! - Any other path needs a valid user token.
//! - A route with `required_roles` needs the user to hold at least one of them.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;
use trust_core::ClaimSet;

use super::GatewayState;
use crate::audit::{self, AuditEvent};
use crate::error::AuthError;
use crate::headers::bearer_token;

/// Outcome of user token validation, stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAuthentication {
    /// No bearer token was presented.
    Skipped,
    /// A bearer token passed validation.
    Valid(ClaimSet),
}

impl UserAuthentication {
    /// Validated claims, if any.
    pub fn claims(&self) -> Option<&ClaimSet> {
        match self {
            Self::Skipped => None,
            Self::Valid(claims) => Some(claims),
        }
    }
}

impl GatewayState {
    /// Run the user token stage for one request.
    pub fn authenticate(
        &self,
        request: &Request<Body>,
    ) -> Result<UserAuthentication, AuthError> {
        let path = request.uri().path();

        let auth = match bearer_token(request.headers()) {
            None => UserAuthentication::Skipped,
            Some(token) => match self.validator.validate(token) {
                Ok(claims) => UserAuthentication::Valid(claims),
                Err(err) => {
                    audit::emit(&AuditEvent::user_token_rejected(path, &err));
                    return Err(err.into());
                }
            },
        };

        if self.is_public_path(path) {
            return Ok(auth);
        }

        let UserAuthentication::Valid(ref claims) = auth else {
            debug!(path = %path, "User token required");
            return Err(AuthError::MissingTrustHeader);
        };

        if let Some(route) = self.routes.resolve(path) {
            if !route.permits(claims.roles()) {
                audit::emit(&AuditEvent::authority_denied(
                    path,
                    Some(&claims.sub),
                    &route.required_roles.join(","),
                ));
                return Err(AuthError::InsufficientAuthority);
            }
        }

        Ok(auth)
    }
}

/// Middleware: validate the user token, apply path rules, and attach the
/// [`UserAuthentication`] to the request.
pub async fn user_auth(
    State(state): State<Arc<GatewayState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match state.authenticate(&request) {
        Ok(auth) => {
            debug!(
                path = %request.uri().path(),
                subject = ?auth.claims().map(|c| c.sub.as_str()),
                "User token stage passed"
            );
            request.extensions_mut().insert(auth);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}
