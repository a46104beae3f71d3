//! Route-level authority checks (the Permit / Deny decision).

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use trust_core::AuthenticatedPrincipal;

use crate::audit::{self, AuditEvent};
use crate::error::AuthError;

/// Authority a route requires, e.g. `ROLE_ADMIN`.
#[derive(Debug, Clone)]
pub struct RequiredAuthority(Arc<str>);

impl RequiredAuthority {
    /// Require `authority`, compared verbatim.
    pub fn new(authority: &str) -> Self {
        Self(Arc::from(authority))
    }

    /// The authority name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Permit or deny `principal`.
    ///
    /// Anonymous principals get 403 `IdentityRequired`; identified ones lacking
    /// the authority get 403 `InsufficientAuthority`.
    pub fn check(&self, principal: &AuthenticatedPrincipal, path: &str) -> Result<(), AuthError> {
        let Some(subject) = principal.require_subject() else {
            audit::emit(&AuditEvent::identity_required(path));
            return Err(AuthError::IdentityRequired);
        };
        if principal.has_authority(self.as_str()) {
            Ok(())
        } else {
            audit::emit(&AuditEvent::authority_denied(path, Some(subject), self.as_str()));
            Err(AuthError::InsufficientAuthority)
        }
    }
}

/// Middleware for `route_layer`: deny unless the gate-derived principal holds
/// the required authority.
pub async fn require_authority(
    State(required): State<RequiredAuthority>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let decision = match request.extensions().get::<AuthenticatedPrincipal>() {
        Some(principal) => required.check(principal, request.uri().path()),
        None => Err(AuthError::MissingTrustHeader),
    };
    match decision {
        Ok(()) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> RequiredAuthority {
        RequiredAuthority::new("ROLE_ADMIN")
    }

    #[test]
    fn permits_holder() {
        let principal = AuthenticatedPrincipal::user("alice", ["ROLE_ADMIN".to_string()]);
        assert!(admin().check(&principal, "/admin").is_ok());
    }

    #[test]
    fn denies_identified_non_holder() {
        let principal = AuthenticatedPrincipal::user("bob", ["ROLE_USER".to_string()]);
        assert!(matches!(
            admin().check(&principal, "/admin"),
            Err(AuthError::InsufficientAuthority)
        ));
    }

    #[test]
    fn anonymous_is_identity_required() {
        assert!(matches!(
            admin().check(&AuthenticatedPrincipal::anonymous(), "/admin"),
            Err(AuthError::IdentityRequired)
        ));
    }

    #[test]
    fn no_prefixing_is_applied() {
        let principal = AuthenticatedPrincipal::user("carol", ["ADMIN".to_string()]);
        assert!(admin().check(&principal, "/admin").is_err());
    }
}
