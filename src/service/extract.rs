//! Handler extractors for the gate-derived principal.

use axum::{extract::FromRequestParts, http::request::Parts};
use trust_core::AuthenticatedPrincipal;

use crate::audit::{self, AuditEvent};
use crate::error::AuthError;

/// The principal of any request that passed the robot gate.
///
/// Rejects with 401 if the router was wired without [`robot_trust`](super::robot_trust):
/// without the gate there is no principal to trust.
#[derive(Debug, Clone)]
pub struct Principal(pub AuthenticatedPrincipal);

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedPrincipal>()
            .cloned()
            .map(Self)
            .ok_or(AuthError::MissingTrustHeader)
    }
}

/// A principal with a human subject. Rejects anonymous requests with 403.
#[derive(Debug, Clone)]
pub struct RequireUser {
    /// The `X-User` value.
    pub subject: String,
    /// The full principal.
    pub principal: AuthenticatedPrincipal,
}

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Principal(principal) = Principal::from_request_parts(parts, state).await?;
        match principal.subject.clone() {
            Some(subject) => Ok(Self { subject, principal }),
            None => {
                audit::emit(&AuditEvent::identity_required(parts.uri.path()));
                Err(AuthError::IdentityRequired)
            }
        }
    }
}
