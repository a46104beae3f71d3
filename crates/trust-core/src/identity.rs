//! Identity headers and the principal internal services build from them.
//!
//! `X-User` and `X-User-Roles` are plain, unsigned HTTP headers. They are
//! trusted only because a request carrying them also passed the robot-token
//! gate: anything able to reach an internal service with a valid robot token
//! can set them to arbitrary values. That is the trust boundary of this
//! system, and nothing in this module attempts to verify them.

use std::collections::BTreeSet;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use thiserror::Error;

use crate::claims::ClaimSet;

/// Subject of the validated user token.
pub const X_USER: &str = "x-user";

/// Comma-joined role names of the validated user token.
pub const X_USER_ROLES: &str = "x-user-roles";

/// Raw Basic payload relayed from the gateway's login path.
pub const X_BASIC_AUTHORIZATION: &str = "x-basic-authorization";

/// Identity headers written by the gateway on an outbound request.
///
/// `None` means the header must be absent, never an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityHeaders {
    /// Value for `X-User`.
    pub user: Option<String>,
    /// Value for `X-User-Roles`.
    pub roles: Option<String>,
}

impl IdentityHeaders {
    /// Headers derived from a validated user claim set, or none at all.
    pub fn from_claims(claims: Option<&ClaimSet>) -> Self {
        let Some(claims) = claims else {
            return Self::default();
        };
        let user = Some(claims.sub.clone()).filter(|sub| !sub.trim().is_empty());
        let roles = match (&user, claims.roles()) {
            (Some(_), roles) if !roles.is_empty() => Some(roles.join(",")),
            _ => None,
        };
        Self { user, roles }
    }

    /// Whether neither header will be written.
    pub fn is_cleared(&self) -> bool {
        self.user.is_none() && self.roles.is_none()
    }
}

/// Result of request-scoped authentication at an internal service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedPrincipal {
    /// Human subject, `None` for anonymous-but-routed requests.
    pub subject: Option<String>,
    /// Granted authorities, verbatim from `X-User-Roles`.
    pub authorities: BTreeSet<String>,
    /// Always `true` once the robot gate passed.
    pub authenticated: bool,
}

impl AuthenticatedPrincipal {
    /// Principal for a routed request with no human identity attached.
    pub fn anonymous() -> Self {
        Self {
            subject: None,
            authorities: BTreeSet::new(),
            authenticated: true,
        }
    }

    /// Principal for a known subject.
    pub fn user(subject: impl Into<String>, authorities: impl IntoIterator<Item = String>) -> Self {
        Self {
            subject: Some(subject.into()),
            authorities: authorities.into_iter().collect(),
            authenticated: true,
        }
    }

    /// Whether `authority` was granted.
    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }

    /// The subject, if there is one.
    pub fn require_subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }
}

/// Builds an [`AuthenticatedPrincipal`] from identity header values.
///
/// Plain string parsing; callers must have run the robot-token gate first.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderIdentityExtractor;

impl HeaderIdentityExtractor {
    /// Extract a principal from raw `X-User` / `X-User-Roles` values.
    ///
    /// A missing or blank `X-User` yields the anonymous principal regardless of
    /// roles. Roles are split on `,` and mapped 1:1; empty segments are skipped.
    pub fn extract(&self, x_user: Option<&str>, x_user_roles: Option<&str>) -> AuthenticatedPrincipal {
        let Some(subject) = x_user.filter(|v| !v.trim().is_empty()) else {
            return AuthenticatedPrincipal::anonymous();
        };

        let authorities = x_user_roles
            .filter(|v| !v.trim().is_empty())
            .map(|roles| {
                roles
                    .split(',')
                    .filter(|role| !role.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        AuthenticatedPrincipal {
            subject: Some(subject.to_string()),
            authorities,
            authenticated: true,
        }
    }
}

/// Failures decoding a relayed Basic credential.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// Not base64, not UTF-8, or not exactly `username:password`.
    #[error("malformed credential")]
    Malformed,
}

/// `username:password` decoded from a Basic payload.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    /// Username as presented.
    pub username: String,
    /// Password as presented.
    pub password: String,
}

impl BasicCredentials {
    /// Decode the base64 payload of a Basic credential (without the `Basic ` scheme).
    pub fn decode(payload: &str) -> Result<Self, CredentialError> {
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|_| CredentialError::Malformed)?;
        let text = String::from_utf8(bytes).map_err(|_| CredentialError::Malformed)?;

        let parts: Vec<&str> = text.split(':').collect();
        let [username, password] = parts.as_slice() else {
            return Err(CredentialError::Malformed);
        };
        if username.is_empty() {
            return Err(CredentialError::Malformed);
        }

        Ok(Self {
            username: (*username).to_string(),
            password: (*password).to_string(),
        })
    }

    /// Base64 payload for these credentials.
    pub fn encode(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.username, self.password))
    }
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
