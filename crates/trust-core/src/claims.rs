//! Claim sets carried inside user and robot tokens.
//!
//! Field names on the wire are bit-exact with the rest of the system:
//! `iss`, `sub`, `iat`, `exp`, `type` and, for user tokens only, `roles`.

use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::keys::{Robot, TrustDomain, User};

/// Subject of every robot token.
pub const ROBOT_SUBJECT: &str = "robot";

/// Value of the `type` claim on every accepted token.
pub const ACCESS_TOKEN_TYPE: &str = "access_token";

/// Robot token lifetime (fixed).
pub const ROBOT_TOKEN_LIFETIME: Duration = Duration::from_secs(60);

/// User token lifetime (fixed).
pub const USER_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Conventional prefix on every role name carried in a user token.
pub const ROLE_PREFIX: &str = "ROLE_";

/// Claims inside a signed token. Immutable once issued.
///
/// `iss`, `sub` and `type` default to empty when absent so that a well-signed
/// token missing them fails the issuer / subject / type checks instead of
/// being reported as unparsable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSet {
    /// Minting party.
    #[serde(default)]
    pub iss: String,
    /// Email for user tokens, `"robot"` for robot tokens.
    #[serde(default)]
    pub sub: String,
    /// Issued at (Unix seconds).
    pub iat: i64,
    /// Expires at (Unix seconds).
    pub exp: i64,
    /// Token type, must be `"access_token"`.
    #[serde(rename = "type", default)]
    pub token_type: String,
    /// Role names, user tokens only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

impl ClaimSet {
    /// Roles as a slice (empty when the claim is absent).
    pub fn roles(&self) -> &[String] {
        self.roles.as_deref().unwrap_or_default()
    }
}

/// Unsigned description of a token, turned into a [`ClaimSet`] at signing time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimTemplate {
    /// Minting party.
    pub issuer: String,
    /// Token subject.
    pub subject: String,
    /// Value of the `type` claim.
    pub token_type: String,
    /// Role names (user tokens only).
    pub roles: Option<Vec<String>>,
    /// Distance between `iat` and `exp`.
    pub lifetime: Duration,
}

impl ClaimTemplate {
    /// Template for a robot token minted by `issuer`.
    pub fn robot(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            subject: ROBOT_SUBJECT.to_string(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
            roles: None,
            lifetime: ROBOT_TOKEN_LIFETIME,
        }
    }

    /// Template for a user token.
    pub fn user(issuer: impl Into<String>, subject: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            issuer: issuer.into(),
            subject: subject.into(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
            roles: Some(roles),
            lifetime: USER_TOKEN_LIFETIME,
        }
    }

    /// Stamp the template at `now`, deriving a new claim set.
    pub fn stamp(&self, now: i64) -> ClaimSet {
        let lifetime = i64::try_from(self.lifetime.as_secs()).unwrap_or(i64::MAX);
        ClaimSet {
            iss: self.issuer.clone(),
            sub: self.subject.clone(),
            iat: now,
            exp: now.saturating_add(lifetime),
            token_type: self.token_type.clone(),
            roles: self.roles.clone(),
        }
    }
}

/// A compact JWT, tagged with the trust domain whose key signed it.
pub struct SignedToken<D: TrustDomain> {
    compact: String,
    claims: ClaimSet,
    _domain: PhantomData<fn() -> D>,
}

impl<D: TrustDomain> SignedToken<D> {
    pub(crate) fn new(compact: String, claims: ClaimSet) -> Self {
        Self {
            compact,
            claims,
            _domain: PhantomData,
        }
    }

    /// The compact `header.payload.signature` form.
    pub fn as_str(&self) -> &str {
        &self.compact
    }

    /// The claims that were signed.
    pub fn claims(&self) -> &ClaimSet {
        &self.claims
    }

    /// `Authorization` header value for this token.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.compact)
    }

    /// Consume the token, returning the compact form.
    pub fn into_string(self) -> String {
        self.compact
    }
}

impl<D: TrustDomain> Clone for SignedToken<D> {
    fn clone(&self) -> Self {
        Self::new(self.compact.clone(), self.claims.clone())
    }
}

impl<D: TrustDomain> fmt::Debug for SignedToken<D> {
    // The compact form is a live credential and stays out of logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedToken")
            .field("domain", &D::NAME)
            .field("sub", &self.claims.sub)
            .field("exp", &self.claims.exp)
            .finish_non_exhaustive()
    }
}

/// Signed user token.
pub type UserToken = SignedToken<User>;
/// Signed robot token.
pub type RobotToken = SignedToken<Robot>;
