//! Token issuers.

use tracing::debug;

use crate::claims::{ClaimTemplate, ROLE_PREFIX, RobotToken, UserToken};
use crate::codec::{TokenCodec, TokenError, unix_now};
use crate::keys::{RobotSigningKeys, UserSigningKeys};

/// Mints robot tokens at the gateway.
///
/// Stateless and deliberately not cached: every forwarded request gets a
/// brand-new token, so a leaked one is useless after 60 seconds.
#[derive(Debug, Clone)]
pub struct RobotTokenIssuer {
    keys: RobotSigningKeys,
    template: ClaimTemplate,
    codec: TokenCodec,
}

impl RobotTokenIssuer {
    /// Issuer signing with `keys` under the gateway name `issuer`.
    pub fn new(keys: RobotSigningKeys, issuer: impl Into<String>, codec: TokenCodec) -> Self {
        Self {
            keys,
            template: ClaimTemplate::robot(issuer),
            codec,
        }
    }

    /// Configured gateway name.
    pub fn issuer(&self) -> &str {
        &self.template.issuer
    }

    /// Mint a robot token valid for the next 60 seconds.
    pub fn issue(&self) -> Result<RobotToken, TokenError> {
        self.issue_at(unix_now())
    }

    /// Mint a robot token as if the current time were `now`.
    pub fn issue_at(&self, now: i64) -> Result<RobotToken, TokenError> {
        self.codec.sign_at(&self.template, &self.keys, now)
    }
}

/// Mints user tokens at the authorization service's login endpoint.
#[derive(Debug, Clone)]
pub struct UserTokenIssuer {
    keys: UserSigningKeys,
    issuer: String,
    codec: TokenCodec,
}

impl UserTokenIssuer {
    /// Issuer signing with `keys` under the published name `issuer`.
    pub fn new(keys: UserSigningKeys, issuer: impl Into<String>, codec: TokenCodec) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            codec,
        }
    }

    /// Published issuer name.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Mint a one-hour user token for `subject` carrying `roles`.
    ///
    /// Role names are normalized to carry the `ROLE_` prefix exactly once, in
    /// the order given.
    pub fn issue<I, S>(&self, subject: &str, roles: I) -> Result<UserToken, TokenError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.issue_at(subject, roles, unix_now())
    }

    /// Mint a user token as if the current time were `now`.
    pub fn issue_at<I, S>(&self, subject: &str, roles: I, now: i64) -> Result<UserToken, TokenError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let roles: Vec<String> = roles
            .into_iter()
            .map(|role| normalize_role(role.as_ref()))
            .filter(|role| role.len() > ROLE_PREFIX.len())
            .collect();
        debug!(subject, role_count = roles.len(), "Minting user token");
        let template = ClaimTemplate::user(self.issuer.clone(), subject, roles);
        self.codec.sign_at(&template, &self.keys, now)
    }
}

/// `admin` and `ROLE_admin` both become `ROLE_admin`; surrounding whitespace is dropped.
pub fn normalize_role(role: &str) -> String {
    let role = role.trim();
    if role.starts_with(ROLE_PREFIX) {
        role.to_string()
    } else {
        format!("{ROLE_PREFIX}{role}")
    }
}
