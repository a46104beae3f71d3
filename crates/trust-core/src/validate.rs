//! User and robot token validators.
//!
//! A validator is the codec's signature check followed by an ordered list of
//! pure claim checks. Every check runs and the failures are unioned, so a
//! token that is both expired and has the wrong subject reports both.

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::claims::{ACCESS_TOKEN_TYPE, ClaimSet, ROBOT_SUBJECT};
use crate::codec::{TokenCodec, TokenError, unix_now};
use crate::keys::{RobotVerifyingKey, UserVerifyingKey};

/// A single failed check.
///
/// Messages name the check only and never echo claim values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ValidationError {
    /// Signature does not verify against the domain's public key.
    #[error("token signature is invalid")]
    BadSignature,
    /// `now >= exp`.
    #[error("token has expired")]
    Expired,
    /// `now < iat`.
    #[error("token is not yet valid")]
    NotYetValid,
    /// `iss` is not the expected minting party.
    #[error("token issuer is not trusted")]
    WrongIssuer,
    /// `sub` is not permitted for this trust domain.
    #[error("token subject is not permitted")]
    WrongSubject,
    /// `type` is not `access_token`.
    #[error("token type is not an access token")]
    WrongType,
}

/// Non-empty, ordered, de-duplicated set of validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    /// A single failure.
    pub fn single(error: ValidationError) -> Self {
        Self(vec![error])
    }

    /// Union a list of failures; `None` when the list is empty.
    pub fn from_vec(errors: Vec<ValidationError>) -> Option<Self> {
        let mut unique: Vec<ValidationError> = Vec::with_capacity(errors.len());
        for error in errors {
            if !unique.contains(&error) {
                unique.push(error);
            }
        }
        (!unique.is_empty()).then_some(Self(unique))
    }

    /// Whether `error` is among the failures.
    pub fn contains(&self, error: ValidationError) -> bool {
        self.0.contains(&error)
    }

    /// Iterate failures in check order.
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    /// Number of distinct failures.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First failure, used for picking the client-facing message.
    pub fn first(&self) -> ValidationError {
        self.0[0]
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// A pure claim check. Returns every failure it finds (usually zero or one).
type ClaimCheck = Box<dyn Fn(&ClaimSet, i64) -> Vec<ValidationError> + Send + Sync>;

fn lifetime_check(codec: TokenCodec) -> ClaimCheck {
    Box::new(move |claims, now| codec.check_lifetime(claims, now))
}

fn issuer_check(expected: String) -> ClaimCheck {
    Box::new(move |claims, _| {
        if claims.iss == expected {
            Vec::new()
        } else {
            debug!(expected = %expected, actual = %claims.iss, "Issuer mismatch");
            vec![ValidationError::WrongIssuer]
        }
    })
}

fn robot_subject_check() -> ClaimCheck {
    Box::new(|claims, _| {
        if claims.sub == ROBOT_SUBJECT {
            Vec::new()
        } else {
            vec![ValidationError::WrongSubject]
        }
    })
}

fn access_token_type_check() -> ClaimCheck {
    Box::new(|claims, _| {
        if claims.token_type == ACCESS_TOKEN_TYPE {
            Vec::new()
        } else {
            vec![ValidationError::WrongType]
        }
    })
}

fn run_checks(checks: &[ClaimCheck], claims: &ClaimSet, now: i64) -> Option<ValidationErrors> {
    let errors = checks.iter().flat_map(|check| check(claims, now)).collect();
    ValidationErrors::from_vec(errors)
}

/// Strip a case-insensitive `Bearer ` prefix, if present.
fn strip_bearer(token: &str) -> &str {
    match token.get(..7) {
        Some(scheme) if scheme.eq_ignore_ascii_case("bearer ") => token[7..].trim(),
        _ => token.trim(),
    }
}

/// Validates user tokens at the gateway.
///
/// Internal services never run this: they only ever see robot tokens.
pub struct UserTokenValidator {
    key: UserVerifyingKey,
    codec: TokenCodec,
    checks: Vec<ClaimCheck>,
}

impl UserTokenValidator {
    /// Validator trusting tokens signed by `key` and minted by `issuer`.
    pub fn new(key: UserVerifyingKey, issuer: impl Into<String>, codec: TokenCodec) -> Self {
        let checks = vec![lifetime_check(codec), issuer_check(issuer.into())];
        Self { key, codec, checks }
    }

    /// Validate a bearer token (with or without the `Bearer ` prefix).
    pub fn validate(&self, bearer_token: &str) -> Result<ClaimSet, TokenError> {
        self.validate_at(bearer_token, unix_now())
    }

    /// Validate as if the current time were `now`.
    pub fn validate_at(&self, bearer_token: &str, now: i64) -> Result<ClaimSet, TokenError> {
        let claims = self.codec.decode_signed(strip_bearer(bearer_token), &self.key)?;
        match run_checks(&self.checks, &claims, now) {
            Some(errors) => Err(TokenError::Rejected(errors)),
            None => Ok(claims),
        }
    }
}

/// Validates robot tokens at the entry of every internal service.
///
/// On top of signature, lifetime and issuer, the subject must be exactly
/// `"robot"` and the type exactly `"access_token"`. Both are always checked.
pub struct RobotTokenValidator {
    key: RobotVerifyingKey,
    codec: TokenCodec,
    checks: Vec<ClaimCheck>,
}

impl RobotTokenValidator {
    /// Validator trusting tokens signed by `key` and minted by the gateway named `issuer`.
    pub fn new(key: RobotVerifyingKey, issuer: impl Into<String>, codec: TokenCodec) -> Self {
        let checks = vec![
            lifetime_check(codec),
            issuer_check(issuer.into()),
            robot_subject_check(),
            access_token_type_check(),
        ];
        Self { key, codec, checks }
    }

    /// Validate a bearer token (with or without the `Bearer ` prefix).
    pub fn validate(&self, bearer_token: &str) -> Result<ClaimSet, TokenError> {
        self.validate_at(bearer_token, unix_now())
    }

    /// Validate as if the current time were `now`.
    pub fn validate_at(&self, bearer_token: &str, now: i64) -> Result<ClaimSet, TokenError> {
        let claims = self.codec.decode_signed(strip_bearer(bearer_token), &self.key)?;
        match run_checks(&self.checks, &claims, now) {
            Some(errors) => Err(TokenError::Rejected(errors)),
            None => Ok(claims),
        }
    }
}
