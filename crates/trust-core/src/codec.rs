//! RS256 token codec.
//!
//! `sign` stamps `iat = now` and derives `exp` from the template lifetime.
//! `verify` checks, independently: the signature, `now < exp`, and `now >= iat`.
//! Expected failures come back as typed [`ValidationError`]s; only input that
//! cannot be parsed as a JWT at all is [`TokenError::Malformed`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation};
use thiserror::Error;

use crate::claims::{ClaimSet, ClaimTemplate, SignedToken};
use crate::keys::{SigningKeys, TrustDomain, VerifyingKey};
use crate::validate::{ValidationError, ValidationErrors};

/// Signing algorithm for both trust domains.
const ALGORITHM: Algorithm = Algorithm::RS256;

/// Codec failures.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The input is not a parsable JWT.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The token parsed but failed one or more checks.
    #[error("{0}")]
    Rejected(ValidationErrors),

    /// The private key refused to sign.
    #[error("token signing failed: {0}")]
    Signing(String),
}

impl TokenError {
    /// Validation errors, if this is a rejection.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Rejected(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<ValidationErrors> for TokenError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Rejected(errors)
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// Pure sign / verify over a trust domain's keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCodec {
    /// Tolerance (seconds) applied to both the `exp` and `iat` comparisons.
    leeway: i64,
}

impl TokenCodec {
    /// Codec with no clock-skew tolerance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec tolerating `leeway` of clock skew between minting and verifying hosts.
    pub fn with_leeway(leeway: Duration) -> Self {
        Self {
            leeway: i64::try_from(leeway.as_secs()).unwrap_or(i64::MAX),
        }
    }

    /// Sign `template` now.
    pub fn sign<D: TrustDomain>(
        &self,
        template: &ClaimTemplate,
        keys: &SigningKeys<D>,
    ) -> Result<SignedToken<D>, TokenError> {
        self.sign_at(template, keys, unix_now())
    }

    /// Sign `template` as if the current time were `now`.
    pub fn sign_at<D: TrustDomain>(
        &self,
        template: &ClaimTemplate,
        keys: &SigningKeys<D>,
        now: i64,
    ) -> Result<SignedToken<D>, TokenError> {
        let claims = template.stamp(now);
        let compact = jsonwebtoken::encode(&Header::new(ALGORITHM), &claims, keys.encoding_key())
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        Ok(SignedToken::new(compact, claims))
    }

    /// Verify signature and lifetime now.
    pub fn verify<D: TrustDomain>(
        &self,
        token: &str,
        key: &VerifyingKey<D>,
    ) -> Result<ClaimSet, TokenError> {
        self.verify_at(token, key, unix_now())
    }

    /// Verify signature and lifetime as if the current time were `now`.
    pub fn verify_at<D: TrustDomain>(
        &self,
        token: &str,
        key: &VerifyingKey<D>,
        now: i64,
    ) -> Result<ClaimSet, TokenError> {
        let claims = self.decode_signed(token, key)?;
        match ValidationErrors::from_vec(self.check_lifetime(&claims, now)) {
            Some(errors) => Err(TokenError::Rejected(errors)),
            None => Ok(claims),
        }
    }

    /// Check only the signature and decode the claims.
    ///
    /// Callers must run [`check_lifetime`](Self::check_lifetime) (or a
    /// validator) before trusting the result.
    pub fn decode_signed<D: TrustDomain>(
        &self,
        token: &str,
        key: &VerifyingKey<D>,
    ) -> Result<ClaimSet, TokenError> {
        // Time and claim checks run separately so every failure is reported.
        let mut validation = Validation::new(ALGORITHM);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;

        jsonwebtoken::decode::<ClaimSet>(token, key.decoding_key(), &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::Rejected(ValidationErrors::single(ValidationError::BadSignature))
                }
                _ => TokenError::Malformed(e.to_string()),
            })
    }

    /// Lifetime checks: `now < exp` and `now >= iat`, each widened by the leeway.
    pub fn check_lifetime(&self, claims: &ClaimSet, now: i64) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if now >= claims.exp.saturating_add(self.leeway) {
            errors.push(ValidationError::Expired);
        }
        if now.saturating_add(self.leeway) < claims.iat {
            errors.push(ValidationError::NotYetValid);
        }
        errors
    }
}
