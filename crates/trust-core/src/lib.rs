//! Trust-propagation primitives for the edge gateway.
//!
//! A user proves who they are once, at the edge, with a long-lived user token.
//! The gateway then hands every internal service a different credential: a
//! 60-second robot token that only proves "this request transited the gateway",
//! with the user's identity riding alongside as two unsigned headers.
//!
//! This crate holds the pure, synchronous half of that protocol:
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`keys`] | RSA key material tagged with its trust domain at the type level |
//! | [`claims`] | The claim set carried inside both kinds of token |
//! | [`codec`] | RS256 sign / verify |
//! | [`validate`] | User and robot validators that union every failed check |
//! | [`issue`] | Robot and user token issuers |
//! | [`identity`] | Identity headers, the header-derived principal, Basic credentials |
//!
//! Nothing here performs I/O beyond optional PEM file loading.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod claims;
pub mod codec;
pub mod identity;
pub mod issue;
pub mod keys;
pub mod validate;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use claims::{
    ACCESS_TOKEN_TYPE, ClaimSet, ClaimTemplate, ROBOT_SUBJECT, ROBOT_TOKEN_LIFETIME, ROLE_PREFIX,
    RobotToken, SignedToken, USER_TOKEN_LIFETIME, UserToken,
};
pub use codec::{TokenCodec, TokenError, unix_now};
pub use identity::{
    AuthenticatedPrincipal, BasicCredentials, CredentialError, HeaderIdentityExtractor,
    IdentityHeaders, X_BASIC_AUTHORIZATION, X_USER, X_USER_ROLES,
};
pub use issue::{RobotTokenIssuer, UserTokenIssuer, normalize_role};
pub use keys::{
    KeyError, Robot, RobotSigningKeys, RobotVerifyingKey, SigningKeys, TrustDomain, User,
    UserSigningKeys, UserVerifyingKey, VerifyingKey,
};
pub use validate::{RobotTokenValidator, UserTokenValidator, ValidationError, ValidationErrors};
