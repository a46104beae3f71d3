//! Fixture keys and token-crafting helpers for tests.
//!
//! Enabled inside this crate's own tests and, for downstream crates, through
//! the `testutil` feature (dev-dependencies only). The keys are throwaway
//! 2048-bit RSA pairs; never use them outside tests.

#![allow(clippy::missing_panics_doc)]

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, Header};
use serde::Serialize;

use crate::claims::ClaimSet;
use crate::keys::{RobotSigningKeys, SigningKeys, TrustDomain, UserSigningKeys};

/// User-domain private key (PKCS#1 PEM).
pub const USER_PRIVATE_PEM: &[u8] = include_bytes!("../testdata/user_private.pem");
/// User-domain public key (PKCS#1 PEM).
pub const USER_PUBLIC_PEM: &[u8] = include_bytes!("../testdata/user_public.pem");
/// Robot-domain private key (PKCS#1 PEM).
pub const ROBOT_PRIVATE_PEM: &[u8] = include_bytes!("../testdata/robot_private.pem");
/// Robot-domain public key (PKCS#1 PEM).
pub const ROBOT_PUBLIC_PEM: &[u8] = include_bytes!("../testdata/robot_public.pem");
/// A key pair nobody trusts.
pub const ROGUE_PRIVATE_PEM: &[u8] = include_bytes!("../testdata/rogue_private.pem");
/// Public half of the untrusted pair.
pub const ROGUE_PUBLIC_PEM: &[u8] = include_bytes!("../testdata/rogue_public.pem");

/// The trusted user key pair.
pub fn user_keys() -> UserSigningKeys {
    SigningKeys::from_pem(USER_PRIVATE_PEM, USER_PUBLIC_PEM).expect("user fixture keys")
}

/// The trusted robot key pair.
pub fn robot_keys() -> RobotSigningKeys {
    SigningKeys::from_pem(ROBOT_PRIVATE_PEM, ROBOT_PUBLIC_PEM).expect("robot fixture keys")
}

/// The untrusted pair, typed as robot keys, for forging robot tokens.
pub fn rogue_robot_keys() -> RobotSigningKeys {
    SigningKeys::from_pem(ROGUE_PRIVATE_PEM, ROGUE_PUBLIC_PEM).expect("rogue fixture keys")
}

/// The untrusted pair, typed as user keys, for forging user tokens.
pub fn rogue_user_keys() -> UserSigningKeys {
    SigningKeys::from_pem(ROGUE_PRIVATE_PEM, ROGUE_PUBLIC_PEM).expect("rogue fixture keys")
}

/// Sign an arbitrary claim set, bypassing the issuers' fixed shapes.
pub fn sign_claims<D: TrustDomain>(claims: &ClaimSet, keys: &SigningKeys<D>) -> String {
    sign_json(claims, keys)
}

/// Sign any serializable payload with RS256.
pub fn sign_json<D: TrustDomain, T: Serialize>(payload: &T, keys: &SigningKeys<D>) -> String {
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), payload, keys.encoding_key())
        .expect("fixture signing")
}

/// Swap a token's payload while keeping its original header and signature.
pub fn replace_payload(token: &str, payload: &serde_json::Value) -> String {
    let mut parts = token.split('.');
    let header = parts.next().expect("header segment");
    let _ = parts.next().expect("payload segment");
    let signature = parts.next().expect("signature segment");
    let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload).expect("payload json"));
    format!("{header}.{body}.{signature}")
}
