//! Basic credential relay on the login path.
//!
//! The authorization service sits behind the robot gate like every other
//! service, so `Authorization` on the forwarded login request carries a robot
//! token. The client's Basic payload travels in `X-Basic-Authorization`
//! instead, copied byte for byte without decoding.

use axum::http::{HeaderMap, HeaderName};
use trust_core::X_BASIC_AUTHORIZATION;

use crate::headers::basic_payload;

/// Write `X-Basic-Authorization` on `outbound` when `path` is the login path
/// and `inbound` carries `Authorization: Basic`.
///
/// A client-supplied `X-Basic-Authorization` is dropped on every path.
/// Returns whether a credential was relayed.
pub fn relay_basic(path: &str, login_path: &str, inbound: &HeaderMap, outbound: &mut HeaderMap) -> bool {
    let name = HeaderName::from_static(X_BASIC_AUTHORIZATION);
    outbound.remove(&name);

    if path != login_path {
        return false;
    }
    let Some(payload) = basic_payload(inbound) else {
        return false;
    };
    match payload.parse() {
        Ok(value) => {
            outbound.insert(name, value);
            true
        }
        Err(_) => false,
    }
}
