//! Header parsing shared by every role.

use axum::http::{HeaderMap, header};

/// A header as UTF-8 text. Non-UTF-8 values are treated as absent.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Credentials of `scheme` in `Authorization` (scheme compared case-insensitively).
fn authorization<'a>(headers: &'a HeaderMap, scheme: &str) -> Option<&'a str> {
    let value = header_str(headers, header::AUTHORIZATION.as_str())?;
    let (found, credentials) = value.trim().split_once(' ')?;
    let credentials = credentials.trim();
    (found.eq_ignore_ascii_case(scheme) && !credentials.is_empty()).then_some(credentials)
}

/// The token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    authorization(headers, "bearer")
}

/// The raw base64 payload of an `Authorization: Basic <payload>` header.
pub fn basic_payload(headers: &HeaderMap) -> Option<&str> {
    authorization(headers, "basic")
}
