//! edge-trust
//!
//! One edge gateway terminates end-user authentication; every internal service
//! trusts the gateway instead of re-authenticating users.
//!
//! # Roles
//!
//! - **Gateway** ([`gateway`]): validates the user's bearer token, writes
//!   `X-User` / `X-User-Roles`, replaces `Authorization` with a fresh 60-second
//!   robot token and forwards the request upstream.
//! - **Internal service** ([`service`]): admits only requests carrying a valid
//!   robot token, then builds the caller's principal from the identity headers.
//! - **Authorization service** ([`authorization`]): verifies relayed Basic
//!   credentials and mints one-hour user tokens.
//!
//! The token primitives live in the `trust-core` crate.
//!
//! # Trust boundary
//!
//! Identity headers are unsigned. An internal service believes them only
//! because the request also carried a robot token, so anything holding a valid
//! robot token can assert any identity. Network topology (only the gateway can
//! reach internal services) is what makes this safe.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod authorization;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod headers;
pub mod server;
pub mod service;

pub use error::{AuthError, Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(e.to_string()))?,
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(e.to_string()))?,
    }

    Ok(())
}
