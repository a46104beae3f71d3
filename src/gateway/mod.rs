//! Edge gateway.
//!
//! The only component that sees user tokens. Per request:
//!
//! ```text
//! Received -> UserTokenValidation: Skipped | Valid | Invalid (401, terminal)
//!          -> IdentityHeadersSet | Cleared
//!          -> RobotTokenMinted
//!          -> Forwarded
//! ```
//!
//! The inbound `Authorization` header never leaves the gateway: every
//! forwarded request carries a freshly minted 60-second robot token instead.

mod auth;
mod login_relay;
mod propagation;
mod proxy;
mod router;

use std::sync::Arc;

use trust_core::{RobotTokenIssuer, UserTokenValidator};

pub use auth::{UserAuthentication, user_auth};
pub use login_relay::relay_basic;
pub use propagation::IdentityPropagationFilter;
pub use proxy::{Route, RouteTable, proxy_handler};
pub use router::create_router;

use crate::Result;
use crate::config::{Config, GatewayConfig, ServerConfig};
use crate::error::Error;

/// Shared state of the gateway.
pub struct GatewayState {
    /// User token validation (user public key only)
    pub validator: UserTokenValidator,
    /// Identity headers and robot token minting
    pub propagation: IdentityPropagationFilter,
    /// Upstream routes
    pub routes: RouteTable,
    /// Path prefixes reachable without a user token
    pub public_paths: Vec<String>,
    /// Path on which Basic credentials are relayed
    pub login_path: String,
    /// Outbound HTTP client
    pub client: reqwest::Client,
    /// Maximum forwarded request body (bytes)
    pub max_body_size: usize,
}

impl GatewayState {
    /// Assemble gateway state from already-loaded key material.
    pub fn new(
        validator: UserTokenValidator,
        issuer: RobotTokenIssuer,
        gateway: &GatewayConfig,
        server: &ServerConfig,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(server.request_timeout)
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .tcp_nodelay(true)
            // Redirects are relayed to the client, never followed here
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            validator,
            propagation: IdentityPropagationFilter::new(issuer),
            routes: RouteTable::new(&gateway.routes)?,
            public_paths: gateway.public_paths.clone(),
            login_path: gateway.login_path.clone(),
            client,
            max_body_size: server.max_body_size,
        })
    }

    /// State built from the keys, issuers and routes in `config`.
    pub fn from_config(config: &Config) -> Result<Arc<Self>> {
        let validator = UserTokenValidator::new(
            config.keys.user_verifying_key()?,
            config.tokens.user_issuer.clone(),
            config.codec(),
        );
        let issuer = RobotTokenIssuer::new(
            config.keys.robot_signing_keys()?,
            config.tokens.robot_issuer.clone(),
            config.codec(),
        );
        Ok(Arc::new(Self::new(
            validator,
            issuer,
            &config.gateway,
            &config.server,
        )?))
    }

    /// Whether `path` may be reached without a user token.
    ///
    /// The login path always is: it is how a user token is obtained.
    pub fn is_public_path(&self, path: &str) -> bool {
        path == self.login_path || self.public_paths.iter().any(|p| has_path_prefix(path, p))
    }

    /// Whether `path` is the login path.
    pub fn is_login_path(&self, path: &str) -> bool {
        path == self.login_path
    }
}

/// Segment-aware prefix match: `/tasks` matches `/tasks` and `/tasks/1`, not `/tasksx`.
pub(crate) fn has_path_prefix(path: &str, prefix: &str) -> bool {
    let Some(rest) = path.strip_prefix(prefix) else {
        return false;
    };
    rest.is_empty() || prefix.ends_with('/') || rest.starts_with('/')
}
