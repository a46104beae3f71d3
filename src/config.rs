//! Configuration management

use std::{env, fmt, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use trust_core::{
    RobotSigningKeys, RobotVerifyingKey, TokenCodec, UserSigningKeys, UserVerifyingKey,
};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    /// Variables are set into the process environment for `${VAR}` resolution.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Token issuer names and clock tolerance
    pub tokens: TokensConfig,
    /// PEM key paths per trust domain
    pub keys: KeysConfig,
    /// Gateway role
    pub gateway: GatewayConfig,
    /// Authorization service role
    pub authorization: AuthorizationConfig,
}

/// The process roles a single binary can run as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Edge gateway: validates user tokens, mints robot tokens.
    Gateway,
    /// Authorization service: verifies credentials, mints user tokens.
    Authorization,
    /// Any other internal service: verifies robot tokens only.
    Service,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gateway => "gateway",
            Self::Authorization => "authorization",
            Self::Service => "service",
        })
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (EDGE_TRUST_ prefix)
        figment = figment.merge(Env::prefixed("EDGE_TRUST_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before env var expansion)
        config.load_env_files();
        config.expand_env_vars()?;

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = expand_home(path_str);
            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                    Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in key paths and upstream URLs
    fn expand_env_vars(&mut self) -> Result<()> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Internal(e.to_string()))?;

        for path in self.keys.paths_mut() {
            *path = expand_home(&Self::expand_string(&re, path));
        }

        for route in &mut self.gateway.routes {
            route.upstream = Self::expand_string(&re, &route.upstream);
        }

        for user in &mut self.authorization.users {
            user.password = Self::expand_string(&re, &user.password);
        }

        Ok(())
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }

    /// Check that everything `role` needs is configured.
    ///
    /// | Role | Needs |
    /// |------|-------|
    /// | gateway | robot private + public key, user public key, at least one route |
    /// | authorization | robot public key, user private + public key |
    /// | service | robot public key |
    pub fn validate_for(&self, role: Role) -> Result<()> {
        let mut missing = Vec::new();
        let keys = &self.keys;

        let needed: &[(&str, &Option<String>)] = match role {
            Role::Gateway => &[
                ("keys.robot_private_key", &keys.robot_private_key),
                ("keys.robot_public_key", &keys.robot_public_key),
                ("keys.user_public_key", &keys.user_public_key),
            ],
            Role::Authorization => &[
                ("keys.robot_public_key", &keys.robot_public_key),
                ("keys.user_private_key", &keys.user_private_key),
                ("keys.user_public_key", &keys.user_public_key),
            ],
            Role::Service => &[("keys.robot_public_key", &keys.robot_public_key)],
        };
        for (name, value) in needed {
            if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
                missing.push(*name);
            }
        }
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "{role} requires {}",
                missing.join(", ")
            )));
        }

        if self.tokens.robot_issuer.trim().is_empty() || self.tokens.user_issuer.trim().is_empty() {
            return Err(Error::Config("token issuer names must not be empty".to_string()));
        }

        match role {
            Role::Gateway => self.gateway.validate(),
            Role::Authorization => self.authorization.validate(),
            Role::Service => Ok(()),
        }
    }

    /// Token codec with the configured clock-skew leeway.
    pub fn codec(&self) -> TokenCodec {
        TokenCodec::with_leeway(self.tokens.clock_skew_leeway)
    }
}

fn expand_home(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.display().to_string(), 1);
        }
    }
    path.to_string()
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Upstream request timeout (gateway)
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Issuer names and clock tolerance shared by every role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokensConfig {
    /// `iss` of robot tokens (the gateway's name)
    pub robot_issuer: String,
    /// `iss` of user tokens (the authorization service's published name)
    pub user_issuer: String,
    /// Clock skew tolerated on `exp`/`iat` checks
    #[serde(with = "humantime_serde")]
    pub clock_skew_leeway: Duration,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            robot_issuer: "gateway".to_string(),
            user_issuer: "auth-service".to_string(),
            clock_skew_leeway: Duration::ZERO,
        }
    }
}

/// PEM key paths. Each role loads only the halves it is entitled to.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KeysConfig {
    /// Robot private key (gateway only)
    pub robot_private_key: Option<String>,
    /// Robot public key (gateway and every internal service)
    pub robot_public_key: Option<String>,
    /// User private key (authorization service only)
    pub user_private_key: Option<String>,
    /// User public key (gateway and authorization service)
    pub user_public_key: Option<String>,
}

impl KeysConfig {
    fn paths_mut(&mut self) -> impl Iterator<Item = &mut String> {
        [
            &mut self.robot_private_key,
            &mut self.robot_public_key,
            &mut self.user_private_key,
            &mut self.user_public_key,
        ]
        .into_iter()
        .filter_map(Option::as_mut)
    }

    /// Load the robot key pair.
    pub fn robot_signing_keys(&self) -> Result<RobotSigningKeys> {
        let private = required(self.robot_private_key.as_ref(), "keys.robot_private_key")?;
        let public = required(self.robot_public_key.as_ref(), "keys.robot_public_key")?;
        Ok(RobotSigningKeys::from_pem_files(private, public)?)
    }

    /// Load the robot public key.
    pub fn robot_verifying_key(&self) -> Result<RobotVerifyingKey> {
        let public = required(self.robot_public_key.as_ref(), "keys.robot_public_key")?;
        Ok(RobotVerifyingKey::from_pem_file(public)?)
    }

    /// Load the user key pair.
    pub fn user_signing_keys(&self) -> Result<UserSigningKeys> {
        let private = required(self.user_private_key.as_ref(), "keys.user_private_key")?;
        let public = required(self.user_public_key.as_ref(), "keys.user_public_key")?;
        Ok(UserSigningKeys::from_pem_files(private, public)?)
    }

    /// Load the user public key.
    pub fn user_verifying_key(&self) -> Result<UserVerifyingKey> {
        let public = required(self.user_public_key.as_ref(), "keys.user_public_key")?;
        Ok(UserVerifyingKey::from_pem_file(public)?)
    }
}

fn required<'a>(value: Option<&'a String>, name: &str) -> Result<&'a str> {
    value
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::Config(format!("{name} is not set")))
}

/// Gateway role configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Path on which `Authorization: Basic` is relayed as `X-Basic-Authorization`
    pub login_path: String,
    /// Path prefixes that may be reached without a user token
    pub public_paths: Vec<String>,
    /// Upstream routes, matched by longest prefix
    pub routes: Vec<RouteConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            login_path: "/auth/login".to_string(),
            public_paths: default_public_paths(),
            routes: Vec::new(),
        }
    }
}

fn default_public_paths() -> Vec<String> {
    vec!["/health".to_string()]
}

impl GatewayConfig {
    fn validate(&self) -> Result<()> {
        if !self.login_path.starts_with('/') {
            return Err(Error::Config("gateway.login_path must start with '/'".to_string()));
        }
        if self.routes.is_empty() {
            return Err(Error::Config("gateway.routes must not be empty".to_string()));
        }
        for route in &self.routes {
            if !route.prefix.starts_with('/') {
                return Err(Error::Config(format!(
                    "route prefix '{}' must start with '/'",
                    route.prefix
                )));
            }
            url::Url::parse(&route.upstream).map_err(|e| {
                Error::Config(format!("route '{}' upstream is invalid: {e}", route.prefix))
            })?;
        }
        Ok(())
    }
}

/// One upstream route at the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Path prefix (e.g. `/auth`, `/tasks`)
    pub prefix: String,
    /// Upstream base URL (e.g. `http://auth-service:8081`)
    pub upstream: String,
    /// Roles of which the user must hold at least one (empty = any routed request)
    #[serde(default)]
    pub required_roles: Vec<String>,
}

/// Authorization service role configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// Path of the login endpoint
    pub login_path: String,
    /// Local credential store
    pub users: Vec<UserConfig>,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            login_path: "/auth/login".to_string(),
            users: Vec::new(),
        }
    }
}

impl AuthorizationConfig {
    fn validate(&self) -> Result<()> {
        if !self.login_path.starts_with('/') {
            return Err(Error::Config(
                "authorization.login_path must start with '/'".to_string(),
            ));
        }
        if let Some(user) = self.users.iter().find(|u| u.username.contains(':')) {
            return Err(Error::Config(format!(
                "username '{}' must not contain ':'",
                user.username
            )));
        }
        Ok(())
    }
}

/// A user in the local credential store
#[derive(Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Login name (becomes the user token subject)
    pub username: String,
    /// `sha256:<hex>` digest, or a plain value for development
    pub password: String,
    /// Role names, `ROLE_` prefix optional
    #[serde(default)]
    pub roles: Vec<String>,
}

impl fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("roles", &self.roles)
            .finish()
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        // "ms" before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else {
            // Assume seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}
