//! Upstream routing and forwarding.

use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    extract::State,
    http::{HeaderMap, HeaderName, Request, header},
    response::Response,
};
use tracing::{debug, warn};
use trust_core::{X_BASIC_AUTHORIZATION, X_USER, X_USER_ROLES, normalize_role};
use url::Url;

use super::{GatewayState, UserAuthentication, has_path_prefix, login_relay};
use crate::config::RouteConfig;
use crate::error::{AuthError, Error};

/// Hop-by-hop headers (RFC 9110 section 7.6.1), never forwarded in either direction.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// One upstream route.
#[derive(Debug, Clone)]
pub struct Route {
    /// Path prefix this route serves
    pub prefix: String,
    /// Upstream base URL, without trailing slash
    pub upstream: String,
    /// Roles (with `ROLE_` prefix) of which the user must hold at least one
    pub required_roles: Vec<String>,
}

impl Route {
    /// Whether a user holding `roles` may use this route.
    pub fn permits(&self, roles: &[String]) -> bool {
        self.required_roles.is_empty() || self.required_roles.iter().any(|r| roles.contains(r))
    }

    /// Upstream URL for an inbound path and query. The path is forwarded as is.
    pub fn target(&self, path_and_query: &str) -> String {
        format!("{}{path_and_query}", self.upstream)
    }
}

/// Routes ordered by descending prefix length.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build the table, rejecting unparsable upstream URLs.
    pub fn new(configs: &[RouteConfig]) -> crate::Result<Self> {
        let mut routes = configs
            .iter()
            .map(|config| -> crate::Result<Route> {
                Url::parse(&config.upstream).map_err(|e| {
                    Error::Config(format!("route '{}' upstream is invalid: {e}", config.prefix))
                })?;
                Ok(Route {
                    prefix: config.prefix.clone(),
                    upstream: config.upstream.trim_end_matches('/').to_string(),
                    required_roles: config
                        .required_roles
                        .iter()
                        .map(|role| normalize_role(role))
                        .collect(),
                })
            })
            .collect::<crate::Result<Vec<_>>>()?;
        routes.sort_by_key(|route| std::cmp::Reverse(route.prefix.len()));
        Ok(Self { routes })
    }

    /// Longest-prefix match for `path`.
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|route| has_path_prefix(path, &route.prefix))
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Headers named in `Connection`, which are hop-by-hop for this message only.
fn connection_tokens(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect()
}

/// End-to-end headers of `headers`, minus those the gateway owns on the way out.
fn forwardable_request_headers(headers: &HeaderMap) -> HeaderMap {
    let dropped = connection_tokens(headers);
    let owned = [
        header::HOST,
        header::CONTENT_LENGTH,
        header::AUTHORIZATION,
        HeaderName::from_static(X_USER),
        HeaderName::from_static(X_USER_ROLES),
        HeaderName::from_static(X_BASIC_AUTHORIZATION),
    ];
    filter_headers(headers, |name| !owned.contains(name) && !dropped.contains(name))
}

fn forwardable_response_headers(headers: &HeaderMap) -> HeaderMap {
    let dropped = connection_tokens(headers);
    filter_headers(headers, |name| {
        *name != header::CONTENT_LENGTH && !dropped.contains(name)
    })
}

fn filter_headers(headers: &HeaderMap, keep: impl Fn(&HeaderName) -> bool) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop(name) && keep(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Fallback handler: forward the request to the matching upstream.
pub async fn proxy_handler(
    State(state): State<Arc<GatewayState>>,
    request: Request<Body>,
) -> Result<Response, AuthError> {
    let path = request.uri().path().to_string();
    let route = state.routes.resolve(&path).ok_or(AuthError::NoRoute)?;
    let target = route.target(
        request
            .uri()
            .path_and_query()
            .map_or(path.as_str(), |pq| pq.as_str()),
    );

    let (parts, body) = request.into_parts();
    let auth = parts
        .extensions
        .get::<UserAuthentication>()
        .cloned()
        .unwrap_or(UserAuthentication::Skipped);

    let mut outbound = forwardable_request_headers(&parts.headers);
    let relayed = login_relay::relay_basic(&path, &state.login_path, &parts.headers, &mut outbound);
    let identity = state.propagation.apply(&auth, &mut outbound)?;

    let body = to_bytes(body, state.max_body_size)
        .await
        .map_err(|_| AuthError::PayloadTooLarge)?;

    debug!(
        method = %parts.method,
        path = %path,
        upstream = %route.upstream,
        user = ?identity.user,
        relayed_login = relayed,
        "Forwarding request"
    );

    let upstream = state
        .client
        .request(parts.method, &target)
        .headers(outbound)
        .body(body)
        .send()
        .await
        .map_err(|e| {
            warn!(upstream = %route.upstream, error = %e, "Upstream request failed");
            AuthError::UpstreamUnavailable
        })?;

    let status = upstream.status();
    let headers = forwardable_response_headers(upstream.headers());
    let bytes = upstream.bytes().await.map_err(|e| {
        warn!(upstream = %route.upstream, error = %e, "Upstream response body failed");
        AuthError::UpstreamUnavailable
    })?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
