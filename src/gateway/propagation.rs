//! Identity propagation onto the outbound request.

use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use trust_core::{IdentityHeaders, RobotTokenIssuer, X_USER, X_USER_ROLES};

use super::UserAuthentication;
use crate::error::AuthError;

/// Writes identity headers and a fresh robot token on every forwarded request.
pub struct IdentityPropagationFilter {
    issuer: RobotTokenIssuer,
}

impl IdentityPropagationFilter {
    /// Filter minting robot tokens with `issuer`.
    pub fn new(issuer: RobotTokenIssuer) -> Self {
        Self { issuer }
    }

    /// Rewrite `outbound` for one hop.
    ///
    /// `X-User` / `X-User-Roles` are removed, then written again only from a
    /// validated user token, so they are either gateway-derived or absent.
    /// `Authorization` is always replaced by a new robot bearer token.
    pub fn apply(&self, auth: &UserAuthentication, outbound: &mut HeaderMap) -> Result<IdentityHeaders, AuthError> {
        let user_header = HeaderName::from_static(X_USER);
        let roles_header = HeaderName::from_static(X_USER_ROLES);
        outbound.remove(&user_header);
        outbound.remove(&roles_header);

        let identity = IdentityHeaders::from_claims(auth.claims());
        if let Some(ref user) = identity.user {
            outbound.insert(user_header, header_value(user)?);
        }
        if let Some(ref roles) = identity.roles {
            outbound.insert(roles_header, header_value(roles)?);
        }

        let token = self.issuer.issue()?;
        outbound.insert(header::AUTHORIZATION, header_value(&token.bearer_header())?);

        Ok(identity)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, AuthError> {
    HeaderValue::from_str(value)
        .map_err(|_| AuthError::Internal("identity value is not a valid header".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use trust_core::testutil::robot_keys;
    use trust_core::{ClaimTemplate, RobotTokenValidator, TokenCodec, unix_now};

    fn filter() -> IdentityPropagationFilter {
        IdentityPropagationFilter::new(RobotTokenIssuer::new(robot_keys(), "gateway", TokenCodec::new()))
    }

    fn robot_validator() -> RobotTokenValidator {
        RobotTokenValidator::new(robot_keys().verifying_key().clone(), "gateway", TokenCodec::new())
    }

    fn outbound_bearer(headers: &HeaderMap) -> &str {
        headers
            .get(header::AUTHORIZATION)
            .unwrap()
            .to_str()
            .unwrap()
            .strip_prefix("Bearer ")
            .unwrap()
    }

    #[test]
    fn validated_user_is_propagated() {
        // GIVEN: a validated user token for alice with ROLE_ADMIN
        let claims = ClaimTemplate::user(
            "auth-service",
            "alice@x.com",
            vec!["ROLE_ADMIN".to_string(), "ROLE_USER".to_string()],
        )
        .stamp(unix_now());
        let mut outbound = HeaderMap::new();
        outbound.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer user-token"));

        // WHEN: the filter runs
        filter()
            .apply(&UserAuthentication::Valid(claims), &mut outbound)
            .unwrap();

        // THEN: identity headers are set and the user token is gone
        assert_eq!(outbound.get(X_USER).unwrap(), "alice@x.com");
        assert_eq!(outbound.get(X_USER_ROLES).unwrap(), "ROLE_ADMIN,ROLE_USER");
        let robot = robot_validator().validate(outbound_bearer(&outbound)).unwrap();
        assert_eq!(robot.sub, "robot");
        assert_eq!(robot.exp - robot.iat, 60);
    }

    #[test]
    fn anonymous_request_gets_robot_token_only() {
        let mut outbound = HeaderMap::new();
        let identity = filter().apply(&UserAuthentication::Skipped, &mut outbound).unwrap();

        assert!(identity.is_cleared());
        assert!(outbound.get(X_USER).is_none());
        assert!(outbound.get(X_USER_ROLES).is_none());
        assert!(robot_validator().validate(outbound_bearer(&outbound)).is_ok());
    }

    #[test]
    fn client_supplied_identity_is_replaced() {
        let mut outbound = HeaderMap::new();
        outbound.insert(X_USER, HeaderValue::from_static("mallory@x.com"));
        outbound.insert(X_USER_ROLES, HeaderValue::from_static("ROLE_ADMIN"));

        filter().apply(&UserAuthentication::Skipped, &mut outbound).unwrap();

        assert!(outbound.get(X_USER).is_none());
        assert!(outbound.get(X_USER_ROLES).is_none());
    }

    #[test]
    fn user_without_roles_has_no_roles_header() {
        let claims = ClaimTemplate::user("auth-service", "bob", Vec::new()).stamp(unix_now());
        let mut outbound = HeaderMap::new();

        filter().apply(&UserAuthentication::Valid(claims), &mut outbound).unwrap();

        assert_eq!(outbound.get(X_USER).unwrap(), "bob");
        assert!(outbound.get(X_USER_ROLES).is_none());
    }

    #[test]
    fn every_hop_gets_a_distinct_token() {
        let filter = filter();
        let mut first = HeaderMap::new();
        let mut second = HeaderMap::new();
        filter.apply(&UserAuthentication::Skipped, &mut first).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        filter.apply(&UserAuthentication::Skipped, &mut second).unwrap();

        assert_ne!(outbound_bearer(&first), outbound_bearer(&second));
    }
}
