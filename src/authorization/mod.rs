//! Authorization service: verifies relayed credentials and mints user tokens.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `<login_path>` | Exchange a relayed Basic credential for a user token |
//! | `GET` | `/auth/me` | Header-derived principal (requires `X-User`) |
//! | `GET` | `/health` | Liveness |
//!
//! Reached only through the gateway, so every route, login included, sits
//! behind the robot-token gate.

mod credentials;
mod login;

use std::sync::Arc;

use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use serde_json::{Value, json};
use trust_core::{AuthenticatedPrincipal, UserTokenIssuer};

pub use credentials::{CredentialStore, InMemoryCredentialStore, VerifiedUser, hash_password};
pub use login::{AuthState, LoginCredentials, LoginResponse, login_handler};

use crate::Result;
use crate::config::Config;
use crate::service::{RequireUser, RobotGate, robot_trust};

impl AuthState {
    /// State built from the user key pair, issuer name and users in `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let issuer = UserTokenIssuer::new(
            config.keys.user_signing_keys()?,
            config.tokens.user_issuer.clone(),
            config.codec(),
        );
        let store = InMemoryCredentialStore::from_config(&config.authorization.users);
        if store.is_empty() {
            tracing::warn!("No users configured - every login will fail");
        }
        Ok(Self {
            store: Arc::new(store),
            issuer,
        })
    }
}

/// Create the authorization service router.
pub fn create_router(state: Arc<AuthState>, gate: Arc<RobotGate>, login_path: &str) -> Router {
    Router::new()
        .route(login_path, post(login_handler))
        .route("/auth/me", get(me_handler))
        .route("/health", get(health_handler))
        .layer(middleware::from_fn_with_state(gate, robot_trust))
        .with_state(state)
}

async fn me_handler(user: RequireUser) -> Json<AuthenticatedPrincipal> {
    Json(user.principal)
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserConfig;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;
    use trust_core::testutil::{robot_keys, user_keys};
    use trust_core::{RobotTokenIssuer, TokenCodec, UserTokenValidator};

    fn app() -> Router {
        let state = AuthState {
            store: Arc::new(InMemoryCredentialStore::from_config(&[UserConfig {
                username: "bob".to_string(),
                password: hash_password("secret"),
                roles: vec!["USER".to_string()],
            }])),
            issuer: UserTokenIssuer::new(user_keys(), "auth-service", TokenCodec::new()),
        };
        let gate = RobotGate::new(robot_keys().verifying_key().clone(), "gateway", TokenCodec::new());
        create_router(Arc::new(state), Arc::new(gate), "/auth/login")
    }

    fn robot_bearer() -> String {
        RobotTokenIssuer::new(robot_keys(), "gateway", TokenCodec::new())
            .issue()
            .unwrap()
            .bearer_header()
    }

    async fn call(request: Request<Body>) -> (StatusCode, Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn login_returns_user_token() {
        // GIVEN: a relayed credential and a valid robot token
        let request = Request::post("/auth/login")
            .header("authorization", robot_bearer())
            .header("x-basic-authorization", "Ym9iOnNlY3JldA==")
            .body(Body::empty())
            .unwrap();

        // WHEN: the login endpoint is called
        let (status, body) = call(request).await;

        // THEN: a user token for bob comes back
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["expires_in"], 3600);
        let validator = UserTokenValidator::new(
            user_keys().verifying_key().clone(),
            "auth-service",
            TokenCodec::new(),
        );
        let claims = validator.validate(body["access_token"].as_str().unwrap()).unwrap();
        assert_eq!(claims.sub, "bob");
    }

    #[tokio::test]
    async fn login_without_robot_token_is_401() {
        let request = Request::post("/auth/login")
            .header("x-basic-authorization", "Ym9iOnNlY3JldA==")
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_without_relayed_credential_is_401() {
        let request = Request::post("/auth/login")
            .header("authorization", robot_bearer())
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "message": "authentication required" }));
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_401() {
        // base64("bob:wrong")
        let request = Request::post("/auth/login")
            .header("authorization", robot_bearer())
            .header("x-basic-authorization", "Ym9iOndyb25n")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "message": "invalid username or password" }));
    }

    #[tokio::test]
    async fn me_requires_identity() {
        let anonymous = Request::get("/auth/me")
            .header("authorization", robot_bearer())
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(anonymous).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let identified = Request::get("/auth/me")
            .header("authorization", robot_bearer())
            .header("x-user", "bob")
            .header("x-user-roles", "ROLE_USER")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(identified).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["subject"], "bob");
    }
}
