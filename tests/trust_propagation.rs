//! End-to-end trust propagation: client -> gateway -> internal services.
//!
//! Upstreams run on loopback listeners bound to port 0; the gateway itself is
//! driven with `oneshot`, so its proxy makes real HTTP calls.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower::ServiceExt;

use edge_trust::authorization::{self, AuthState, InMemoryCredentialStore, hash_password};
use edge_trust::config::{GatewayConfig, RouteConfig, ServerConfig, UserConfig};
use edge_trust::gateway::{self, GatewayState};
use edge_trust::server::with_common_layers;
use edge_trust::service::{self, RobotGate};
use trust_core::testutil::{robot_keys, user_keys};
use trust_core::{
    RobotTokenIssuer, RobotTokenValidator, TokenCodec, UserTokenIssuer, UserTokenValidator, unix_now,
};

// ============================================================================
// Fixtures
// ============================================================================

async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Upstream that reports what it received.
async fn echo(request: Request<Body>) -> Json<Value> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, 1024 * 1024).await.unwrap_or_default();
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "method": parts.method.as_str(),
        "uri": parts.uri.to_string(),
        "authorization": header("authorization"),
        "x-user": header("x-user"),
        "x-user-roles": header("x-user-roles"),
        "x-basic-authorization": header("x-basic-authorization"),
        "x-request-id": header("x-request-id"),
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn spawn_echo() -> SocketAddr {
    spawn(Router::new().fallback(echo)).await
}

fn robot_gate() -> Arc<RobotGate> {
    Arc::new(RobotGate::new(
        robot_keys().verifying_key().clone(),
        "gateway",
        TokenCodec::new(),
    ))
}

async fn spawn_service() -> SocketAddr {
    spawn(service::create_router(robot_gate())).await
}

async fn spawn_auth_service() -> SocketAddr {
    let state = AuthState {
        store: Arc::new(InMemoryCredentialStore::from_config(&[UserConfig {
            username: "bob".to_string(),
            password: hash_password("secret"),
            roles: vec!["USER".to_string()],
        }])),
        issuer: UserTokenIssuer::new(user_keys(), "auth-service", TokenCodec::new()),
    };
    spawn(authorization::create_router(
        Arc::new(state),
        robot_gate(),
        "/auth/login",
    ))
    .await
}

fn route(prefix: &str, addr: SocketAddr, roles: &[&str]) -> RouteConfig {
    RouteConfig {
        prefix: prefix.to_string(),
        upstream: format!("http://{addr}"),
        required_roles: roles.iter().map(ToString::to_string).collect(),
    }
}

fn gateway(routes: Vec<RouteConfig>) -> Router {
    gateway_with_public(routes, &["/health", "/public"])
}

fn gateway_with_public(routes: Vec<RouteConfig>, public_paths: &[&str]) -> Router {
    let config = GatewayConfig {
        login_path: "/auth/login".to_string(),
        public_paths: public_paths.iter().map(ToString::to_string).collect(),
        routes,
    };
    let server = ServerConfig::default();
    let state = GatewayState::new(
        UserTokenValidator::new(
            user_keys().verifying_key().clone(),
            "auth-service",
            TokenCodec::new(),
        ),
        RobotTokenIssuer::new(robot_keys(), "gateway", TokenCodec::new()),
        &config,
        &server,
    )
    .unwrap();
    with_common_layers(gateway::create_router(Arc::new(state)), server.max_body_size)
}

fn user_bearer(subject: &str, roles: &[&str]) -> String {
    UserTokenIssuer::new(user_keys(), "auth-service", TokenCodec::new())
        .issue(subject, roles)
        .unwrap()
        .bearer_header()
}

fn robot_bearer() -> String {
    RobotTokenIssuer::new(robot_keys(), "gateway", TokenCodec::new())
        .issue()
        .unwrap()
        .bearer_header()
}

fn robot_validator() -> RobotTokenValidator {
    RobotTokenValidator::new(
        robot_keys().verifying_key().clone(),
        "gateway",
        TokenCodec::new(),
    )
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn forwarded_robot_token(echoed: &Value) -> String {
    echoed["authorization"]
        .as_str()
        .unwrap()
        .strip_prefix("Bearer ")
        .unwrap()
        .to_string()
}

// ============================================================================
// Gateway -> upstream
// ============================================================================

#[tokio::test]
async fn forwarded_authenticated_call_carries_identity_and_robot_token() {
    // GIVEN: a gateway routing /tasks to an echo upstream
    let echo = spawn_echo().await;
    let app = gateway(vec![route("/tasks", echo, &[])]);
    let user_token = user_bearer("alice@x.com", &["ROLE_ADMIN"]);

    // WHEN: alice calls through the gateway
    let request = Request::get("/tasks/42?verbose=1")
        .header("authorization", &user_token)
        .body(Body::empty())
        .unwrap();
    let (status, echoed) = send(app, request).await;

    // THEN: the upstream sees gateway-written identity and a fresh robot token
    assert_eq!(status, StatusCode::OK);
    assert_eq!(echoed["uri"], "/tasks/42?verbose=1");
    assert_eq!(echoed["x-user"], "alice@x.com");
    assert_eq!(echoed["x-user-roles"], "ROLE_ADMIN");
    assert_ne!(echoed["authorization"], json!(user_token));

    let robot = robot_validator().validate(&forwarded_robot_token(&echoed)).unwrap();
    assert_eq!(robot.sub, "robot");
    assert_eq!(robot.iss, "gateway");
    assert!(robot.exp <= unix_now() + 60);
}

#[tokio::test]
async fn anonymous_public_call_has_robot_token_but_no_identity() {
    let echo = spawn_echo().await;
    let app = gateway(vec![route("/", echo, &[])]);

    let request = Request::get("/public/catalog").body(Body::empty()).unwrap();
    let (status, echoed) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(echoed["x-user"], Value::Null);
    assert_eq!(echoed["x-user-roles"], Value::Null);
    assert!(robot_validator().validate(&forwarded_robot_token(&echoed)).is_ok());
}

#[tokio::test]
async fn client_supplied_identity_headers_never_reach_upstream() {
    // GIVEN: an anonymous client trying to assert an identity
    let echo = spawn_echo().await;
    let app = gateway(vec![route("/", echo, &[])]);
    let request = Request::get("/public/catalog")
        .header("x-user", "mallory@x.com")
        .header("x-user-roles", "ROLE_ADMIN")
        .header("x-basic-authorization", "bWFsbG9yeTp4")
        .body(Body::empty())
        .unwrap();

    // WHEN: the request is forwarded
    let (_, echoed) = send(app, request).await;

    // THEN: none of the client's values survive
    assert_eq!(echoed["x-user"], Value::Null);
    assert_eq!(echoed["x-user-roles"], Value::Null);
    assert_eq!(echoed["x-basic-authorization"], Value::Null);
}

#[tokio::test]
async fn authenticated_user_cannot_override_identity() {
    let echo = spawn_echo().await;
    let app = gateway(vec![route("/tasks", echo, &[])]);
    let request = Request::get("/tasks")
        .header("authorization", user_bearer("alice@x.com", &["USER"]))
        .header("x-user", "root@x.com")
        .header("x-user-roles", "ROLE_ADMIN")
        .body(Body::empty())
        .unwrap();

    let (_, echoed) = send(app, request).await;

    assert_eq!(echoed["x-user"], "alice@x.com");
    assert_eq!(echoed["x-user-roles"], "ROLE_USER");
}

#[tokio::test]
async fn body_method_and_request_id_are_forwarded() {
    let echo = spawn_echo().await;
    let app = gateway(vec![route("/tasks", echo, &[])]);
    let request = Request::post("/tasks")
        .header("authorization", user_bearer("alice@x.com", &[]))
        .header("content-type", "application/json")
        .header("x-request-id", "req-123")
        .body(Body::from(r#"{"title":"write tests"}"#))
        .unwrap();

    let (status, echoed) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(echoed["method"], "POST");
    assert_eq!(echoed["body"], r#"{"title":"write tests"}"#);
    assert_eq!(echoed["x-request-id"], "req-123");
}

#[tokio::test]
async fn protected_path_without_user_token_never_reaches_upstream() {
    let echo = spawn_echo().await;
    let app = gateway(vec![route("/tasks", echo, &[])]);

    let (status, body) = send(app, Request::get("/tasks").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "message": "authentication required" }));
}

// ============================================================================
// Gateway -> real internal service
// ============================================================================

#[tokio::test]
async fn internal_service_sees_gateway_identity() {
    let service = spawn_service().await;
    let app = gateway(vec![route("/", service, &[])]);

    let request = Request::get("/whoami")
        .header("authorization", user_bearer("alice@x.com", &["ADMIN", "USER"]))
        .body(Body::empty())
        .unwrap();
    let (status, principal) = send(app.clone(), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(principal["subject"], "alice@x.com");
    assert_eq!(principal["authorities"], json!(["ROLE_ADMIN", "ROLE_USER"]));
    assert_eq!(principal["authenticated"], true);

    let admin = Request::get("/admin/ping")
        .header("authorization", user_bearer("alice@x.com", &["ADMIN"]))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app.clone(), admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "pong": true, "subject": "alice@x.com" }));

    let not_admin = Request::get("/admin/ping")
        .header("authorization", user_bearer("bob", &["USER"]))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app, not_admin).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn anonymous_relayed_call_is_admitted_without_identity() {
    // GIVEN: /whoami made public at the gateway
    let service = spawn_service().await;
    let app = gateway_with_public(vec![route("/", service, &[])], &["/whoami"]);

    // WHEN: it is called without a user token
    let request = Request::get("/whoami").body(Body::empty()).unwrap();
    let (status, principal) = send(app, request).await;

    // THEN: the robot gate admits it as an anonymous principal
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        principal,
        json!({ "subject": null, "authorities": [], "authenticated": true })
    );
}

// ============================================================================
// Login handshake
// ============================================================================

#[tokio::test]
async fn login_handshake_mints_user_token_for_bob() {
    // GIVEN: the gateway in front of the authorization service
    let auth = spawn_auth_service().await;
    let app = gateway(vec![route("/auth", auth, &[])]);

    // WHEN: bob logs in with Basic credentials (base64 "bob:secret")
    let request = Request::post("/auth/login")
        .header("authorization", "Basic Ym9iOnNlY3JldA==")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, request).await;

    // THEN: a one-hour user token with sub "bob" comes back
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
    let claims = UserTokenValidator::new(
        user_keys().verifying_key().clone(),
        "auth-service",
        TokenCodec::new(),
    )
    .validate(body["access_token"].as_str().unwrap())
    .unwrap();
    assert_eq!(claims.sub, "bob");
    assert_eq!(claims.roles(), ["ROLE_USER".to_string()]);
}

#[tokio::test]
async fn login_relays_raw_basic_payload() {
    let echo = spawn_echo().await;
    let app = gateway(vec![route("/auth", echo, &[])]);

    let request = Request::post("/auth/login")
        .header("authorization", "Basic Ym9iOnNlY3JldA==")
        .body(Body::empty())
        .unwrap();
    let (_, echoed) = send(app, request).await;

    assert_eq!(echoed["x-basic-authorization"], "Ym9iOnNlY3JldA==");
    assert!(robot_validator().validate(&forwarded_robot_token(&echoed)).is_ok());
}

#[tokio::test]
async fn login_with_wrong_password_fails_closed() {
    let auth = spawn_auth_service().await;
    let app = gateway(vec![route("/auth", auth, &[])]);

    // base64("bob:wrong")
    let request = Request::post("/auth/login")
        .header("authorization", "Basic Ym9iOndyb25n")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "message": "invalid username or password" }));
}

#[tokio::test]
async fn login_token_works_for_the_next_call() {
    let auth = spawn_auth_service().await;
    let service = spawn_service().await;
    let app = gateway(vec![route("/auth", auth, &[]), route("/", service, &[])]);

    let login = Request::post("/auth/login")
        .header("authorization", "Basic Ym9iOnNlY3JldA==")
        .body(Body::empty())
        .unwrap();
    let (_, body) = send(app.clone(), login).await;
    let token = body["access_token"].as_str().unwrap();

    let whoami = Request::get("/whoami")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, principal) = send(app, whoami).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(principal["subject"], "bob");
    assert_eq!(principal["authorities"], json!(["ROLE_USER"]));
}

// ============================================================================
// Internal service trust boundary
// ============================================================================

#[tokio::test]
async fn identity_headers_without_valid_robot_token_are_rejected() {
    let app = service::create_router(robot_gate());
    let stale = RobotTokenIssuer::new(robot_keys(), "gateway", TokenCodec::new())
        .issue_at(unix_now() - 120)
        .unwrap();

    for authorization in [
        None,
        Some(stale.bearer_header()),
        Some("Bearer not-a-jwt".to_string()),
        Some(user_bearer("alice@x.com", &["ADMIN"])),
    ] {
        let mut builder = Request::get("/whoami")
            .header("x-user", "alice@x.com")
            .header("x-user-roles", "ROLE_ADMIN");
        if let Some(ref value) = authorization {
            builder = builder.header("authorization", value);
        }
        let (status, body) = send(app.clone(), builder.body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{authorization:?}");
        assert!(body.get("subject").is_none());
    }
}

#[tokio::test]
async fn missing_and_blank_user_header_are_equivalent() {
    let app = service::create_router(robot_gate());

    let absent = Request::get("/whoami")
        .header("authorization", robot_bearer())
        .body(Body::empty())
        .unwrap();
    let blank = Request::get("/whoami")
        .header("authorization", robot_bearer())
        .header("x-user", "")
        .header("x-user-roles", "")
        .body(Body::empty())
        .unwrap();

    let (_, absent) = send(app.clone(), absent).await;
    let (_, blank) = send(app, blank).await;

    assert_eq!(absent, blank);
    assert_eq!(absent["subject"], Value::Null);
    assert_eq!(absent["authorities"], json!([]));
}

/// Accepted risk: identity headers are unsigned. Anything holding a valid
/// robot token can assert any identity, and the service cannot tell it apart
/// from a gateway-written header. Network isolation is the control.
#[tokio::test]
async fn tampered_role_header_is_indistinguishable_from_gateway() {
    let app = service::create_router(robot_gate());
    let request = Request::get("/admin/ping")
        .header("authorization", robot_bearer())
        .header("x-user", "mallory@x.com")
        .header("x-user-roles", "ROLE_ADMIN")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "pong": true, "subject": "mallory@x.com" }));
}
