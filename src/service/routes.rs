//! Routes of the generic internal service.
//!
//! | Method | Path | Needs |
//! |--------|------|-------|
//! | `GET` | `/health` | robot token |
//! | `GET` | `/whoami` | robot token |
//! | `GET` | `/admin/ping` | robot token + `ROLE_ADMIN` |

use std::sync::Arc;

use axum::{Json, Router, middleware, routing::get};
use serde_json::{Value, json};
use trust_core::AuthenticatedPrincipal;

use super::{Principal, RequireUser, RequiredAuthority, RobotGate, require_authority, robot_trust};

/// Authority guarding `/admin/*`.
pub const ADMIN_AUTHORITY: &str = "ROLE_ADMIN";

/// Create the internal service router, every route behind the robot gate.
pub fn create_router(gate: Arc<RobotGate>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/whoami", get(whoami_handler))
        .route(
            "/admin/ping",
            get(admin_ping_handler).route_layer(middleware::from_fn_with_state(
                RequiredAuthority::new(ADMIN_AUTHORITY),
                require_authority,
            )),
        )
        .layer(middleware::from_fn_with_state(gate, robot_trust))
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn whoami_handler(Principal(principal): Principal) -> Json<AuthenticatedPrincipal> {
    Json(principal)
}

async fn admin_ping_handler(user: RequireUser) -> Json<Value> {
    Json(json!({ "pong": true, "subject": user.subject }))
}
