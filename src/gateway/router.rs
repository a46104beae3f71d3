//! Gateway router

use std::sync::Arc;

use axum::{Json, Router, middleware, routing::get};
use serde_json::{Value, json};

use super::{GatewayState, proxy_handler, user_auth};

/// Create the gateway router: local `/health`, everything else proxied.
pub fn create_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .fallback(proxy_handler)
        .layer(middleware::from_fn_with_state(Arc::clone(&state), user_auth))
        .with_state(state)
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
