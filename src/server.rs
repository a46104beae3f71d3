//! Listener, shared layers and graceful shutdown for every role.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::{Role, ServerConfig};
use crate::{Error, Result};

/// Wrap a role's router in the layers every role shares.
///
/// Outermost first: request id (`x-request-id`, generated when absent), trace
/// span, request id echoed on the response, panic to 500, body limit.
pub fn with_common_layers(router: Router, max_body_size: usize) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(CatchPanicLayer::new())
            .layer(DefaultBodyLimit::max(max_body_size)),
    )
}

/// Bind and serve `app` until Ctrl+C / SIGTERM.
pub async fn serve(app: Router, server: &ServerConfig, role: Role) -> Result<()> {
    let addr = SocketAddr::new(
        server
            .host
            .parse()
            .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
        server.port,
    );

    let listener = TcpListener::bind(addr).await?;

    info!("============================================================");
    info!("EDGE-TRUST v{} ({role})", env!("CARGO_PKG_VERSION"));
    info!("============================================================");
    info!(host = %server.host, port = %server.port, "Listening");

    let shutdown_timeout = server.shutdown_timeout;
    let (drained_tx, drained_rx) = tokio::sync::oneshot::channel::<()>();

    let serving = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = drained_tx.send(());
        })
        .into_future();

    tokio::select! {
        result = serving => result.map_err(|e| Error::Internal(e.to_string()))?,
        () = drain_deadline(drained_rx, shutdown_timeout) => {
            warn!(timeout = ?shutdown_timeout, "Shutdown timeout elapsed, dropping in-flight requests");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Resolves `timeout` after the shutdown signal fired; never resolves before it.
async fn drain_deadline(signalled: tokio::sync::oneshot::Receiver<()>, timeout: Duration) {
    if signalled.await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(timeout).await;
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
