//! Server assembly and lifecycle.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tether_kernel::error::{KernelError, KernelResult};
use tether_kernel::TetherKernel;
use tether_types::error::TetherError;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::routes::{self, AppState};
use crate::ws;

/// Build the router with every route wired to `kernel`.
pub fn build_router(kernel: Arc<TetherKernel>) -> Router {
    let state = Arc::new(AppState { kernel });

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/mcp", post(routes::mcp_http))
        .route("/api/status", get(routes::status))
        .route("/api/health", get(routes::health))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Serve on an already-bound listener until `shutdown` resolves.
///
/// Pending bridge requests are drained as soon as the shutdown signal
/// fires, so in-flight tool calls finish with `disconnected` instead of
/// holding the server open until they time out.
pub async fn serve<F>(
    listener: TcpListener,
    kernel: Arc<TetherKernel>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    let app = build_router(Arc::clone(&kernel));

    info!("Tether bridge listening on http://{addr} (peers: ws://{addr}/ws)");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.await;
        info!("Shutdown signal received");
        kernel.shutdown();
    })
    .await
}

/// Bind the configured listen address and serve.
pub async fn run_server<F>(kernel: Arc<TetherKernel>, shutdown: F) -> KernelResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = kernel.listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| KernelError::BootFailed(format!("cannot bind {addr}: {e}")))?;
    serve(listener, kernel, shutdown)
        .await
        .map_err(TetherError::from)?;
    Ok(())
}
