//! HTTP surface: search plus the admin/status interface.
//!
//! The routes translate HTTP calls into manager commands and render the
//! replies; no fleet state lives here. GET-only method routing means any
//! other verb gets 405 without reaching a handler.

mod handlers;
mod types;

pub use types::{CityObject, CommandEnvelope, SearchParams, StatusResponse};

use axum::routing::get;
use axum::{Extension, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::manager::ManagerHandle;

/// Build the service router around a manager handle.
pub fn router(manager: ManagerHandle) -> Router {
    Router::new()
        .route("/search", get(handlers::handle_search))
        .route("/server_status", get(handlers::handle_server_status))
        .route("/server_info", get(handlers::handle_server_info))
        .route("/cmd/:action", get(handlers::handle_cmd))
        .layer(Extension(manager))
}

/// Serve the router until the shutdown token fires.
pub async fn serve(
    listener: TcpListener,
    manager: ManagerHandle,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = router(manager);
    info!(addr = %listener.local_addr()?, "HTTP surface listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
