//! HTTP and WebSocket surface: a thin adapter over the runtime.

mod router;
mod state;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{extract::Request, ServiceExt};
use tokio::net::TcpListener;
use tower::Layer;
use tower_http::normalize_path::NormalizePathLayer;
use tracing::info;

use crate::runtime::AgentRuntime;

pub use router::build_router;
pub use state::ServeState;

/// Bind the API to loopback and serve until the process exits.
pub async fn serve(runtime: Arc<AgentRuntime>, port: u16) -> anyhow::Result<()> {
    let router = build_router(ServeState::new(runtime));
    // Trailing slashes are stripped before routing so `/tasks/` hits `/tasks`.
    let app = NormalizePathLayer::trim_trailing_slash().layer(router);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let local = listener.local_addr().context("resolving bound address")?;
    info!(target: "server", %local, "webpilot listening");

    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .await
        .context("server exited with error")
}
