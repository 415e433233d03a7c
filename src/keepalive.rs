use anyhow::Result;
use axum::{Router, routing::get};

/// Liveness endpoint for hosting platforms that ping the process to keep it
/// (and their health checks) alive.
pub async fn serve(port: u16) -> Result<()> {
    let app = Router::new()
        .route("/", get(|| async { "Security Bot Online" }))
        .route("/health", get(|| async { "ok" }));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "keepalive endpoint listening");
    axum::serve(listener, app).await?;
    Ok(())
}
