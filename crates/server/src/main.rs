// crates/server/src/main.rs
//! ARI web server binary.
//!
//! Reads configuration from the environment, prepares the report and upload
//! directories, then serves the API until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use ari_web_observability::init_tracing;
use ari_web_server::{create_app, init_metrics, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    init_tracing(config.log_format)?;
    config.warn_invalid();

    init_metrics();

    tokio::fs::create_dir_all(&config.uploads_dir)
        .await
        .with_context(|| format!("failed to create directory {}", config.uploads_dir.display()))?;
    let state = AppState::new(config);
    state
        .store
        .ensure_root()
        .await
        .context("failed to create reports directory")?;
    let config = Arc::clone(&state.config);

    let addr = config.socket_addr();
    tracing::info!(
        %addr,
        reports_dir = %config.reports_dir.display(),
        uploads_dir = %config.uploads_dir.display(),
        pwsh = %config.pwsh_path.display(),
        cancel_on_disconnect = config.cancel_on_disconnect,
        "starting ARI web server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
