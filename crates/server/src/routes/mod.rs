//! API route handlers for the ARI web server.

pub mod environment;
pub mod health;
pub mod inventory;
pub mod jobs;
pub mod metrics;
pub mod reports;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET  /api/health - Health check
/// - GET  /api/check-environment - PowerShell and module diagnostics
/// - POST /api/generate-inventory - Run an inventory job, streamed as SSE
/// - GET  /api/reports - List generated report files
/// - GET  /api/download/{filename} - Download one report file
/// - GET  /api/jobs - Running and recently finished jobs
/// - GET  /api/jobs/{id} - One job's status
/// - GET  /metrics - Prometheus metrics (outside /api)
pub fn api_routes(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .merge(health::router())
        .merge(environment::router())
        .merge(inventory::router())
        .merge(reports::router())
        .merge(jobs::router());

    Router::new()
        .nest("/api", api)
        .merge(metrics::router())
        .with_state(state)
}
