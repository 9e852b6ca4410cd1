// crates/server/src/lib.rs
//! ARI web server library.
//!
//! This crate provides the Axum-based HTTP server that runs Azure Resource
//! Inventory jobs, streams their progress as server-sent events, and serves
//! the generated reports.

pub mod config;
pub mod error;
pub mod events;
pub mod jobs;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::*;
pub use metrics::init_metrics;
pub use routes::api_routes;
pub use state::AppState;

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::HeaderName;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes under `/api` plus `/metrics`
/// - Static frontend fallback when a static directory is configured
/// - CORS (allows any origin)
/// - Request IDs and request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();
    let mut app = api_routes(state);
    if let Some(dir) = static_dir {
        app = app.fallback_service(static_service(dir));
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let request_id_header = HeaderName::from_static("x-request-id");

    app.layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
}

/// Serve `dir`, falling back to its `index.html` for client-side routes.
fn static_service(dir: PathBuf) -> ServeDir<ServeFile> {
    tracing::info!(dir = %dir.display(), "serving static files");
    let index = dir.join("index.html");
    ServeDir::new(dir).fallback(ServeFile::new(index))
}

// ============================================================================
// Integration Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn test_state(reports: &std::path::Path) -> Arc<AppState> {
        AppState::new(Config {
            reports_dir: reports.to_path_buf(),
            static_dir: None,
            ..Config::default()
        })
    }

    /// Helper to make a GET request to the app.
    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body_str = String::from_utf8(body.to_vec()).unwrap();

        (status, body_str)
    }

    #[tokio::test]
    async fn test_health_endpoint_response_structure() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get(create_app(test_state(dir.path())), "/api/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert!(json["timestamp"].is_string());
        assert!(json["version"].is_string());
        assert!(json["uptimeSecs"].is_number());
    }

    #[tokio::test]
    async fn test_request_id_is_propagated() {
        let dir = tempfile::tempdir().unwrap();
        let response = create_app(test_state(dir.path()))
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_unknown_route_without_static_dir_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let (status, _) = get(create_app(test_state(dir.path())), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_static_dir_fallback() {
        let reports = tempfile::tempdir().unwrap();
        let public = tempfile::tempdir().unwrap();
        std::fs::write(public.path().join("index.html"), "<h1>ARI</h1>").unwrap();
        std::fs::write(public.path().join("app.js"), "console.log(1)").unwrap();

        let state = AppState::new(Config {
            reports_dir: reports.path().to_path_buf(),
            static_dir: Some(public.path().to_path_buf()),
            ..Config::default()
        });
        let app = create_app(state);

        let (status, body) = get(app.clone(), "/app.js").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "console.log(1)");

        let (status, body) = get(app.clone(), "/some/client/route").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<h1>ARI</h1>");

        let (status, _) = get(app, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_reports_empty_when_directory_missing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let (status, body) = get(create_app(test_state(&missing)), "/api/reports").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "[]");
    }
}
