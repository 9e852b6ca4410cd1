// crates/server/src/routes/reports.rs
//! Report listing and download.
//!
//! - GET /reports: list files in the output directory
//! - GET /download/{filename}: stream one file as an attachment

use std::sync::Arc;

use ari_web_core::FileInfo;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio_util::io::ReaderStream;

use crate::error::ApiResult;
use crate::state::AppState;

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// GET /api/reports: regular files in the output directory, sorted by name.
pub async fn list_reports(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<FileInfo>>> {
    let files = state.store.list().await?;
    Ok(Json(files))
}

/// GET /api/download/{filename}: stream a report file.
///
/// Unsafe or unknown names yield 404 `{"error":"File not found"}`.
pub async fn download_report(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    let (file, len) = state.store.open(&filename).await?;
    tracing::info!(file = %filename, bytes = len, "serving report download");

    let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', ""));
    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(&filename).to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, len.to_string()),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// Content type by extension, matched case-insensitively.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("xlsx") => XLSX_CONTENT_TYPE,
        Some("xml") => "application/xml",
        _ => "application/octet-stream",
    }
}

/// Build the reports router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reports", get(list_reports))
        .route("/download/{filename}", get(download_report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("Inventory.xlsx"), XLSX_CONTENT_TYPE);
        assert_eq!(content_type_for("REPORT.XLSX"), XLSX_CONTENT_TYPE);
        assert_eq!(content_type_for("diagram.xml"), "application/xml");
        assert_eq!(content_type_for("Diagram.XmL"), "application/xml");
        assert_eq!(content_type_for("notes.txt"), "application/octet-stream");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
