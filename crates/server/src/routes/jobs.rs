// crates/server/src/routes/jobs.rs
//! API routes for inventory job status.
//!
//! - GET /jobs: running and recently finished jobs, newest first
//! - GET /jobs/{id}: one job's snapshot

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::error::{ApiError, ApiResult};
use crate::jobs::{JobId, JobSnapshot};
use crate::state::AppState;

/// GET /api/jobs: list tracked jobs.
async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobSnapshot>> {
    Json(state.jobs.list())
}

/// GET /api/jobs/{id}: get one job.
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobSnapshot>> {
    let job_id: JobId = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid job id: {id}")))?;
    state
        .jobs
        .get(job_id)
        .map(Json)
        .ok_or(ApiError::JobNotFound(id))
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
}
