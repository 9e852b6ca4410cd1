// crates/server/src/jobs/registry.rs
//! Registry of inventory jobs, keyed by job id.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::state::JobState;
use super::types::{JobId, JobSnapshot};

/// Finished jobs kept for `GET /api/jobs` after they end.
pub const MAX_FINISHED_JOBS: usize = 50;

/// Tracks every running job plus the most recent finished ones.
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<JobState>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new job and return its shared state.
    pub fn register(&self, report_name: impl Into<String>) -> Arc<JobState> {
        let state = Arc::new(JobState::new(uuid::Uuid::new_v4(), report_name));
        match self.jobs.write() {
            Ok(mut jobs) => {
                prune_finished(&mut jobs);
                jobs.insert(state.id(), Arc::clone(&state));
            }
            Err(e) => tracing::error!("RwLock poisoned writing jobs map: {e}"),
        }
        state
    }

    /// Get current status of a specific job.
    pub fn get(&self, id: JobId) -> Option<JobSnapshot> {
        match self.jobs.read() {
            Ok(jobs) => jobs.get(&id).map(|s| s.snapshot()),
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs map: {e}");
                None
            }
        }
    }

    /// All tracked jobs, newest first.
    pub fn list(&self) -> Vec<JobSnapshot> {
        let mut snapshots: Vec<JobSnapshot> = match self.jobs.read() {
            Ok(jobs) => jobs.values().map(|s| s.snapshot()).collect(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs: {e}");
                Vec::new()
            }
        };
        snapshots.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        snapshots
    }

    /// Number of jobs that have not reached a terminal phase.
    pub fn active_count(&self) -> usize {
        match self.jobs.read() {
            Ok(jobs) => jobs.values().filter(|s| !s.is_finished()).count(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs: {e}");
                0
            }
        }
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop the oldest finished jobs beyond [`MAX_FINISHED_JOBS`].
fn prune_finished(jobs: &mut HashMap<JobId, Arc<JobState>>) {
    let mut finished: Vec<(chrono::DateTime<chrono::Utc>, JobId)> = jobs
        .values()
        .filter(|s| s.is_finished())
        .map(|s| (s.snapshot().started_at, s.id()))
        .collect();
    if finished.len() < MAX_FINISHED_JOBS {
        return;
    }
    finished.sort();
    let excess = finished.len() + 1 - MAX_FINISHED_JOBS;
    for (_, id) in finished.into_iter().take(excess) {
        jobs.remove(&id);
    }
}
