// crates/server/src/jobs/mod.rs
//! Inventory job system.
//!
//! Provides:
//! - `spawn_job` / `run_job`: drive one job from request body to terminal event
//! - `JobRegistry`: tracks running and recently finished jobs
//! - `JobState`: atomic phase and progress tracking per job
//! - `JobSnapshot`: serializable view for the status endpoints

pub mod orchestrator;
pub mod registry;
pub mod state;
pub mod types;

pub use orchestrator::{run_job, spawn_job, JobContext};
pub use registry::JobRegistry;
pub use state::JobState;
pub use types::{JobId, JobOutcome, JobPhase, JobSnapshot};
