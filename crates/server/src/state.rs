// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use ari_web_core::{JobLauncher, PowerShellLauncher, ReportStore};

use crate::config::Config;
use crate::jobs::{JobContext, JobRegistry};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    pub config: Arc<Config>,
    /// Output directory accessor for listings and downloads.
    pub store: ReportStore,
    /// Launcher used for inventory jobs and environment checks.
    pub launcher: Arc<dyn JobLauncher>,
    /// Running and recently finished inventory jobs.
    pub jobs: Arc<JobRegistry>,
    /// Shared by every spawned job.
    pub job_context: Arc<JobContext>,
}

impl AppState {
    /// Build state with the PowerShell launcher described by `config`.
    pub fn new(config: Config) -> Arc<Self> {
        let mut launcher = PowerShellLauncher::new(&config.pwsh_path);
        if let Some(path) = &config.ps_module_path {
            launcher = launcher.with_module_path(path.clone());
        }
        Self::with_launcher(config, Arc::new(launcher))
    }

    /// Build state around any launcher (used by tests to run shell scripts).
    pub fn with_launcher(config: Config, launcher: Arc<dyn JobLauncher>) -> Arc<Self> {
        let store = ReportStore::new(&config.reports_dir);
        let job_context = Arc::new(JobContext {
            launcher: Arc::clone(&launcher),
            store: store.clone(),
            cancel_on_disconnect: config.cancel_on_disconnect,
        });
        Arc::new(Self {
            start_time: Instant::now(),
            config: Arc::new(config),
            store,
            launcher,
            jobs: Arc::new(JobRegistry::new()),
            job_context,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
