//! Application metrics for Prometheus monitoring.
//!
//! This module provides:
//! - Prometheus metrics recorder initialization
//! - Job lifecycle metric definitions
//! - Helper functions for recording metrics

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// This should be called once at application startup, before any metrics are recorded.
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();

    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!("ari_jobs_started_total", "Inventory jobs started");
    describe_counter!(
        "ari_jobs_finished_total",
        "Inventory jobs finished, labelled by outcome"
    );
    describe_histogram!(
        "ari_job_duration_seconds",
        "Wall-clock duration of inventory jobs in seconds"
    );
    describe_gauge!("ari_jobs_active", "Inventory jobs currently running");
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

/// Record that a job was accepted.
pub fn record_job_started() {
    counter!("ari_jobs_started_total").increment(1);
    gauge!("ari_jobs_active").increment(1.0);
}

/// Record a finished job.
///
/// # Arguments
/// * `outcome` - `"completed"` or `"failed"`
/// * `duration` - Time from start to terminal event
pub fn record_job_finished(outcome: &str, duration: Duration) {
    counter!("ari_jobs_finished_total", "outcome" => outcome.to_string()).increment(1);
    histogram!("ari_job_duration_seconds").record(duration.as_secs_f64());
    gauge!("ari_jobs_active").decrement(1.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_job_started();
        record_job_finished("completed", Duration::from_millis(5));
    }

    #[test]
    fn test_render_metrics_before_init() {
        // Before init, render_metrics returns None (unless another test initialized it)
        let _ = render_metrics();
    }
}
