// crates/server/src/jobs/orchestrator.rs
//! Drives one inventory job from request body to terminal event.
//!
//! Phases: validate, build the command and staging directory, start the
//! process, forward its output, then publish the staged files. Every exit
//! path emits exactly one terminal event and removes the staging directory.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ari_web_core::progress::{self, DISPATCH_PERCENT, RUNNING_PERCENT, STARTING_PERCENT};
use ari_web_core::request::DEFAULT_REPORT_NAME;
use ari_web_core::{
    spawn_streaming, CommandSpec, FileInfo, GenerateInventoryBody, JobLauncher, JobRequest,
    OutputLine, ReportStore, StoreError,
};

use super::registry::JobRegistry;
use super::state::JobState;
use super::types::{JobId, JobOutcome, JobPhase};
use crate::events::EventPublisher;
use crate::metrics;

/// Characters of stderr kept for the failure message.
pub const STDERR_TAIL_CHARS: usize = 2000;

/// How often a running job checks whether its client is still connected.
const DISCONNECT_POLL: Duration = Duration::from_millis(500);

const REDACTED: &str = "***";

/// Everything a job needs besides its own request and event stream.
pub struct JobContext {
    pub launcher: Arc<dyn JobLauncher>,
    pub store: ReportStore,
    pub cancel_on_disconnect: bool,
}

/// Register a job and run it on its own task.
///
/// Returns immediately; the job reports through `events` and the registry.
pub fn spawn_job(
    ctx: Arc<JobContext>,
    registry: &JobRegistry,
    body: GenerateInventoryBody,
    events: EventPublisher,
) -> JobId {
    let report_name = body
        .report_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_REPORT_NAME)
        .to_string();
    let state = registry.register(report_name);
    let job_id = state.id();
    metrics::record_job_started();
    tracing::info!(job_id = %job_id, active = registry.active_count(), "inventory job accepted");

    tokio::spawn(async move {
        let started = Instant::now();
        let outcome = run_job(&ctx, &state, body, &events).await;
        metrics::record_job_finished(outcome.label(), started.elapsed());
        match &outcome {
            JobOutcome::Completed { files } => {
                tracing::info!(job_id = %job_id, files, elapsed_ms = started.elapsed().as_millis() as u64, "inventory job completed");
            }
            JobOutcome::Failed { reason } => {
                tracing::warn!(job_id = %job_id, reason = %reason, elapsed_ms = started.elapsed().as_millis() as u64, "inventory job failed");
            }
        }
    });

    job_id
}

/// Run one job to completion.
pub async fn run_job(
    ctx: &JobContext,
    state: &JobState,
    body: GenerateInventoryBody,
    events: &EventPublisher,
) -> JobOutcome {
    let request = match JobRequest::from_body(body) {
        Ok(request) => request,
        Err(e) => return fail(state, events, e.to_string()),
    };

    log_line(state, events, "Starting Azure Resource Inventory generation...");
    report_progress(state, events, STARTING_PERCENT);

    state.set_phase(JobPhase::Building);
    let staging = match ctx.store.create_staging(&state.id().to_string()).await {
        Ok(dir) => dir,
        Err(e) => return fail(state, events, format!("Error preparing report directory: {e}")),
    };
    let command = ctx.launcher.inventory_command(&request, &staging);
    tracing::info!(
        job_id = %state.id(),
        launcher = ctx.launcher.name(),
        command = %command,
        "built inventory command"
    );

    let outcome = execute(ctx, state, &request, &command, &staging, events).await;
    ctx.store.discard_staging(&staging).await;
    outcome
}

async fn execute(
    ctx: &JobContext,
    state: &JobState,
    request: &JobRequest,
    command: &CommandSpec,
    staging: &Path,
    events: &EventPublisher,
) -> JobOutcome {
    state.set_phase(JobPhase::Starting);
    log_line(state, events, "Executing PowerShell command...");
    report_progress(state, events, DISPATCH_PERCENT);

    let mut process = match spawn_streaming(command) {
        Ok(process) => process,
        Err(e) => return fail(state, events, format!("Process error: {e}")),
    };
    state.set_phase(JobPhase::Running);
    tracing::debug!(job_id = %state.id(), pid = ?process.pid(), "inventory process started");

    let redactor = Redactor::new(request.secret());
    let mut stderr_tail = StderrTail::new(STDERR_TAIL_CHARS);
    let mut percent = RUNNING_PERCENT;
    let mut watchdog = tokio::time::interval(DISCONNECT_POLL);
    let mut cancelled = false;

    loop {
        tokio::select! {
            line = process.next_line() => match line {
                Some(OutputLine::Stdout(line)) => {
                    let line = redactor.apply(line);
                    percent = progress::estimate(percent, &line);
                    log_line(state, events, line);
                    report_progress(state, events, percent);
                }
                Some(OutputLine::Stderr(line)) => {
                    let line = redactor.apply(line);
                    tracing::debug!(job_id = %state.id(), stderr = %line, "inventory stderr");
                    stderr_tail.push(&line);
                    log_line(state, events, format!("ERROR: {line}"));
                }
                None => break,
            },
            _ = watchdog.tick(), if ctx.cancel_on_disconnect => {
                if events.is_closed() {
                    cancelled = true;
                    break;
                }
            }
        }
    }

    if cancelled {
        tracing::info!(job_id = %state.id(), "client disconnected, killing inventory process");
        process.kill().await;
        return fail(state, events, "Cancelled: client disconnected");
    }

    state.set_phase(JobPhase::Reconciling);
    let exit = match process.wait().await {
        Ok(exit) => exit,
        Err(e) => return fail(state, events, format!("Process error: {e}")),
    };
    if !exit.success() {
        let mut message = format!("PowerShell process exited with code {}", exit.code);
        let tail = stderr_tail.as_str().trim();
        if !tail.is_empty() {
            message.push_str(": ");
            message.push_str(tail);
        }
        return fail(state, events, message);
    }

    match reconcile(&ctx.store, staging).await {
        Ok(files) => {
            let count = files.len();
            report_progress(state, events, 100);
            state.complete();
            events.complete(files);
            JobOutcome::Completed { files: count }
        }
        Err(e) => fail(state, events, format!("Error listing files: {e}")),
    }
}

/// Move staged files into the output directory and list the result.
async fn reconcile(store: &ReportStore, staging: &Path) -> Result<Vec<FileInfo>, StoreError> {
    let published = store.publish(staging).await?;
    tracing::debug!(files = ?published, "published staged reports");
    store.list().await
}

/// Forward a log line to the client and keep it for status polling.
fn log_line(state: &JobState, events: &EventPublisher, line: impl Into<String>) {
    let line = line.into();
    state.push_output(line.clone());
    events.log(line);
}

fn report_progress(state: &JobState, events: &EventPublisher, percent: u8) {
    state.set_percent(percent);
    events.progress(percent);
}

fn fail(state: &JobState, events: &EventPublisher, message: impl Into<String>) -> JobOutcome {
    let message = message.into();
    state.fail(message.clone());
    events.error(message.clone());
    JobOutcome::Failed { reason: message }
}

/// Replaces the job's secret in forwarded output.
struct Redactor {
    secret: Option<String>,
}

impl Redactor {
    fn new(secret: Option<&str>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }

    fn apply(&self, line: String) -> String {
        match &self.secret {
            Some(secret) if line.contains(secret.as_str()) => line.replace(secret.as_str(), REDACTED),
            _ => line,
        }
    }
}

/// The last `limit` bytes of stderr, cut on a character boundary.
struct StderrTail {
    buf: String,
    limit: usize,
}

impl StderrTail {
    fn new(limit: usize) -> Self {
        Self {
            buf: String::new(),
            limit,
        }
    }

    fn push(&mut self, line: &str) {
        self.buf.push_str(line);
        self.buf.push('\n');
        if self.buf.len() > self.limit {
            let mut cut = self.buf.len() - self.limit;
            while !self.buf.is_char_boundary(cut) {
                cut += 1;
            }
            self.buf.drain(..cut);
        }
    }

    fn as_str(&self) -> &str {
        &self.buf
    }
}
