// crates/server/src/jobs/state.rs
//! Atomic state tracking for a single inventory job.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::types::{JobId, JobPhase, JobSnapshot};

/// Log lines retained per job for status polling.
pub const OUTPUT_TAIL_LINES: usize = 200;

/// Shared state for one job.
///
/// Phase and percent are atomics; everything else sits behind `RwLock`s
/// that are never held across an `.await`.
pub struct JobState {
    id: JobId,
    report_name: String,
    phase: AtomicU8,
    percent: AtomicU8,
    message: RwLock<Option<String>>,
    output: RwLock<VecDeque<String>>,
    started_at: DateTime<Utc>,
    finished_at: RwLock<Option<DateTime<Utc>>>,
}

impl JobState {
    pub fn new(id: JobId, report_name: impl Into<String>) -> Self {
        Self {
            id,
            report_name: report_name.into(),
            phase: AtomicU8::new(JobPhase::Validating as u8),
            percent: AtomicU8::new(0),
            message: RwLock::new(None),
            output: RwLock::new(VecDeque::new()),
            started_at: Utc::now(),
            finished_at: RwLock::new(None),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn phase(&self) -> JobPhase {
        JobPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Move to a non-terminal phase. Ignored once the job has finished.
    pub fn set_phase(&self, phase: JobPhase) {
        let _ = self
            .phase
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (!JobPhase::from_u8(current).is_terminal()).then_some(phase as u8)
            });
    }

    /// Record progress; the stored value never decreases.
    pub fn set_percent(&self, percent: u8) {
        self.percent.fetch_max(percent.min(100), Ordering::Relaxed);
    }

    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::Relaxed)
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        match self.message.write() {
            Ok(mut guard) => *guard = Some(msg.into()),
            Err(e) => tracing::error!("RwLock poisoned writing job message: {e}"),
        }
    }

    /// Append a log line, dropping the oldest beyond [`OUTPUT_TAIL_LINES`].
    pub fn push_output(&self, line: impl Into<String>) {
        match self.output.write() {
            Ok(mut guard) => {
                if guard.len() == OUTPUT_TAIL_LINES {
                    guard.pop_front();
                }
                guard.push_back(line.into());
            }
            Err(e) => tracing::error!("RwLock poisoned writing job output: {e}"),
        }
    }

    /// Mark the job as completed.
    pub fn complete(&self) {
        self.set_percent(100);
        self.finish(JobPhase::Completed);
    }

    /// Mark the job as failed with an error message.
    pub fn fail(&self, error: impl Into<String>) {
        self.set_message(error);
        self.finish(JobPhase::Failed);
    }

    fn finish(&self, phase: JobPhase) {
        self.phase.store(phase as u8, Ordering::Release);
        match self.finished_at.write() {
            Ok(mut guard) => *guard = Some(Utc::now()),
            Err(e) => tracing::error!("RwLock poisoned writing finish time: {e}"),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.phase().is_terminal()
    }

    /// Get a snapshot of the current job state.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id,
            report_name: self.report_name.clone(),
            phase: self.phase(),
            percent: self.percent(),
            message: match self.message.read() {
                Ok(g) => g.clone(),
                Err(e) => {
                    tracing::error!("RwLock poisoned reading job message: {e}");
                    None
                }
            },
            output: match self.output.read() {
                Ok(g) => g.iter().cloned().collect(),
                Err(e) => {
                    tracing::error!("RwLock poisoned reading job output: {e}");
                    Vec::new()
                }
            },
            started_at: self.started_at,
            finished_at: self.finished_at.read().map(|g| *g).unwrap_or(None),
        }
    }
}
