// crates/server/src/events.rs
//! Typed job events and the publisher that delivers them to one client.
//!
//! The publisher sits on a `broadcast` channel whose only receiver belongs to
//! the HTTP response stream. `emit` never blocks: when a slow client falls
//! more than the buffer behind, the oldest events are overwritten. The
//! terminal event is always the newest one sent, so it survives.

use std::sync::atomic::{AtomicBool, Ordering};

use ari_web_core::FileInfo;
use axum::response::sse::Event;
use serde::Serialize;
use tokio::sync::broadcast;

/// One message in a job's event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JobEvent {
    Log { message: String },
    Progress { percent: u8 },
    Complete { files: Vec<FileInfo> },
    Error { message: String },
}

impl JobEvent {
    pub fn log(message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// `complete` and `error` end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// Encode as an unnamed SSE `data:` frame.
    pub fn to_sse(&self) -> Event {
        let json = serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialize job event");
            r#"{"type":"error","message":"internal serialization error"}"#.to_string()
        });
        Event::default().data(json)
    }
}

/// Write side of one job's event stream.
pub struct EventPublisher {
    tx: broadcast::Sender<JobEvent>,
    finished: AtomicBool,
    disconnected: AtomicBool,
}

impl EventPublisher {
    /// Create a publisher and the receiver for the response stream.
    ///
    /// Subscribe before the job starts so no event is lost.
    pub fn channel(capacity: usize) -> (Self, broadcast::Receiver<JobEvent>) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (
            Self {
                tx,
                finished: AtomicBool::new(false),
                disconnected: AtomicBool::new(false),
            },
            rx,
        )
    }

    /// Deliver `event` to the client.
    ///
    /// Silently does nothing once the client is gone or a terminal event
    /// has been emitted.
    pub fn emit(&self, event: JobEvent) {
        if self.finished.load(Ordering::Acquire) {
            tracing::debug!(?event, "dropping event emitted after terminal event");
            return;
        }
        if event.is_terminal() {
            self.finished.store(true, Ordering::Release);
        }
        if self.tx.send(event).is_err() && !self.disconnected.swap(true, Ordering::AcqRel) {
            tracing::info!("client disconnected from job event stream");
        }
    }

    pub fn log(&self, message: impl Into<String>) {
        self.emit(JobEvent::log(message));
    }

    pub fn progress(&self, percent: u8) {
        self.emit(JobEvent::Progress {
            percent: percent.min(100),
        });
    }

    pub fn complete(&self, files: Vec<FileInfo>) {
        self.emit(JobEvent::Complete { files });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(JobEvent::error(message));
    }

    /// True once the response stream has dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.disconnected.load(Ordering::Acquire) || self.tx.receiver_count() == 0
    }

    /// True once a terminal event has been emitted.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    #[test]
    fn test_event_wire_shape() {
        let json = serde_json::to_value(JobEvent::log("hello")).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "log", "message": "hello" }));

        let json = serde_json::to_value(JobEvent::Progress { percent: 40 }).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "progress", "percent": 40 }));

        let json = serde_json::to_value(JobEvent::error("boom")).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "error", "message": "boom" }));

        let modified = chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let json = serde_json::to_value(JobEvent::Complete {
            files: vec![FileInfo {
                name: "r.xlsx".to_string(),
                size: 10,
                modified,
            }],
        })
        .unwrap();
        assert_eq!(json["type"], "complete");
        assert_eq!(json["files"][0]["name"], "r.xlsx");
        assert_eq!(json["files"][0]["size"], 10);
        assert_eq!(json["files"][0]["modified"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_emit_in_order() {
        let (publisher, mut rx) = EventPublisher::channel(16);
        publisher.log("a");
        publisher.progress(30);
        publisher.error("done");

        assert_eq!(rx.try_recv().unwrap(), JobEvent::log("a"));
        assert_eq!(rx.try_recv().unwrap(), JobEvent::Progress { percent: 30 });
        assert_eq!(rx.try_recv().unwrap(), JobEvent::error("done"));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_only_one_terminal_event() {
        let (publisher, mut rx) = EventPublisher::channel(16);
        publisher.complete(vec![]);
        publisher.error("late");
        publisher.log("later");

        assert_eq!(rx.try_recv().unwrap(), JobEvent::Complete { files: vec![] });
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert!(publisher.is_finished());
    }

    #[test]
    fn test_emit_after_disconnect_is_silent() {
        let (publisher, rx) = EventPublisher::channel(16);
        assert!(!publisher.is_closed());
        drop(rx);
        publisher.log("nobody listening");
        publisher.error("still nobody");
        assert!(publisher.is_closed());
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest_keeps_terminal() {
        let (publisher, mut rx) = EventPublisher::channel(4);
        for i in 0..20 {
            publisher.log(format!("line {i}"));
        }
        publisher.error("failed");

        let mut received = Vec::new();
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let terminal = event.is_terminal();
                    received.push(event);
                    if terminal {
                        break;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        assert_eq!(received.last(), Some(&JobEvent::error("failed")));
        assert!(received.len() <= 4);
        assert_eq!(received[0], JobEvent::log("line 17"));
    }

    #[test]
    fn test_progress_clamped() {
        let (publisher, mut rx) = EventPublisher::channel(4);
        publisher.progress(200);
        assert_eq!(rx.try_recv().unwrap(), JobEvent::Progress { percent: 100 });
    }
}
