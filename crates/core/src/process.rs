// crates/core/src/process.rs
//! Process runner: spawns external commands with fully redirected stdio.
//!
//! Two modes:
//! - [`run_collect`] runs to completion and buffers both streams.
//! - [`spawn_streaming`] forwards each output line as it is produced and
//!   exposes the exit status separately.
//!
//! Children are spawned with `kill_on_drop`, so dropping a handle early
//! terminates the process and tokio reaps it in the background.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::command::CommandSpec;
use crate::error::ProcessError;

/// Buffered lines between the reader tasks and the consumer.
const LINE_CHANNEL_CAPACITY: usize = 256;

/// Buffered result of [`run_collect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CollectedOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One line of output, tagged with the stream it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Terminal status of a streamed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, or `-1` when the process was terminated by a signal.
    pub code: i32,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

fn configure(spec: &CommandSpec) -> tokio::process::Command {
    let mut cmd = spec.to_tokio();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

fn dispatch_error(spec: &CommandSpec, source: std::io::Error) -> ProcessError {
    tracing::error!(program = %spec.program, error = %source, "failed to spawn process");
    ProcessError::Dispatch {
        program: spec.program.clone(),
        source,
    }
}

/// Run `spec` to completion and return both streams as text.
///
/// A non-zero exit is returned as data. On timeout the child is killed.
pub async fn run_collect(
    spec: &CommandSpec,
    timeout: Duration,
) -> Result<CollectedOutput, ProcessError> {
    let t0 = Instant::now();
    tracing::debug!(command = %spec, "run_collect: spawning");

    let child = configure(spec)
        .spawn()
        .map_err(|e| dispatch_error(spec, e))?;

    // Dropping the future on timeout drops the child, which kills it.
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| {
            tracing::warn!(program = %spec.program, timeout_secs = timeout.as_secs(), "run_collect: timed out");
            ProcessError::Timeout {
                program: spec.program.clone(),
                secs: timeout.as_secs(),
            }
        })?
        .map_err(|source| ProcessError::Io {
            program: spec.program.clone(),
            source,
        })?;

    let exit_code = output.status.code().unwrap_or(-1);
    tracing::debug!(
        program = %spec.program,
        exit_code,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "run_collect: finished"
    );

    Ok(CollectedOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code,
    })
}

/// A running child whose output is consumed line by line.
pub struct StreamingProcess {
    program: String,
    child: Child,
    lines: mpsc::Receiver<OutputLine>,
    readers: Vec<JoinHandle<()>>,
}

/// Start `spec` and stream its stdout and stderr as tagged lines.
pub fn spawn_streaming(spec: &CommandSpec) -> Result<StreamingProcess, ProcessError> {
    tracing::info!(command = %spec, "spawn_streaming: spawning");

    let mut child = configure(spec)
        .spawn()
        .map_err(|e| dispatch_error(spec, e))?;

    let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward_lines(stdout, tx.clone(), OutputLine::Stdout)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward_lines(stderr, tx, OutputLine::Stderr)));
    }

    Ok(StreamingProcess {
        program: spec.program.clone(),
        child,
        lines: rx,
        readers,
    })
}

impl StreamingProcess {
    /// OS process id, if the process has not been reaped yet.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Next output line from either stream.
    ///
    /// Returns `None` once both streams have closed. Lines from one stream
    /// keep their order; interleaving across streams is best effort.
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        self.lines.recv().await
    }

    /// Wait for the process to exit.
    ///
    /// Drain [`next_line`](Self::next_line) first: a child blocked on a full
    /// pipe never exits.
    pub async fn wait(mut self) -> Result<ExitOutcome, ProcessError> {
        let status = self.child.wait().await.map_err(|source| ProcessError::Io {
            program: self.program.clone(),
            source,
        })?;
        for reader in self.readers.drain(..) {
            let _ = reader.await;
        }
        let code = status.code().unwrap_or(-1);
        if code != 0 {
            tracing::warn!(program = %self.program, exit_code = code, "process exited non-zero");
        }
        Ok(ExitOutcome { code })
    }

    /// Forcibly terminate the process and reap it.
    pub async fn kill(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!(program = %self.program, error = %e, "failed to kill process");
        }
        for reader in self.readers.drain(..) {
            reader.abort();
        }
    }
}

/// Forward each line of `stream` until EOF or until the receiver is gone.
///
/// Bytes are decoded lossily and the line terminator is stripped.
async fn forward_lines<R>(
    stream: R,
    tx: mpsc::Sender<OutputLine>,
    tag: fn(String) -> OutputLine,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(tag(line)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "output reader failed");
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("/bin/sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_run_collect_captures_both_streams() {
        let out = run_collect(&sh("echo out; echo err >&2"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert!(out.success());
    }

    #[tokio::test]
    async fn test_run_collect_non_zero_is_not_an_error() {
        let out = run_collect(&sh("exit 3"), Duration::from_secs(5)).await.unwrap();
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_run_collect_dispatch_error() {
        let spec = CommandSpec::new("/nonexistent/definitely-not-here");
        let err = run_collect(&spec, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ProcessError::Dispatch { .. }));
    }

    #[tokio::test]
    async fn test_run_collect_timeout() {
        let err = run_collect(&sh("sleep 5"), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_env_overrides_applied() {
        let spec = sh("echo $ARI_TEST_VALUE").env(crate::command::EnvVar::plain("ARI_TEST_VALUE", "42"));
        let out = run_collect(&spec, Duration::from_secs(5)).await.unwrap();
        assert_eq!(out.stdout.trim(), "42");
    }

    #[tokio::test]
    async fn test_spawn_streaming_tags_lines() {
        let mut proc = spawn_streaming(&sh("echo one; echo two; echo oops >&2; exit 0")).unwrap();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        while let Some(line) = proc.next_line().await {
            match line {
                OutputLine::Stdout(l) => stdout.push(l),
                OutputLine::Stderr(l) => stderr.push(l),
            }
        }
        let outcome = proc.wait().await.unwrap();
        assert_eq!(stdout, vec!["one", "two"]);
        assert_eq!(stderr, vec!["oops"]);
        assert!(outcome.success());
    }

    #[tokio::test]
    async fn test_spawn_streaming_exit_code() {
        let mut proc = spawn_streaming(&sh("echo bye; exit 7")).unwrap();
        while proc.next_line().await.is_some() {}
        assert_eq!(proc.wait().await.unwrap().code, 7);
    }

    #[tokio::test]
    async fn test_spawn_streaming_lossy_and_crlf() {
        let mut proc = spawn_streaming(&sh(r"printf 'a\377b\r\n'")).unwrap();
        let line = proc.next_line().await.unwrap();
        assert_eq!(line, OutputLine::Stdout("a\u{FFFD}b".to_string()));
        proc.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_streaming_dispatch_error() {
        let spec = CommandSpec::new("/nonexistent/definitely-not-here");
        assert!(matches!(
            spawn_streaming(&spec),
            Err(ProcessError::Dispatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_kill_terminates_long_running_process() {
        let mut proc = spawn_streaming(&sh("echo started; sleep 30")).unwrap();
        assert_eq!(
            proc.next_line().await,
            Some(OutputLine::Stdout("started".to_string()))
        );
        let t0 = Instant::now();
        proc.kill().await;
        assert!(t0.elapsed() < Duration::from_secs(5));
    }
}
