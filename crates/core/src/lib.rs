// crates/core/src/lib.rs
//! Core of the ARI web runner: request validation, command construction,
//! process execution, progress estimation and report storage.
//!
//! Nothing in this crate knows about HTTP; the server crate wires these
//! pieces into the job pipeline.

pub mod command;
pub mod error;
pub mod launcher;
pub mod process;
pub mod progress;
pub mod report_store;
pub mod request;

pub use command::{CommandSpec, EnvVar};
pub use error::*;
pub use launcher::{EnvironmentChecks, JobLauncher, PowerShellLauncher};
pub use process::{run_collect, spawn_streaming, CollectedOutput, ExitOutcome, OutputLine, StreamingProcess};
pub use report_store::{FileInfo, ReportStore};
pub use request::{GenerateInventoryBody, JobRequest, Secret};
