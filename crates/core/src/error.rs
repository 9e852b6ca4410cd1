// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while validating an inventory job request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Tenant ID is required")]
    MissingTenant,

    #[error("Application ID and secret must be provided together")]
    IncompleteServicePrincipal,

    #[error("Invalid report name: {0}")]
    InvalidReportName(String),

    #[error("Invalid Azure environment: {0}")]
    InvalidEnvironment(String),
}

/// Errors raised by the process runner.
///
/// A process that starts and exits non-zero is NOT an error at this layer;
/// see [`crate::process::ExitOutcome`].
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Dispatch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("IO error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the report store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("File not found: {name}")]
    NotFound { name: String },

    #[error("IO error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Classify an IO error for `path`, folding `NotFound` into the
    /// store's own variant so callers map it to a 404.
    pub fn io(name: &str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(name),
            _ => Self::Io {
                path: path.into(),
                source,
            },
        }
    }
}
