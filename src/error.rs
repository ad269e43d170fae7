//! Error types for the harvest pipeline

use crate::Region;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for harvest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while harvesting fragments
///
/// Only [`Error::LaunchError`] and [`Error::WriteError`] are fatal to a run;
/// every other kind is caught where it originates and downgraded to a
/// degraded-but-complete result (see [`Error::is_fatal`]).
#[derive(Error, Debug)]
pub enum Error {
    /// The rendering engine process could not be started
    #[error("Browser launch failed: {0}")]
    LaunchError(String),

    /// Page load or stabilization failed or timed out
    #[error("Navigation failed: {0}")]
    NavigationError(String),

    /// The page loaded but no element exists for the region at any viewport
    #[error("No {0} element found at any viewport")]
    ExtractionMiss(Region),

    /// A single stylesheet could not be fetched
    #[error("Stylesheet fetch failed for {url}: {reason}")]
    FetchError { url: String, reason: String },

    /// A CSS stage failed internally
    #[error("CSS {stage} stage failed: {reason}")]
    TransformError { stage: &'static str, reason: String },

    /// An output file could not be persisted
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// In-page evaluation failed
    #[error("Script execution failed: {0}")]
    ScriptError(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error must propagate to the top level and fail the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::LaunchError(_) | Error::WriteError { .. })
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}
