//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of errors that occur between the scheduler, the hardware session
//! and the artifact ingestion pipeline.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically file parsing or type mismatches
//!   in the configuration file or environment overrides.
//! - **`Configuration`**: Semantic errors in otherwise well-formed configuration, such as an
//!   acquisition window longer than the scheduling period. These are always fatal and are
//!   raised before any hardware interaction.
//! - **`SessionUsage`**: A session operation was called out of order (e.g. `start` before
//!   `connect` + `configure`).
//! - **`Connection`** / **`Hardware`**: Failures reported by the instrument session. The
//!   scheduler isolates these per iteration.
//! - **`Parse`**: An artifact that exists but cannot be read or decoded. The artifact is
//!   left on disk for inspection.
//! - **`Watch`**, **`WaitTimedOut`**, **`Cancelled`**: Outcomes of waiting on the drop directory.
//!
//! By using `#[from]`, `DaqError` can be created from underlying error types with `?`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Every failure the acquisition and ingestion layers can report.
#[derive(Error, Debug)]
pub enum DaqError {
    /// The configuration sources could not be loaded or extracted.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Loaded configuration is logically invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Underlying filesystem I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Session operation invoked in the wrong lifecycle state.
    #[error("Session usage error: {0}")]
    SessionUsage(String),

    /// The instrument could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The instrument rejected or failed an operation.
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// An artifact exists but could not be read or decoded.
    #[error("Failed to parse artifact {}: {reason}", path.display())]
    Parse {
        /// Artifact that failed to parse.
        path: PathBuf,
        /// Human-readable cause.
        reason: String,
    },

    /// The filesystem notification backend failed.
    #[error("Drop directory watch error: {0}")]
    Watch(#[from] notify::Error),

    /// No artifact became available within the configured timeout.
    #[error("Timed out after {0:?} waiting for an artifact")]
    WaitTimedOut(Duration),

    /// The wait was cancelled through a stop signal.
    #[error("Wait for artifact was cancelled")]
    Cancelled,

    /// A caller-supplied window callback failed.
    #[error("Window callback failed: {0}")]
    Callback(String),
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Config(Box::new(err))
    }
}
