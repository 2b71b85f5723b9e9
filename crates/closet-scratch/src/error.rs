//! # Design
//!
//! - Provide structured, constant-message errors for scratch storage.
//! - Capture operation context (paths, fields, inputs) so failures are reproducible in tests.
//! - Preserve source errors without interpolating context into error messages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for scratch storage operations.
pub type ScratchResult<T> = Result<T, ScratchError>;

/// Errors produced by scratch storage.
#[derive(Debug, Error)]
pub enum ScratchError {
    /// IO failures while interacting with the filesystem.
    #[error("scratch io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Input validation failures.
    #[error("scratch invalid input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
}

impl ScratchError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
