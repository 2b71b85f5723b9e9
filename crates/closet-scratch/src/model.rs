//! Records produced by scratch storage operations.
//!
//! # Design
//! - Keep records plain data; they never hold open file handles.

use std::path::PathBuf;

/// An upload persisted into the scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    /// Absolute, generated path of the stored bytes.
    pub path: PathBuf,
    /// Filename supplied by the client; advisory only and never used for paths.
    pub original_name: Option<String>,
    /// Number of bytes written.
    pub size: u64,
}

/// Summary of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Files that were examined.
    pub scanned: u64,
    /// Files removed because they exceeded the age threshold.
    pub removed: u64,
    /// Entries that could not be inspected or removed.
    pub failed: u64,
}
