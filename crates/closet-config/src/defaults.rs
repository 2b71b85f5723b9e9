//! Default values applied when an environment variable is absent.
//!
//! # Design
//! - Keep every default in one place so docs and behaviour stay in sync.
//! - Durations are expressed in seconds to match the environment contract.

pub(crate) const DEFAULT_PORT: u16 = 5000;
pub(crate) const DEFAULT_HOST: &str = "0.0.0.0";
pub(crate) const DEFAULT_SCRATCH_DIR_NAME: &str = "uploads";
pub(crate) const DEFAULT_CLASSIFIER_DIR_NAME: &str = "classifier";
pub(crate) const DEFAULT_PYTHON: &str = "python";
pub(crate) const REMOVE_BG_SCRIPT: &str = "remove_bg.py";
pub(crate) const NORMALIZE_SCRIPT: &str = "normalize.py";
pub(crate) const CLASSIFY_SCRIPT: &str = "predict.py";
pub(crate) const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 300;
pub(crate) const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
pub(crate) const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 600;
pub(crate) const DEFAULT_SCRATCH_MAX_AGE_SECS: u64 = 3600;
/// Directories the bundled workers derive from the `uploads` path segment.
pub(crate) const WORKER_OUTPUT_DIR_NAMES: &[&str] = &["outputs", "normalized"];
/// Stages a request passes through; bounds the longest pipeline run.
pub(crate) const PIPELINE_STAGE_COUNT: u32 = 3;
