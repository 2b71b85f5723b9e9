//! Environment loading for [`AppConfig`].
//!
//! # Design
//! - All reads go through a lookup closure so tests can inject variables without
//!   touching the process environment.
//! - Relative paths are resolved against the directory holding the server
//!   executable, never the working directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use closet_telemetry::{DEFAULT_LOG_LEVEL, LogFormat};
use tracing::debug;

use crate::defaults::{
    CLASSIFY_SCRIPT, DEFAULT_CLASSIFIER_DIR_NAME, DEFAULT_HOST, DEFAULT_MAX_UPLOAD_BYTES,
    DEFAULT_PORT, DEFAULT_PYTHON, DEFAULT_SCRATCH_DIR_NAME, DEFAULT_SCRATCH_MAX_AGE_SECS,
    DEFAULT_STAGE_TIMEOUT_SECS, DEFAULT_SWEEP_INTERVAL_SECS, NORMALIZE_SCRIPT,
    PIPELINE_STAGE_COUNT, REMOVE_BG_SCRIPT, WORKER_OUTPUT_DIR_NAMES,
};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{
    AppConfig, LimitsConfig, LoggingSettings, ScratchConfig, ServerConfig, StageCommand,
    StageCommands,
};
use crate::validate::{
    parse_bind_addr, parse_command, parse_flag, parse_log_format, parse_port,
    parse_positive_secs, parse_positive_usize, parse_secs, resolve_dir,
};

/// Listen port.
pub const ENV_PORT: &str = "PORT";
/// Bind address.
pub const ENV_HOST: &str = "HOST";
/// Scratch directory for uploads.
pub const ENV_SCRATCH_DIR: &str = "CLOSET_SCRATCH_DIR";
/// Directory holding the bundled worker scripts.
pub const ENV_CLASSIFIER_DIR: &str = "CLOSET_CLASSIFIER_DIR";
/// Interpreter used by the default worker commands.
pub const ENV_PYTHON: &str = "CLOSET_PYTHON";
/// Override for the background removal worker command.
pub const ENV_REMOVE_BG_CMD: &str = "CLOSET_REMOVE_BG_CMD";
/// Override for the normalization worker command.
pub const ENV_NORMALIZE_CMD: &str = "CLOSET_NORMALIZE_CMD";
/// Override for the classification worker command.
pub const ENV_CLASSIFY_CMD: &str = "CLOSET_CLASSIFY_CMD";
/// Per-stage timeout in seconds.
pub const ENV_STAGE_TIMEOUT_SECS: &str = "CLOSET_STAGE_TIMEOUT_SECS";
/// Upload size limit in bytes.
pub const ENV_MAX_UPLOAD_BYTES: &str = "CLOSET_MAX_UPLOAD_BYTES";
/// Toggle for per-request artifact removal.
pub const ENV_CLEANUP_REQUEST_FILES: &str = "CLOSET_CLEANUP_REQUEST_FILES";
/// Sweep period in seconds; `0` disables the sweeper.
pub const ENV_SWEEP_INTERVAL_SECS: &str = "CLOSET_SWEEP_INTERVAL_SECS";
/// Age in seconds after which scratch files are swept. Must cover a full
/// pipeline run (every stage at its timeout) while the sweeper is enabled.
pub const ENV_SCRATCH_MAX_AGE_SECS: &str = "CLOSET_SCRATCH_MAX_AGE_SECS";
/// Log output format.
pub const ENV_LOG_FORMAT: &str = "CLOSET_LOG_FORMAT";
/// Default log level when `RUST_LOG` is unset.
pub const ENV_LOG_LEVEL: &str = "CLOSET_LOG_LEVEL";

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the executable directory cannot be resolved or any
    /// variable holds an invalid value.
    pub fn from_env() -> ConfigResult<Self> {
        let server_dir = server_dir()?;
        Self::from_lookup(&server_dir, |key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// `server_dir` anchors relative paths and the default scratch/classifier
    /// directories.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable holds an invalid value.
    pub fn from_lookup<F>(server_dir: &Path, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let server = ServerConfig {
            bind_addr: parse_bind_addr(
                ENV_HOST,
                &get(ENV_HOST).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            )?,
            http_port: get(ENV_PORT)
                .map(|value| parse_port(ENV_PORT, &value))
                .transpose()?
                .unwrap_or(DEFAULT_PORT),
        };

        let scratch_dir = match get(ENV_SCRATCH_DIR) {
            Some(value) => resolve_dir(ENV_SCRATCH_DIR, server_dir, &value)?,
            None => server_dir.join(DEFAULT_SCRATCH_DIR_NAME),
        };
        let sweep_interval = match get(ENV_SWEEP_INTERVAL_SECS) {
            Some(value) => parse_secs(ENV_SWEEP_INTERVAL_SECS, &value)?,
            None => Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        };
        let scratch = ScratchConfig {
            sweep_roots: sweep_roots(&scratch_dir),
            dir: scratch_dir,
            sweep_interval: (!sweep_interval.is_zero()).then_some(sweep_interval),
            max_age: get(ENV_SCRATCH_MAX_AGE_SECS)
                .map(|value| parse_positive_secs(ENV_SCRATCH_MAX_AGE_SECS, &value))
                .transpose()?
                .unwrap_or(Duration::from_secs(DEFAULT_SCRATCH_MAX_AGE_SECS)),
            cleanup_request_files: get(ENV_CLEANUP_REQUEST_FILES)
                .map(|value| parse_flag(ENV_CLEANUP_REQUEST_FILES, &value))
                .transpose()?
                .unwrap_or(true),
        };

        let classifier_dir = match get(ENV_CLASSIFIER_DIR) {
            Some(value) => resolve_dir(ENV_CLASSIFIER_DIR, server_dir, &value)?,
            None => server_dir.join(DEFAULT_CLASSIFIER_DIR_NAME),
        };
        let python = get(ENV_PYTHON).unwrap_or_else(|| DEFAULT_PYTHON.to_string());
        let stage_command = |field: &'static str, script: &str| -> ConfigResult<StageCommand> {
            get(field).map_or_else(
                || {
                    Ok(StageCommand::new(
                        python.trim(),
                        vec![classifier_dir.join(script).display().to_string()],
                    ))
                },
                |value| parse_command(field, &value),
            )
        };
        let stages = StageCommands {
            remove_bg: stage_command(ENV_REMOVE_BG_CMD, REMOVE_BG_SCRIPT)?,
            normalize: stage_command(ENV_NORMALIZE_CMD, NORMALIZE_SCRIPT)?,
            classify: stage_command(ENV_CLASSIFY_CMD, CLASSIFY_SCRIPT)?,
            timeout: get(ENV_STAGE_TIMEOUT_SECS)
                .map(|value| parse_positive_secs(ENV_STAGE_TIMEOUT_SECS, &value))
                .transpose()?
                .unwrap_or(Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS)),
        };

        let longest_pipeline = stages.timeout.saturating_mul(PIPELINE_STAGE_COUNT);
        if scratch.sweep_interval.is_some() && scratch.max_age < longest_pipeline {
            return Err(ConfigError::invalid(
                ENV_SCRATCH_MAX_AGE_SECS,
                "shorter_than_pipeline",
                &scratch.max_age.as_secs().to_string(),
            ));
        }

        let limits = LimitsConfig {
            max_upload_bytes: get(ENV_MAX_UPLOAD_BYTES)
                .map(|value| parse_positive_usize(ENV_MAX_UPLOAD_BYTES, &value))
                .transpose()?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        };

        let logging = LoggingSettings {
            level: get(ENV_LOG_LEVEL).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            format: get(ENV_LOG_FORMAT)
                .map(|value| parse_log_format(ENV_LOG_FORMAT, &value))
                .transpose()?
                .unwrap_or_else(LogFormat::infer),
        };

        debug!(
            scratch_dir = %scratch.dir.display(),
            port = server.http_port,
            "configuration loaded"
        );

        Ok(Self {
            server,
            scratch,
            stages,
            limits,
            logging,
        })
    }
}

/// Directory containing the running executable.
fn server_dir() -> ConfigResult<PathBuf> {
    let exe = std::env::current_exe().map_err(|source| ConfigError::ServerDir { source })?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| ConfigError::ServerDir {
        source: std::io::Error::other("executable path has no parent directory"),
    })
}

/// The bundled workers write next to the upload directory by swapping its
/// `uploads` segment for `outputs`/`normalized`; sweep those too.
fn sweep_roots(scratch_dir: &Path) -> Vec<PathBuf> {
    let mut roots = vec![scratch_dir.to_path_buf()];
    let is_uploads_dir = scratch_dir
        .file_name()
        .is_some_and(|name| name == DEFAULT_SCRATCH_DIR_NAME);
    if let (true, Some(parent)) = (is_uploads_dir, scratch_dir.parent()) {
        roots.extend(WORKER_OUTPUT_DIR_NAMES.iter().map(|name| parent.join(name)));
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_roots_include_worker_output_dirs_for_uploads() {
        let roots = sweep_roots(Path::new("/srv/closet/uploads"));
        assert_eq!(
            roots,
            vec![
                PathBuf::from("/srv/closet/uploads"),
                PathBuf::from("/srv/closet/outputs"),
                PathBuf::from("/srv/closet/normalized"),
            ]
        );
    }

    #[test]
    fn sweep_roots_only_scratch_for_custom_names() {
        let roots = sweep_roots(Path::new("/var/tmp/closet-scratch"));
        assert_eq!(roots, vec![PathBuf::from("/var/tmp/closet-scratch")]);
    }
}
