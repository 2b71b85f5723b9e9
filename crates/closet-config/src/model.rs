//! Typed configuration models.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use closet_telemetry::LogFormat;

/// Fully validated service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Listener settings.
    pub server: ServerConfig,
    /// Scratch directory and sweeping policy.
    pub scratch: ScratchConfig,
    /// External worker commands for each pipeline stage.
    pub stages: StageCommands,
    /// Request limits.
    pub limits: LimitsConfig,
    /// Logging preferences.
    pub logging: LoggingSettings,
}

/// Listener settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_addr: IpAddr,
    /// Port to bind; never zero.
    pub http_port: u16,
}

impl ServerConfig {
    /// Socket address the HTTP listener binds to.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.http_port)
    }
}

/// Scratch storage settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchConfig {
    /// Absolute directory receiving uploads.
    pub dir: PathBuf,
    /// Directories swept for stale files; always starts with `dir`.
    pub sweep_roots: Vec<PathBuf>,
    /// Sweep period; `None` disables the periodic sweeper.
    pub sweep_interval: Option<Duration>,
    /// Files older than this are removed by the sweeper.
    pub max_age: Duration,
    /// Remove the upload and stage outputs once a response is built.
    pub cleanup_request_files: bool,
}

/// Worker invocation for a single stage.
///
/// The input path is appended as the final argument at invocation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    /// Executable name or path.
    pub program: String,
    /// Fixed arguments placed before the input path.
    pub args: Vec<String>,
}

impl StageCommand {
    /// Build a command from a program and its fixed arguments.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

/// Commands for the three pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommands {
    /// Background removal worker.
    pub remove_bg: StageCommand,
    /// Normalization worker.
    pub normalize: StageCommand,
    /// Classification worker.
    pub classify: StageCommand,
    /// Upper bound on a single stage execution.
    pub timeout: Duration,
}

/// Request limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitsConfig {
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: usize,
}

/// Logging preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Default filter level when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}
