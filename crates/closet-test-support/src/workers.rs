//! Shell scripts that stand in for the Python stage workers.
//!
//! Scripts are run as `/bin/sh <script> <input>` rather than executed
//! directly, so no executable bit is needed and a concurrently forked test
//! process can never hold the script open for writing at exec time.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Interpreter used to run worker scripts.
pub const SHELL: &str = "/bin/sh";

/// Command line (program and leading arguments) for one stand-in worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    /// Program to launch.
    pub program: String,
    /// Arguments placed before the input path.
    pub args: Vec<String>,
}

impl WorkerCommand {
    /// The command rendered as one whitespace-separated line.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Write `body` to `dir/name` and return the command that runs it.
///
/// # Errors
///
/// Returns an error when the script cannot be written.
pub fn write_worker(dir: &Path, name: &str, body: &str) -> Result<WorkerCommand> {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n"))
        .with_context(|| format!("failed to write worker script {}", path.display()))?;
    Ok(WorkerCommand {
        program: SHELL.to_string(),
        args: vec![path.display().to_string()],
    })
}

/// Body that copies the input next to itself with `suffix` and reports it under `field`.
#[must_use]
pub fn copying_worker(field: &str, suffix: &str) -> String {
    format!(
        "out=\"${{1%.*}}-{suffix}.png\"\ncp \"$1\" \"$out\" || exit 3\nprintf '{{\"{field}\": \"%s\"}}\\n' \"$out\""
    )
}

/// Body that writes `printf_bytes` (a `printf` format string) as the output image.
#[must_use]
pub fn writing_worker(field: &str, suffix: &str, printf_bytes: &str) -> String {
    format!(
        "out=\"${{1%.*}}-{suffix}.png\"\nprintf '{printf_bytes}' > \"$out\" || exit 3\nprintf '{{\"{field}\": \"%s\"}}\\n' \"$out\""
    )
}

/// Body that prints a fixed prediction object.
#[must_use]
pub fn predicting_worker(kind: &str, color: &str, pattern: &str) -> String {
    format!("printf '{{\"type\": \"{kind}\", \"color\": \"{color}\", \"pattern\": \"{pattern}\"}}\\n'")
}

/// Body that reports `message` through the JSON `error` field.
#[must_use]
pub fn failing_worker(message: &str) -> String {
    format!("printf '{{\"error\": \"{message}\"}}\\n'")
}

/// Body that prints something other than JSON.
#[must_use]
pub fn garbage_worker() -> String {
    "echo 'Traceback (most recent call last):'\necho 'RuntimeError: CUDA unavailable' >&2\nexit 1"
        .to_string()
}

/// Body that appends its input path to `log` before delegating to `rest`.
#[must_use]
pub fn logging_worker(log: &Path, rest: &str) -> String {
    format!("echo \"$1\" >> \"{}\"\n{rest}", log.display())
}

/// Body that sleeps for `secs` seconds and then succeeds with an empty object.
#[must_use]
pub fn sleeping_worker(secs: u32) -> String {
    format!("sleep {secs}\nprintf '{{}}\\n'")
}
