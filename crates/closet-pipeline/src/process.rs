//! Subprocess-backed stage adapter.
//!
//! A worker is launched with the input image path as its final argument. It
//! must print one JSON object to standard output: either a success object
//! carrying the configured output field, or an object with a non-null
//! `error`. The exit status is recorded but never decides success.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{StageError, StageResult};
use crate::model::{StageKind, StageOutput};
use crate::stage::Stage;

/// Stage implemented by an external worker process.
#[derive(Debug, Clone)]
pub struct ProcessStage {
    kind: StageKind,
    program: String,
    args: Vec<String>,
    output_field: Option<String>,
    timeout: Duration,
}

impl ProcessStage {
    /// Build an adapter for `kind` that runs `program args... <input>`.
    ///
    /// The output field defaults to the one the bundled worker for `kind` uses.
    #[must_use]
    pub fn new(
        kind: StageKind,
        program: impl Into<String>,
        args: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            kind,
            program: program.into(),
            args,
            output_field: kind.default_output_field().map(str::to_string),
            timeout,
        }
    }

    /// Override the JSON field holding the output image path.
    #[must_use]
    pub fn with_output_field(mut self, field: Option<&str>) -> Self {
        self.output_field = field.map(str::to_string);
        self
    }

    /// Program launched for each invocation.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Deadline applied to each invocation.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Stage for ProcessStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn invoke(&self, input: &Path) -> StageResult<StageOutput> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| StageError::Launch {
            program: self.program.clone(),
            source,
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| StageError::Io {
                operation: "wait_with_output",
                source,
            })?,
            Err(_) => {
                warn!(
                    stage = self.kind.as_str(),
                    timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    "stage worker exceeded deadline; killed"
                );
                return Err(StageError::Timeout {
                    timeout: self.timeout,
                });
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            warn!(
                stage = self.kind.as_str(),
                stderr = %stderr.trim(),
                "stage worker wrote to stderr"
            );
        }
        if !output.status.success() {
            warn!(
                stage = self.kind.as_str(),
                code = ?output.status.code(),
                "stage worker exited unsuccessfully"
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(
            stage = self.kind.as_str(),
            bytes = output.stdout.len(),
            "stage worker finished"
        );
        parse_stage_output(&stdout, self.output_field.as_deref())
    }
}

/// Interpret a worker's complete standard output.
///
/// A non-null `error` wins over everything else. Otherwise, when
/// `output_field` is set, it must hold a non-empty string path; it is moved out
/// of the attribute map into [`StageOutput::output_path`].
///
/// # Errors
///
/// Returns [`StageError::OutputParse`] when no JSON can be read,
/// [`StageError::UnexpectedOutput`] when the JSON does not match the contract,
/// and [`StageError::Reported`] when the worker reported a failure.
pub fn parse_stage_output(raw: &str, output_field: Option<&str>) -> StageResult<StageOutput> {
    let Value::Object(mut attributes) = parse_json(raw)? else {
        return Err(StageError::UnexpectedOutput {
            reason: "not_an_object",
            raw: raw.to_string(),
        });
    };

    match attributes.remove("error") {
        None | Some(Value::Null) => {}
        Some(Value::String(message)) => return Err(StageError::Reported { message }),
        Some(other) => {
            return Err(StageError::Reported {
                message: other.to_string(),
            });
        }
    }

    let output_path = match output_field {
        Some(field) => match attributes.remove(field) {
            Some(Value::String(path)) if !path.trim().is_empty() => Some(PathBuf::from(path)),
            _ => {
                return Err(StageError::UnexpectedOutput {
                    reason: "missing_output_field",
                    raw: raw.to_string(),
                });
            }
        },
        None => None,
    };

    Ok(StageOutput {
        output_path,
        attributes,
    })
}

fn parse_json(raw: &str) -> StageResult<Value> {
    let trimmed = raw.trim();
    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(value),
        Err(source) => {
            // Workers that print progress chatter emit their result object last.
            let last_line = trimmed
                .lines()
                .rev()
                .map(str::trim)
                .find(|line| !line.is_empty());
            if let Some(line) = last_line.filter(|line| *line != trimmed)
                && let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(line)
            {
                return Ok(value);
            }
            Err(StageError::OutputParse {
                raw: raw.to_string(),
                source,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_object_moves_output_field_out_of_attributes() {
        let output = parse_stage_output(
            r#"{"output_path":"/srv/outputs/a.png","base64_image":"AAAA"}"#,
            Some("output_path"),
        )
        .expect("valid output");
        assert_eq!(output.output_path, Some(PathBuf::from("/srv/outputs/a.png")));
        assert_eq!(output.attributes.get("base64_image"), Some(&json!("AAAA")));
        assert!(!output.attributes.contains_key("output_path"));
    }

    #[test]
    fn error_field_wins_over_output_field() {
        let err = parse_stage_output(
            r#"{"error":"model crashed","output_path":"/x.png"}"#,
            Some("output_path"),
        )
        .expect_err("reported error");
        assert!(matches!(err, StageError::Reported { message } if message == "model crashed"));
    }

    #[test]
    fn null_error_is_ignored() {
        let output = parse_stage_output(
            r#"{"error":null,"type":"shirt","color":"blue","pattern":"solid"}"#,
            None,
        )
        .expect("valid output");
        assert_eq!(output.output_path, None);
        assert_eq!(output.attributes.len(), 3);
        assert!(!output.attributes.contains_key("error"));
    }

    #[test]
    fn structured_error_is_stringified() {
        let err = parse_stage_output(r#"{"error":{"code":7}}"#, None).expect_err("reported");
        assert!(matches!(err, StageError::Reported { message } if message == r#"{"code":7}"#));
    }

    #[test]
    fn non_json_output_is_a_parse_error() {
        for raw in ["", "   \n", "Traceback (most recent call last):", "{\"output_path\":"] {
            let err = parse_stage_output(raw, Some("output_path")).expect_err("parse error");
            assert!(matches!(err, StageError::OutputParse { .. }), "{raw:?}");
            assert_eq!(err.raw_output(), Some(raw));
        }
    }

    #[test]
    fn result_on_last_line_is_accepted() {
        let raw = "loading model...\nwarming up\n{\"normalized_path\":\"/n/a.png\"}\n";
        let output = parse_stage_output(raw, Some("normalized_path")).expect("valid output");
        assert_eq!(output.output_path, Some(PathBuf::from("/n/a.png")));
    }

    #[test]
    fn non_object_json_is_unexpected() {
        for raw in ["[1,2,3]", "\"/x.png\"", "42", "null"] {
            let err = parse_stage_output(raw, None).expect_err("unexpected");
            assert!(
                matches!(err, StageError::UnexpectedOutput { reason: "not_an_object", .. }),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn missing_or_invalid_output_field_is_unexpected() {
        for raw in [
            r#"{"something":"else"}"#,
            r#"{"output_path":""}"#,
            r#"{"output_path":12}"#,
            r#"{"output_path":null}"#,
        ] {
            let err = parse_stage_output(raw, Some("output_path")).expect_err("unexpected");
            assert!(
                matches!(
                    err,
                    StageError::UnexpectedOutput {
                        reason: "missing_output_field",
                        ..
                    }
                ),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn new_uses_default_output_field_for_kind() {
        let stage = ProcessStage::new(
            StageKind::Normalization,
            "python",
            vec!["normalize.py".to_string()],
            Duration::from_secs(5),
        );
        assert_eq!(stage.output_field.as_deref(), Some("normalized_path"));
        assert_eq!(stage.program(), "python");
        assert_eq!(stage.kind(), StageKind::Normalization);

        let stage = stage.with_output_field(None);
        assert_eq!(stage.output_field, None);
    }
}
