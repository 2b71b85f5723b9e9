//! Error types for stage invocation and pipeline orchestration.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::model::StageKind;

/// Result alias for a single stage invocation.
pub type StageResult<T> = Result<T, StageError>;

/// Result alias for a full pipeline run.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failure of a single stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// The worker process could not be started.
    #[error("stage worker could not be launched")]
    Launch {
        /// Program that was launched.
        program: String,
        /// Underlying spawn failure.
        #[source]
        source: io::Error,
    },
    /// Communicating with the worker failed after launch.
    #[error("stage worker io failed")]
    Io {
        /// Operation that failed.
        operation: &'static str,
        /// Underlying IO failure.
        #[source]
        source: io::Error,
    },
    /// The worker did not finish within its deadline.
    #[error("stage worker timed out")]
    Timeout {
        /// Deadline that elapsed.
        timeout: Duration,
    },
    /// The worker's standard output was not valid JSON.
    #[error("stage output was not valid JSON")]
    OutputParse {
        /// Raw standard output.
        raw: String,
        /// Parser failure.
        #[source]
        source: serde_json::Error,
    },
    /// The worker produced JSON that does not match the stage contract.
    #[error("stage output did not match the expected shape")]
    UnexpectedOutput {
        /// Which part of the contract was violated.
        reason: &'static str,
        /// Raw standard output.
        raw: String,
    },
    /// The worker reported an error in its JSON output.
    #[error("stage reported an error")]
    Reported {
        /// Message supplied by the worker.
        message: String,
    },
    /// The worker reported an output image that does not exist.
    #[error("stage output file is missing")]
    OutputMissing {
        /// Path the worker reported.
        path: PathBuf,
    },
}

impl StageError {
    /// Raw worker output attached to the error, for diagnostics only.
    #[must_use]
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::OutputParse { raw, .. } | Self::UnexpectedOutput { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// Failure of a pipeline run, attributed to the stage that caused it.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage failed; later stages were not invoked.
    #[error("pipeline stage failed")]
    Stage {
        /// Stage that failed.
        stage: StageKind,
        /// Stage failure.
        #[source]
        source: StageError,
        /// Files produced for this request before the failure, upload first.
        artifacts: Vec<PathBuf>,
    },
    /// Every stage succeeded but the final image could not be read back.
    #[error("final image could not be read")]
    FinalImageRead {
        /// Path of the final image.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: io::Error,
        /// Files produced for this request, upload first.
        artifacts: Vec<PathBuf>,
    },
}

impl PipelineError {
    /// Stage the failure is attributed to.
    ///
    /// Reading the final image back belongs to normalization, whose output it is.
    #[must_use]
    pub const fn stage(&self) -> StageKind {
        match self {
            Self::Stage { stage, .. } => *stage,
            Self::FinalImageRead { .. } => StageKind::Normalization,
        }
    }

    /// Upload and stage outputs that exist on disk for the failed request.
    #[must_use]
    pub fn artifacts(&self) -> &[PathBuf] {
        match self {
            Self::Stage { artifacts, .. } | Self::FinalImageRead { artifacts, .. } => artifacts,
        }
    }

    /// Whether the failing stage's worker could not be started at all.
    #[must_use]
    pub const fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            Self::Stage {
                source: StageError::Launch { .. },
                ..
            }
        )
    }

    /// Message safe to return to HTTP clients.
    ///
    /// Worker-reported messages are forwarded; everything else collapses to a
    /// generic per-stage message so raw output never leaves the server.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Stage {
                stage,
                source: StageError::Reported { message },
                ..
            } => format!("{} failed: {message}", stage.label()),
            other => format!("{} failed.", other.stage().label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_uses_stage_label() {
        let err = PipelineError::Stage {
            stage: StageKind::BackgroundRemoval,
            source: StageError::Timeout {
                timeout: Duration::from_secs(1),
            },
            artifacts: Vec::new(),
        };
        assert_eq!(err.client_message(), "Background removal failed.");

        let err = PipelineError::Stage {
            stage: StageKind::Classification,
            source: StageError::UnexpectedOutput {
                reason: "not_an_object",
                raw: "[1,2]".to_string(),
            },
            artifacts: Vec::new(),
        };
        assert_eq!(err.client_message(), "Prediction failed.");
    }

    #[test]
    fn client_message_forwards_reported_errors() {
        let err = PipelineError::Stage {
            stage: StageKind::Normalization,
            source: StageError::Reported {
                message: "no garment found".to_string(),
            },
            artifacts: Vec::new(),
        };
        assert_eq!(err.client_message(), "Normalization failed: no garment found");
    }

    #[test]
    fn final_image_read_is_attributed_to_normalization() {
        let err = PipelineError::FinalImageRead {
            path: PathBuf::from("/tmp/x.png"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
            artifacts: vec![PathBuf::from("/tmp/u.png"), PathBuf::from("/tmp/x.png")],
        };
        assert_eq!(err.stage(), StageKind::Normalization);
        assert_eq!(err.artifacts().len(), 2);
        assert_eq!(err.client_message(), "Normalization failed.");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn launch_failures_are_distinguished() {
        let launch = PipelineError::Stage {
            stage: StageKind::BackgroundRemoval,
            source: StageError::Launch {
                program: "missing-python".to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "not found"),
            },
            artifacts: vec![PathBuf::from("/tmp/u.png")],
        };
        assert!(launch.is_launch_failure());
        assert_eq!(launch.artifacts(), [PathBuf::from("/tmp/u.png")]);
        assert_eq!(launch.client_message(), "Background removal failed.");

        let reported = PipelineError::Stage {
            stage: StageKind::BackgroundRemoval,
            source: StageError::Reported {
                message: "bad".to_string(),
            },
            artifacts: Vec::new(),
        };
        assert!(!reported.is_launch_failure());
    }

    #[test]
    fn raw_output_is_exposed_for_parse_failures_only() {
        let err = StageError::UnexpectedOutput {
            reason: "missing_output_field",
            raw: "{}".to_string(),
        };
        assert_eq!(err.raw_output(), Some("{}"));
        let err = StageError::Reported {
            message: "boom".to_string(),
        };
        assert_eq!(err.raw_output(), None);
    }
}
