//! Sequencing of the three stages for a single upload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use closet_telemetry::{Metrics, StageStatus, current_request_id};
use tracing::{Instrument, error, info, info_span};

use crate::error::{PipelineError, PipelineResult, StageError, StageResult};
use crate::model::{PipelineOutcome, StageKind, StageOutput};
use crate::stage::Stage;

/// The stage implementations a pipeline runs, one per position.
#[derive(Clone)]
pub struct PipelineStages {
    /// First stage; receives the uploaded image.
    pub background_removal: Arc<dyn Stage>,
    /// Second stage; receives the background-removed image.
    pub normalization: Arc<dyn Stage>,
    /// Final stage; receives the normalised image.
    pub classification: Arc<dyn Stage>,
}

/// Runs background removal, normalization, and classification in order.
///
/// Requests share a `Pipeline`; it holds no per-request state.
#[derive(Clone)]
pub struct Pipeline {
    stages: PipelineStages,
    metrics: Metrics,
}

impl Pipeline {
    /// Build a pipeline over the supplied stages.
    #[must_use]
    pub const fn new(stages: PipelineStages, metrics: Metrics) -> Self {
        Self { stages, metrics }
    }

    /// Process the uploaded image at `input`.
    ///
    /// Stage N+1 is only invoked after stage N succeeded, and always receives
    /// the path stage N reported. The first failure ends the run.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Stage`] naming the failed stage, or
    /// [`PipelineError::FinalImageRead`] when the normalised image cannot be
    /// read back.
    pub async fn run(&self, input: &Path) -> PipelineResult<PipelineOutcome> {
        let span = info_span!(
            "pipeline.run",
            input = %input.display(),
            request_id = %current_request_id().unwrap_or_default()
        );
        self.run_inner(input).instrument(span).await
    }

    async fn run_inner(&self, input: &Path) -> PipelineResult<PipelineOutcome> {
        let _in_flight = InFlight::enter(&self.metrics);
        let started = Instant::now();
        let mut artifacts = vec![input.to_path_buf()];

        let removed_path = self
            .image_stage(StageKind::BackgroundRemoval, &*self.stages.background_removal, input)
            .await
            .map_err(|source| stage_failed(StageKind::BackgroundRemoval, source, &artifacts))?;
        artifacts.push(removed_path.clone());

        let normalized_path = self
            .image_stage(StageKind::Normalization, &*self.stages.normalization, &removed_path)
            .await
            .map_err(|source| stage_failed(StageKind::Normalization, source, &artifacts))?;
        artifacts.push(normalized_path.clone());

        let classified = self
            .run_stage(StageKind::Classification, &*self.stages.classification, &normalized_path)
            .await
            .map_err(|source| stage_failed(StageKind::Classification, source, &artifacts))?;
        if let Some(extra) = classified.output_path
            && !artifacts.contains(&extra)
        {
            artifacts.push(extra);
        }

        let bytes = match tokio::fs::read(&normalized_path).await {
            Ok(bytes) => bytes,
            Err(source) => {
                return Err(PipelineError::FinalImageRead {
                    path: normalized_path,
                    source,
                    artifacts,
                });
            }
        };

        info!(
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            image_bytes = bytes.len(),
            "pipeline completed"
        );

        Ok(PipelineOutcome {
            final_image_path: normalized_path,
            base64_image: STANDARD.encode(&bytes),
            prediction: classified.attributes,
            artifacts,
        })
    }

    /// Run a stage that must report an existing output image.
    async fn image_stage(
        &self,
        kind: StageKind,
        stage: &dyn Stage,
        input: &Path,
    ) -> StageResult<PathBuf> {
        let output = self.run_stage(kind, stage, input).await?;
        require_image(kind, output).await
    }

    async fn run_stage(
        &self,
        kind: StageKind,
        stage: &dyn Stage,
        input: &Path,
    ) -> StageResult<StageOutput> {
        let started = Instant::now();
        let result = stage.invoke(input).await;
        let status = if result.is_ok() {
            StageStatus::Completed
        } else {
            StageStatus::Failed
        };
        self.metrics
            .observe_stage(kind.as_str(), status, started.elapsed());

        result.inspect_err(|source| {
            error!(
                stage = kind.as_str(),
                error = %source,
                detail = ?source,
                raw_output = source.raw_output().unwrap_or_default(),
                "pipeline stage failed"
            );
        })
    }
}

fn stage_failed(kind: StageKind, source: StageError, artifacts: &[PathBuf]) -> PipelineError {
    PipelineError::Stage {
        stage: kind,
        source,
        artifacts: artifacts.to_vec(),
    }
}

async fn require_image(kind: StageKind, output: StageOutput) -> StageResult<PathBuf> {
    let path = output
        .output_path
        .ok_or(StageError::UnexpectedOutput {
            reason: "missing_output_path",
            raw: String::new(),
        })?;
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Ok(path),
        _ => {
            error!(stage = kind.as_str(), path = %path.display(), "stage output file is missing");
            Err(StageError::OutputMissing { path })
        }
    }
}

struct InFlight<'a> {
    metrics: &'a Metrics,
}

impl<'a> InFlight<'a> {
    fn enter(metrics: &'a Metrics) -> Self {
        metrics.pipeline_started();
        Self { metrics }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.metrics.pipeline_finished();
    }
}
