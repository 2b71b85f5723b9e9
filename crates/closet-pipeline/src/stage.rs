//! The seam between the orchestrator and whatever executes a stage.

use std::path::Path;

use async_trait::async_trait;

use crate::error::StageResult;
use crate::model::{StageKind, StageOutput};

/// One step of the image pipeline.
///
/// Implementations receive the path produced by the previous stage (or the
/// uploaded image for the first stage) and report where their own result lives.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Which pipeline position this stage implements.
    fn kind(&self) -> StageKind;

    /// Process the image at `input`.
    async fn invoke(&self, input: &Path) -> StageResult<StageOutput>;
}
