//! Stage identities and the values flowing between stages.

use std::fmt;
use std::path::PathBuf;

use serde_json::{Map, Value};

/// The three fixed pipeline positions, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Strip the photo background.
    BackgroundRemoval,
    /// Crop, resize, and centre the garment on a square canvas.
    Normalization,
    /// Predict garment type, color, and pattern.
    Classification,
}

impl StageKind {
    /// Execution order.
    pub const ALL: [Self; 3] = [
        Self::BackgroundRemoval,
        Self::Normalization,
        Self::Classification,
    ];

    /// Stable identifier used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BackgroundRemoval => "background_removal",
            Self::Normalization => "normalization",
            Self::Classification => "classification",
        }
    }

    /// Human-readable name used in client-facing error messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::BackgroundRemoval => "Background removal",
            Self::Normalization => "Normalization",
            Self::Classification => "Prediction",
        }
    }

    /// JSON field the bundled worker uses to report its output image.
    #[must_use]
    pub const fn default_output_field(self) -> Option<&'static str> {
        match self {
            Self::BackgroundRemoval => Some("output_path"),
            Self::Normalization => Some("normalized_path"),
            Self::Classification => None,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalised result of one successful stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutput {
    /// Image written by the stage, if it produced one.
    pub output_path: Option<PathBuf>,
    /// Every other attribute the stage reported.
    pub attributes: Map<String, Value>,
}

impl StageOutput {
    /// Output that only carries an image path.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: Some(path.into()),
            attributes: Map::new(),
        }
    }

    /// Output that only carries attributes.
    #[must_use]
    pub const fn with_attributes(attributes: Map<String, Value>) -> Self {
        Self {
            output_path: None,
            attributes,
        }
    }
}

/// Terminal result of a successful pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    /// Normalised image returned to the client.
    pub final_image_path: PathBuf,
    /// Standard base64 of the final image bytes, without a data-URI prefix.
    pub base64_image: String,
    /// Classification attributes (`type`, `color`, `pattern`, ...).
    pub prediction: Map<String, Value>,
    /// Every file involved in the run: the input followed by stage outputs.
    pub artifacts: Vec<PathBuf>,
}
