#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(
    missing_docs,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]

//! Image processing pipeline: background removal, normalization, classification.
//!
//! Each stage is an implementation of [`Stage`]; the production implementation
//! ([`ProcessStage`]) runs an external worker and reads one JSON object from its
//! standard output. [`Pipeline`] threads the output path of each stage into the
//! next and stops at the first failure.
//!
//! Layout: `model.rs` (stage kinds and outputs), `stage.rs` (the `Stage` trait),
//! `process.rs` (subprocess adapter), `orchestrator.rs` (sequencing),
//! `error.rs` (stage and pipeline errors).

pub mod error;
pub mod model;
pub mod orchestrator;
pub mod process;
pub mod stage;

pub use error::{PipelineError, PipelineResult, StageError, StageResult};
pub use model::{PipelineOutcome, StageKind, StageOutput};
pub use orchestrator::{Pipeline, PipelineStages};
pub use process::{ProcessStage, parse_stage_output};
pub use stage::Stage;
