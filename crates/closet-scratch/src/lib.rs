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

//! Scratch storage for uploaded and intermediate pipeline images.
//!
//! Layout: `service.rs` (`ScratchDir`: ensure, persist, cleanup, sweep),
//! `model.rs` (upload and sweep records), `error.rs` (scratch errors).

pub mod error;
pub mod model;
pub mod service;

pub use error::{ScratchError, ScratchResult};
pub use model::{SweepReport, UploadedImage};
pub use service::ScratchDir;
