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

//! Environment-driven configuration for the closet image pipeline service.
//!
//! Layout: `model.rs` (typed config models), `validate.rs` (parsing helpers),
//! `loader.rs` (environment lookup and defaults), `error.rs` (config errors).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use model::{
    AppConfig, LimitsConfig, LoggingSettings, ScratchConfig, ServerConfig, StageCommand,
    StageCommands,
};
