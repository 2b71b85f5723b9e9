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

//! HTTP surface of the closet image pipeline.
//!
//! Layout: `http/router.rs` (server host and middleware), `http/upload.rs`
//! (`POST /remove-bg`), `http/health.rs` (health and metrics), `http/errors.rs`
//! (flat JSON error responses), `http/telemetry.rs` (request metrics layer),
//! `state.rs` (shared handler state), `error.rs` (bind/serve failures).

pub mod error;
pub mod http;
pub mod state;

pub use error::{ApiServerError, ApiServerResult};
pub use http::router::ApiServer;
pub use state::ApiState;
