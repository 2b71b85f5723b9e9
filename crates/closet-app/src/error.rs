//! # Design
//!
//! - Centralize application-level errors for bootstrap and shutdown.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration loading failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: closet_config::ConfigError,
    },
    /// Scratch storage could not be prepared.
    #[error("scratch storage operation failed")]
    Scratch {
        /// Operation identifier.
        operation: &'static str,
        /// Source scratch error.
        source: closet_scratch::ScratchError,
    },
    /// API server operations failed.
    #[error("api server operation failed")]
    ApiServer {
        /// Operation identifier.
        operation: &'static str,
        /// Source API server error.
        source: closet_api::ApiServerError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: closet_telemetry::TelemetryError,
    },
}

impl AppError {
    pub(crate) const fn config(operation: &'static str, source: closet_config::ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn scratch(
        operation: &'static str,
        source: closet_scratch::ScratchError,
    ) -> Self {
        Self::Scratch { operation, source }
    }

    pub(crate) const fn api_server(
        operation: &'static str,
        source: closet_api::ApiServerError,
    ) -> Self {
        Self::ApiServer { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: closet_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }
}
