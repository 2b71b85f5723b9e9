//! Error types for configuration loading.
//!
//! # Design
//! - Keep error messages constant; carry the offending key and value as fields.
//! - Reasons are machine-readable `&'static str` tags.

use std::io;

use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Primary error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Environment variable that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// The directory of the running executable could not be resolved.
    #[error("failed to resolve server directory")]
    ServerDir {
        /// Underlying IO error.
        source: io::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: &'static str, value: &str) -> Self {
        Self::InvalidField {
            field,
            reason,
            value: Some(value.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn config_error_messages_are_constant() {
        let invalid = ConfigError::invalid("PORT", "out_of_range", "70000");
        assert_eq!(invalid.to_string(), "invalid configuration field");
        assert!(matches!(
            invalid,
            ConfigError::InvalidField {
                field: "PORT",
                reason: "out_of_range",
                value: Some(ref value),
            } if value == "70000"
        ));

        let server_dir = ConfigError::ServerDir {
            source: io::Error::other("no exe"),
        };
        assert_eq!(server_dir.to_string(), "failed to resolve server directory");
        assert!(server_dir.source().is_some());
    }
}
