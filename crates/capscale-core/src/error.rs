//! Error types for capscale configuration and collaborator calls.

use thiserror::Error;

/// Result type alias for configuration loading and validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for control-plane and metrics calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised while loading or validating a policy configuration.
///
/// These are fatal: a run must not start while any is outstanding.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config at {path}: {reason}")]
    Invalid { path: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors returned by the control plane or metrics source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("{operation} failed for {resource}: {message}")]
    Request {
        operation: &'static str,
        resource: String,
        message: String,
    },
}

impl ClientError {
    pub fn request(
        operation: &'static str,
        resource: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ClientError::Request {
            operation,
            resource: resource.into(),
            message: message.into(),
        }
    }
}
