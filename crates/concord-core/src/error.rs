//! Configuration errors raised before any judge is queried.

use thiserror::Error;

/// A request or registry change that cannot be honoured.
///
/// These fail fast: no judge call is issued once one is raised.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Insufficient enabled models: {required} required, {enabled} enabled")]
    InsufficientModels { required: usize, enabled: usize },

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Invalid configuration for {model}: {reason}")]
    InvalidModelConfig { model: String, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
