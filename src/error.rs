//! Error types for network construction, inference and learning.

use thiserror::Error;

/// Errors surfaced by the network engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BeliefError {
    /// Graph or table shape is inconsistent (cycles, bad edges, incomplete tables, row lengths).
    #[error("Structure error: {0}")]
    Structure(String),

    /// A query was issued before a successful `bake()`.
    #[error("Network has not been baked; call bake() before querying")]
    UnbakedNetwork,

    /// Evidence or a record names a state that does not exist.
    #[error("Unknown variable '{name}'")]
    UnknownVariable { name: String },

    /// A value outside the declared domain of a variable.
    #[error("Value '{value}' is not in the domain of '{variable}'")]
    InvalidValue { variable: String, value: String },

    /// Probabilities are negative, non-finite, or do not sum to one.
    #[error("Distribution mismatch in {context}: sum = {sum} (expected 1.0)")]
    DistributionMismatch { context: String, sum: f64 },

    /// Invalid configuration or learning parameter.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BeliefError {
    pub(crate) fn structure(msg: impl Into<String>) -> Self {
        BeliefError::Structure(msg.into())
    }

    pub(crate) fn invalid_value(variable: &str, value: &str) -> Self {
        BeliefError::InvalidValue {
            variable: variable.to_string(),
            value: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for BeliefError {
    fn from(e: serde_json::Error) -> Self {
        BeliefError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BeliefError>;
