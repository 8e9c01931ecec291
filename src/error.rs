//! Error types for materialization.
//!
//! Skip decisions are not errors and never appear here; see
//! [`ConversionOutcome`](crate::types::ConversionOutcome).

use crate::convert::Strategy;
use serde_json::Value;
use thiserror::Error;

/// Fatal misconfiguration, detected at plan build time or at first use
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("type '{type_name}' exposes no settable members")]
    NoSettableMembers { type_name: &'static str },

    #[error("type '{type_name}' declares member '{member}' more than once")]
    DuplicateMember { type_name: &'static str, member: String },

    #[error("invalid compile options: {0}")]
    InvalidCompileOptions(String),

    #[error("unknown culture '{0}'")]
    UnknownCulture(String),

    #[error("member '{member}' resolved to UseCustomValue but no fallback provider is configured")]
    MissingFallbackProvider { member: String },

    #[error("{source_name} value for member '{member}' does not fit target type {target_type}")]
    ValueTypeMismatch {
        member: String,
        target_type: String,
        source_name: &'static str,
    },

    #[error("diagnostic sink is not safe for concurrent use; parallel materialization requires one")]
    UnsafeParallelSink,
}

/// Failure surfaced by any materialization mode
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("cannot convert {attempted_value} to {target_type} for member '{member}' at row {row_index} ({strategy}): {reason}")]
    Conversion {
        row_index: usize,
        member: String,
        attempted_value: Value,
        target_type: String,
        strategy: Strategy,
        reason: String,
    },
}

impl MaterializeError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, MaterializeError::Configuration(_))
    }

    /// Member named in the error context, if any
    pub fn member(&self) -> Option<&str> {
        match self {
            MaterializeError::Conversion { member, .. } => Some(member),
            MaterializeError::Configuration(ConfigError::MissingFallbackProvider { member })
            | MaterializeError::Configuration(ConfigError::ValueTypeMismatch { member, .. }) => Some(member),
            MaterializeError::Configuration(_) => None,
        }
    }

    pub fn row_index(&self) -> Option<usize> {
        match self {
            MaterializeError::Conversion { row_index, .. } => Some(*row_index),
            MaterializeError::Configuration(_) => None,
        }
    }
}

/// Result type for materialization operations
pub type Result<T> = std::result::Result<T, MaterializeError>;
