//! Tree error types

use thiserror::Error;

/// Errors raised while building or querying a tree
#[derive(Debug, Error)]
pub enum TreeError {
    /// A record or query supplied a value the dimension cannot canonicalize
    #[error("dimension '{dimension}' expects {expected}, found {found}")]
    TypeMismatch {
        dimension: String,
        expected: &'static str,
        found: String,
    },

    /// Wrong number of query codes for a comparison operator
    #[error("dimension '{dimension}': {operator} requires {expected} value(s), got {actual}")]
    InvalidArity {
        dimension: String,
        operator: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Operator or array operation name outside the closed set
    #[error("unknown operator: {name}")]
    UnknownOperator { name: String },

    /// Record or query width does not match the dimension list
    #[error("expected {expected} attribute value(s), got {actual}")]
    RecordWidth { expected: usize, actual: usize },

    /// Invalid tree configuration
    #[error("invalid tree configuration: {message}")]
    InvalidConfig { message: String },

    /// Configuration document could not be parsed
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl TreeError {
    /// Create a type mismatch error
    pub fn type_mismatch(
        dimension: impl Into<String>,
        expected: &'static str,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            dimension: dimension.into(),
            expected,
            found: found.into(),
        }
    }

    /// Create an invalid arity error
    pub fn invalid_arity(
        dimension: impl Into<String>,
        operator: &'static str,
        expected: usize,
        actual: usize,
    ) -> Self {
        Self::InvalidArity {
            dimension: dimension.into(),
            operator,
            expected,
            actual,
        }
    }

    /// Create an unknown operator error
    pub fn unknown_operator(name: impl Into<String>) -> Self {
        Self::UnknownOperator { name: name.into() }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Result type alias for tree operations
pub type Result<T> = std::result::Result<T, TreeError>;
