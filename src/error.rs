//! Error types for the pipeline
//!
//! The error set is closed: configuration problems surface at node
//! construction, upstream errors are re-emitted unchanged, type errors
//! surface from iterators on the offending `next()`, and cancellation is
//! reported as a terminal condition rather than a failure.

use thiserror::Error;

/// Main error type for the pipeline
///
/// Errors are cheap to clone so a node can fan a single failure out to
/// every downstream.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Invalid or missing configuration, raised at node construction
    #[error("Configuration error: {0}")]
    Config(String),

    /// An error received from an upstream node, re-emitted unchanged
    #[error("Upstream error from '{node}': {message}")]
    Upstream {
        /// Id of the node the error originated from
        node: String,
        /// Human-readable description
        message: String,
    },

    /// A series exposed data violating an invariant (timestamps out of
    /// order, array interval absent, ...)
    #[error("Type error: {0}")]
    Type(String),

    /// Operation aborted by the cancellation token
    #[error("Cancelled")]
    Cancelled,
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Create an upstream error attributed to the given node
    pub fn upstream(node: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Upstream {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Create a type error
    pub fn type_error(message: impl Into<String>) -> Self {
        Error::Type(message.into())
    }

    /// True if this error represents cancellation rather than failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
