// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for graph operations.
//!
//! Single-item operations fail with a [`GraphError`]. Batch operations keep
//! going after a failed item and report everything at the end as a
//! [`BatchError`], leaving the successful items applied.

use crate::validation::RejectReason;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result type alias for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Machine-checkable error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed or conflicting node input
    InvalidNodeData,
    /// Malformed or conflicting edge input
    InvalidEdgeData,
    /// The connection rules rejected an edge
    ConnectionValidationFailed,
    /// A snapshot could not be encoded
    SerializationError,
    /// A snapshot could not be decoded
    DeserializationError,
}

/// Error type for all store operations.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Node input was rejected
    #[error("Invalid node data: {message}")]
    InvalidNodeData {
        /// What went wrong
        message: String,
        /// Offending ids and fields
        details: Value,
    },

    /// Edge input was rejected
    #[error("Invalid edge data: {message}")]
    InvalidEdgeData {
        /// What went wrong
        message: String,
        /// Offending ids and fields
        details: Value,
    },

    /// Ports cannot be connected
    #[error("Connection validation failed: {reason}")]
    ConnectionValidationFailed {
        /// Rule that rejected the connection
        reason: RejectReason,
        /// Offending ids
        details: Value,
    },

    /// Encoding a snapshot failed
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error details
        message: String,
        /// Underlying encoder error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Decoding a snapshot failed
    #[error("Deserialization error: {message}")]
    Deserialization {
        /// Error details
        message: String,
        /// Underlying decoder error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl GraphError {
    /// Create an [`GraphError::InvalidNodeData`] error.
    pub fn invalid_node(message: impl Into<String>, details: Value) -> Self {
        Self::InvalidNodeData {
            message: message.into(),
            details,
        }
    }

    /// Create an [`GraphError::InvalidEdgeData`] error.
    pub fn invalid_edge(message: impl Into<String>, details: Value) -> Self {
        Self::InvalidEdgeData {
            message: message.into(),
            details,
        }
    }

    /// Create a [`GraphError::ConnectionValidationFailed`] error.
    pub fn rejected(reason: RejectReason, details: Value) -> Self {
        Self::ConnectionValidationFailed { reason, details }
    }

    /// Create a serialization error from a message and optional source.
    pub fn serialization<E>(message: impl Into<String>, source: Option<E>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Serialization {
            message: message.into(),
            source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
        }
    }

    /// Create a deserialization error from a message and optional source.
    pub fn deserialization<E>(message: impl Into<String>, source: Option<E>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Deserialization {
            message: message.into(),
            source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
        }
    }

    /// The category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidNodeData { .. } => ErrorKind::InvalidNodeData,
            Self::InvalidEdgeData { .. } => ErrorKind::InvalidEdgeData,
            Self::ConnectionValidationFailed { .. } => ErrorKind::ConnectionValidationFailed,
            Self::Serialization { .. } => ErrorKind::SerializationError,
            Self::Deserialization { .. } => ErrorKind::DeserializationError,
        }
    }

    /// Diagnostic payload, if the variant carries one
    pub fn details(&self) -> Option<&Value> {
        match self {
            Self::InvalidNodeData { details, .. }
            | Self::InvalidEdgeData { details, .. }
            | Self::ConnectionValidationFailed { details, .. } => Some(details),
            Self::Serialization { .. } | Self::Deserialization { .. } => None,
        }
    }
}

/// A single failed item of a batch operation
#[derive(Debug)]
pub struct BatchFailure<I> {
    /// The input that failed
    pub item: I,
    /// Why it failed
    pub error: GraphError,
}

/// Aggregate error for batch operations.
///
/// The store is left in the state produced by `successes`.
#[derive(Debug, Error)]
#[error("{} batch items failed, {} succeeded", .failures.len(), .successes.len())]
pub struct BatchError<T: fmt::Debug, I: fmt::Debug> {
    /// Results of the items that were applied
    pub successes: Vec<T>,
    /// Items that were rejected
    pub failures: Vec<BatchFailure<I>>,
}

impl<T: fmt::Debug, I: fmt::Debug> BatchError<T, I> {
    /// Build the batch outcome: `Ok` when nothing failed.
    pub fn check(successes: Vec<T>, failures: Vec<BatchFailure<I>>) -> std::result::Result<Vec<T>, Self> {
        if failures.is_empty() {
            Ok(successes)
        } else {
            Err(Self {
                successes,
                failures,
            })
        }
    }

    /// Kinds of all failures, in input order
    pub fn failure_kinds(&self) -> Vec<ErrorKind> {
        self.failures.iter().map(|f| f.error.kind()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invalid_node_message() {
        let err = GraphError::invalid_node("node id is empty", json!({ "id": "" }));
        assert_eq!(err.to_string(), "Invalid node data: node id is empty");
        assert_eq!(err.kind(), ErrorKind::InvalidNodeData);
        assert_eq!(err.details(), Some(&json!({ "id": "" })));
    }

    #[test]
    fn test_rejected_message() {
        let err = GraphError::rejected(RejectReason::SameDirection, json!({}));
        assert_eq!(err.kind(), ErrorKind::ConnectionValidationFailed);
        assert!(err.to_string().starts_with("Connection validation failed"));
    }

    #[test]
    fn test_serialization_error_has_no_details() {
        let err = GraphError::serialization("bad snapshot", None::<std::io::Error>);
        assert_eq!(err.kind(), ErrorKind::SerializationError);
        assert!(err.details().is_none());
        assert_eq!(err.to_string(), "Serialization error: bad snapshot");
    }

    #[test]
    fn test_batch_check() {
        let ok: std::result::Result<Vec<u32>, BatchError<u32, &str>> =
            BatchError::check(vec![1, 2], vec![]);
        assert_eq!(ok.unwrap(), vec![1, 2]);

        let failure = BatchFailure {
            item: "b",
            error: GraphError::invalid_edge("missing id", json!({})),
        };
        let err = BatchError::check(vec![1], vec![failure]).unwrap_err();
        assert_eq!(err.to_string(), "1 batch items failed, 1 succeeded");
        assert_eq!(err.failure_kinds(), vec![ErrorKind::InvalidEdgeData]);
    }
}
