//! Document store error types.
//!
//! Every failure surfaced by the compiler, the batch engine, the session and
//! the sequence generator is a [`VellumError`].

use std::fmt;
use thiserror::Error;

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Internal error (bug).
    Internal = 0x0001,
    /// Invalid argument provided.
    InvalidArgument = 0x0003,
    /// Operation was cancelled.
    Cancelled = 0x0005,

    // Schema errors (0x0100 - 0x01FF)
    /// Document type was never registered.
    UnknownDocumentType = 0x0100,
    /// Document identity is missing or has the wrong shape.
    InvalidIdentity = 0x0101,
    /// A base-typed view of a subclass row was modified.
    SubclassMismatch = 0x0102,

    // Query errors (0x0200 - 0x02FF)
    /// Query shape cannot be translated to SQL.
    CompileFailed = 0x0200,
    /// Wrong number of rows for a cardinality operator.
    CardinalityViolation = 0x0201,

    // Execution errors (0x0300 - 0x03FF)
    /// Query execution failed.
    ExecutionFailed = 0x0300,
    /// Connection could not be opened or was lost.
    ConnectionFailed = 0x0301,
    /// Document payload could not be (de)serialized.
    Serialization = 0x0302,

    // Sequence errors (0x0400 - 0x04FF)
    /// Hi/Lo block reservation failed.
    SequenceAdvanceFailed = 0x0400,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "Schema",
            0x02 => "Query",
            0x03 => "Execution",
            0x04 => "Sequence",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The main error type for Vellum.
///
/// All variants carry owned, cloneable context so that a single failure can
/// be delivered to every pending batch future.
///
/// # Example
///
/// ```rust
/// use vellum_common::error::{ErrorCode, VellumError};
///
/// let err = VellumError::compile("Last() is not supported");
/// assert_eq!(err.code(), ErrorCode::CompileFailed);
/// ```
#[derive(Debug, Clone, Error)]
pub enum VellumError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    /// Operation was cancelled.
    #[error("operation was cancelled")]
    Cancelled,

    // ==========================================================================
    // Schema Errors
    // ==========================================================================
    /// Document type has no registered mapping.
    #[error("document type '{type_name}' is not registered")]
    UnknownDocumentType {
        /// Rust type name of the document.
        type_name: String,
    },

    /// Document identity is missing or malformed.
    #[error("invalid identity for '{type_name}': {reason}")]
    InvalidIdentity {
        /// Rust type name of the document.
        type_name: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A document stored as a subclass was changed through a base-typed handle.
    #[error("document {id} is stored as '{stored_as}' and cannot be written as '{type_name}'")]
    SubclassMismatch {
        /// Type the document was loaded as.
        type_name: String,
        /// Document id.
        id: String,
        /// Type recorded in the row's discriminator.
        stored_as: String,
    },

    // ==========================================================================
    // Query Errors
    // ==========================================================================
    /// Query shape cannot be compiled to SQL.
    #[error("query compile error: {message}")]
    Compile {
        /// Error message.
        message: String,
    },

    /// A cardinality operator resolved against the wrong number of rows.
    #[error("{operator} expected {expected} but the query returned {rows} row(s)")]
    CardinalityViolation {
        /// The operator, e.g. `Single`.
        operator: String,
        /// Human readable expectation, e.g. `exactly one row`.
        expected: String,
        /// Rows actually observed (bounded by the over-fetch limit).
        rows: usize,
    },

    // ==========================================================================
    // Execution Errors
    // ==========================================================================
    /// Query execution failed.
    #[error("query execution failed: {reason}")]
    Execution {
        /// Reason for failure.
        reason: String,
        /// SQLSTATE, when the database reported one.
        sqlstate: Option<String>,
    },

    /// Connection could not be established or was lost.
    #[error("connection failed: {reason}")]
    Connection {
        /// Reason for failure.
        reason: String,
    },

    /// Document payload could not be serialized or deserialized.
    #[error("serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Sequence Errors
    // ==========================================================================
    /// The Hi/Lo block reservation transaction failed.
    #[error("failed to advance hi value for '{entity}': {reason}")]
    SequenceAdvance {
        /// Entity name of the sequence.
        entity: String,
        /// Reason for failure.
        reason: String,
    },
}

/// SQLSTATE class 40 "transaction rollback" (serialization failure, deadlock).
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

impl VellumError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::InvalidConfig { .. } => ErrorCode::InvalidArgument,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::UnknownDocumentType { .. } => ErrorCode::UnknownDocumentType,
            Self::InvalidIdentity { .. } => ErrorCode::InvalidIdentity,
            Self::SubclassMismatch { .. } => ErrorCode::SubclassMismatch,
            Self::Compile { .. } => ErrorCode::CompileFailed,
            Self::CardinalityViolation { .. } => ErrorCode::CardinalityViolation,
            Self::Execution { .. } => ErrorCode::ExecutionFailed,
            Self::Connection { .. } => ErrorCode::ConnectionFailed,
            Self::Serialization { .. } => ErrorCode::Serialization,
            Self::SequenceAdvance { .. } => ErrorCode::SequenceAdvanceFailed,
        }
    }

    /// Returns true if retrying the whole operation might succeed.
    ///
    /// Nothing in Vellum retries on its own; this is a hint for callers.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Execution {
                sqlstate: Some(state),
                ..
            } => state == SERIALIZATION_FAILURE || state == DEADLOCK_DETECTED,
            _ => false,
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a compile error.
    #[must_use]
    pub fn compile(message: impl Into<String>) -> Self {
        Self::Compile {
            message: message.into(),
        }
    }

    /// Creates an execution error without a SQLSTATE.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
            sqlstate: None,
        }
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection {
            reason: reason.into(),
        }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an unknown document type error.
    #[must_use]
    pub fn unknown_document(type_name: impl Into<String>) -> Self {
        Self::UnknownDocumentType {
            type_name: type_name.into(),
        }
    }

    /// Creates a cardinality violation.
    #[must_use]
    pub fn cardinality(operator: impl Into<String>, expected: impl Into<String>, rows: usize) -> Self {
        Self::CardinalityViolation {
            operator: operator.into(),
            expected: expected.into(),
            rows,
        }
    }
}

impl From<serde_json::Error> for VellumError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

impl From<toml::de::Error> for VellumError {
    fn from(e: toml::de::Error) -> Self {
        Self::invalid_config(e.to_string())
    }
}

impl From<toml::ser::Error> for VellumError {
    fn from(e: toml::ser::Error) -> Self {
        Self::invalid_config(e.to_string())
    }
}

impl From<std::io::Error> for VellumError {
    fn from(e: std::io::Error) -> Self {
        Self::invalid_config(format!("I/O error: {e}"))
    }
}
