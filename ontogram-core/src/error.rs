//! Error types shared across the Ontogram data layer

use thiserror::Error;

/// Errors surfaced through the [`crate::DataProvider`] contract.
///
/// The split follows the layer's error policy:
/// - `Usage` is raised synchronously, before any I/O, for invalid parameter
///   combinations
/// - `Http` / `Execute` / `Malformed` propagate query-execution failures to
///   the caller; callers (e.g. a federated provider in fetch-all mode)
///   decide whether to tolerate them
#[derive(Error, Debug)]
pub enum DataError {
    /// Invalid parameter combination, detected before any query is issued
    #[error("invalid request: {0}")]
    Usage(String),

    /// The endpoint returned a non-2xx status
    #[error("endpoint returned {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Status text plus response body, if any
        message: String,
    },

    /// Network-level failure or transport misconfiguration
    #[error("query execution failed: {0}")]
    Execute(String),

    /// The response body could not be interpreted
    #[error("malformed response: {0}")]
    Malformed(String),

    /// A graph-shaped query was issued but no graph parser is configured
    #[error("no graph parser configured for CONSTRUCT results")]
    NoGraphParser,
}

impl DataError {
    /// Whether this error represents a caller mistake rather than an
    /// endpoint or transport failure.
    pub fn is_usage(&self) -> bool {
        matches!(self, DataError::Usage(_))
    }
}

/// Result type for data-provider operations
pub type Result<T> = std::result::Result<T, DataError>;
