//! Error types and handling for llmskit-core operations.
//!
//! Expected operational outcomes (a 404, a WAF block, a malformed document,
//! a validation finding) are represented as values inside the structured
//! result types and are never raised through this module. The [`Error`] enum
//! covers the remaining failure classes: programmer errors, I/O and
//! serialization failures, resource-limit exceedance, and cancellation.
//!
//! Errors carry a coarse category for logging/metrics and a recoverability
//! hint for retry logic:
//!
//! ```rust
//! use llmskit_core::Error;
//!
//! let err = Error::Timeout("request deadline exceeded".to_string());
//! assert!(err.is_recoverable());
//! assert_eq!(err.category(), "timeout");
//! ```

use thiserror::Error;

/// The main error type for llmskit-core operations.
///
/// All public fallible functions in this crate return `Result<T, Error>`.
/// The error type includes automatic conversion from common standard library
/// and HTTP-client errors and preserves the full source chain through
/// `source()`.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    ///
    /// Covers backing-store file operations. The underlying
    /// `std::io::Error` is preserved for detailed inspection.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network operation failed at the transport layer.
    ///
    /// Only surfaces for failures the fetcher cannot classify into a
    /// [`FetchStatus`](crate::FetchStatus) value, such as a request built
    /// against an already-closed client. Classified outcomes (DNS failure,
    /// timeout, HTTP error codes) are values, not errors.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Content could not be parsed.
    ///
    /// The llms.txt parser itself never fails; this covers re-parse of
    /// persisted payloads and similar internal parse steps.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Backing-store operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A domain argument was empty or malformed.
    ///
    /// Passing an empty or whitespace-only domain is a programmer error;
    /// callers should validate input rather than handle this at runtime.
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    /// A URL argument could not be parsed or used.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A configured resource limit was exceeded.
    ///
    /// Used when an operation would exceed bounds such as the maximum
    /// response body size.
    #[error("Resource limited: {0}")]
    ResourceLimited(String),

    /// Operation exceeded its wall-clock deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The operation was cancelled through its cancellation token.
    ///
    /// Distinct from failure: cancellation aborts pending I/O and leaves no
    /// partial cache state behind.
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic error for uncategorized failures.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Error {
    /// Check if the error might be recoverable through retry logic.
    ///
    /// Returns `true` for errors that are typically temporary (timeouts,
    /// connection failures, interrupted I/O) and `false` for permanent ones
    /// (invalid arguments, parse failures, cancellation).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Get the error category as a static string identifier.
    ///
    /// Useful for grouping errors in logs and metrics.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Network(_) => "network",
            Self::Parse(_) => "parse",
            Self::Storage(_) => "storage",
            Self::InvalidDomain(_) => "invalid_domain",
            Self::InvalidUrl(_) => "invalid_url",
            Self::ResourceLimited(_) => "resource_limited",
            Self::Timeout(_) => "timeout",
            Self::Serialization(_) => "serialization",
            Self::Cancelled => "cancelled",
            Self::Other(_) => "other",
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
