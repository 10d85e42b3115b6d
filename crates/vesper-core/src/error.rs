//! Error Types
//!
//! One taxonomy for the whole engine. Validation and not-found are client
//! errors, rate limiting carries an HTTP-style status code, infrastructure
//! failures map to `Timeout` or `Internal`. Detected conflicts are returned
//! as data and never raised through this type.

use std::time::Duration;

/// Engine-wide error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum VesperError {
    /// Input failed schema or bounds validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested record does not exist in the given namespace
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request denied by the rate limiter.
    ///
    /// `status_code` is 429 for an exhausted window and 503 when the
    /// limiter's control store is unreachable and fail-closed is in effect.
    #[error("Rate limited ({status_code}), retry after {retry_after:?}")]
    RateLimited {
        status_code: u16,
        retry_after: Duration,
        headers: Vec<(String, String)>,
    },

    /// An externally-awaited operation exceeded its deadline
    #[error("Timeout after {0:?}: {1}")]
    Timeout(Duration, String),

    /// Relational store error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Cache adapter error (connection refused, protocol error, ...)
    #[error("Cache error: {0}")]
    Cache(String),

    /// Vector index adapter error
    #[error("Vector index error: {0}")]
    Vector(String),

    /// Embedding service error
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unrecovered internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Engine-wide result type
pub type Result<T> = std::result::Result<T, VesperError>;

impl VesperError {
    /// Stable machine-readable kind, used in tool responses and logs
    pub fn kind(&self) -> &'static str {
        match self {
            VesperError::Validation(_) => "validation",
            VesperError::NotFound(_) => "not_found",
            VesperError::RateLimited { .. } => "rate_limited",
            VesperError::Timeout(..) => "timeout",
            VesperError::Database(_)
            | VesperError::Cache(_)
            | VesperError::Vector(_)
            | VesperError::Embedding(_)
            | VesperError::Io(_) => "infra",
            VesperError::Internal(_) => "internal",
        }
    }

    /// True for errors the caller can fix by changing the request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            VesperError::Validation(_)
                | VesperError::NotFound(_)
                | VesperError::RateLimited { status_code: 429, .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(VesperError::Validation("x".into()).kind(), "validation");
        assert_eq!(VesperError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(
            VesperError::Timeout(Duration::from_secs(1), "upsert".into()).kind(),
            "timeout"
        );
        assert_eq!(VesperError::Cache("refused".into()).kind(), "infra");
        assert_eq!(VesperError::Internal("boom".into()).kind(), "internal");
    }

    #[test]
    fn test_rate_limited_classification() {
        let denied = VesperError::RateLimited {
            status_code: 429,
            retry_after: Duration::from_secs(30),
            headers: vec![],
        };
        assert!(denied.is_client_error());

        let store_down = VesperError::RateLimited {
            status_code: 503,
            retry_after: Duration::from_secs(5),
            headers: vec![],
        };
        assert!(!store_down.is_client_error());
        assert_eq!(store_down.kind(), "rate_limited");
    }

    #[test]
    fn test_validation_is_client_error() {
        assert!(VesperError::Validation("bad vector".into()).is_client_error());
        assert!(!VesperError::Internal("bug".into()).is_client_error());
    }
}
