// Error taxonomy for the proximity query path
// Every failure keeps its kind all the way up to the caller

use thiserror::Error;

/// Errors surfaced by the query engine, the pool, and configuration.
///
/// An empty result always means "zero matches". Nothing in this crate turns
/// one of these into an empty result.
#[derive(Debug, Error)]
pub enum NearbyError {
    /// Malformed coordinates (non-finite or outside WGS84 ranges)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No connection became available within the acquisition timeout
    #[error("connection pool exhausted after waiting {waited_ms} ms")]
    PoolExhausted { waited_ms: u64 },

    /// Connectivity, timeout, or driver failure talking to the store
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Configuration could not be built or failed validation
    #[error("configuration error: {0}")]
    Config(String),
}

impl NearbyError {
    /// Whether the caller may retry (with its own backoff policy).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NearbyError::PoolExhausted { .. } | NearbyError::StoreUnavailable(_)
        )
    }

    /// Short machine-readable kind, used in logs and HTTP bodies
    pub fn kind(&self) -> &'static str {
        match self {
            NearbyError::InvalidRequest(_) => "invalid_request",
            NearbyError::PoolExhausted { .. } => "pool_exhausted",
            NearbyError::StoreUnavailable(_) => "store_unavailable",
            NearbyError::Config(_) => "config",
        }
    }
}

impl From<rusqlite::Error> for NearbyError {
    fn from(err: rusqlite::Error) -> Self {
        NearbyError::StoreUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NearbyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(NearbyError::PoolExhausted { waited_ms: 10 }.is_retryable());
        assert!(NearbyError::StoreUnavailable("down".into()).is_retryable());
        assert!(!NearbyError::InvalidRequest("lat".into()).is_retryable());
        assert!(!NearbyError::Config("pool_size".into()).is_retryable());
    }

    #[test]
    fn test_driver_errors_become_store_unavailable() {
        let err: NearbyError = rusqlite::Error::InvalidQuery.into();
        assert_eq!(err.kind(), "store_unavailable");
    }
}
