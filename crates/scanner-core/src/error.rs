use thiserror::Error;

use crate::provider::{Operation, ProviderType};

/// Error taxonomy shared by every adapter and the router.
#[derive(Error, Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ProviderError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{provider} does not support {operation}")]
    NotSupported {
        provider: ProviderType,
        operation: Operation,
    },

    #[error("authentication rejected: {0}")]
    Authentication(String),

    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("transient error: {0}")]
    Transient(String),

    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("unexpected response shape: {0}")]
    Parse(String),

    #[error("upstream HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("circuit open for {0}")]
    CircuitOpen(ProviderType),

    #[error("no usable provider for {operation}")]
    NoProvider { operation: Operation },

    #[error("daily budget exhausted: {0}")]
    BudgetExhausted(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Worth retrying against the same adapter.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Transient(_)
                | ProviderError::Timeout { .. }
                | ProviderError::RateLimited { .. }
        )
    }

    /// Counts toward the adapter's circuit breaker. Authentication failures
    /// are a configuration problem, not an adapter health problem; routing
    /// misses and budget skips never touch the breaker.
    pub fn trips_breaker(&self) -> bool {
        !matches!(
            self,
            ProviderError::Authentication(_)
                | ProviderError::NotSupported { .. }
                | ProviderError::CircuitOpen(_)
                | ProviderError::NoProvider { .. }
                | ProviderError::BudgetExhausted(_)
                | ProviderError::Config(_)
                | ProviderError::Cancelled
        )
    }
}
