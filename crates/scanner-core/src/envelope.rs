use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::provider::ProviderType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiStatus {
    Ok,
    /// The upstream had nothing for us. An empty screener page or an empty
    /// options chain is business as usual, not a failure.
    NoData,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub remaining: Option<i64>,
    pub reset: Option<DateTime<Utc>>,
    pub retry_after_secs: Option<u64>,
}

/// Uniform result envelope returned by every adapter operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: ApiStatus,
    pub data: Option<T>,
    pub error: Option<ProviderError>,
    pub rate_limit: Option<RateLimitInfo>,
    pub provider: Option<ProviderType>,
    pub latency_ms: Option<u64>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: ApiStatus::Ok,
            data: Some(data),
            error: None,
            rate_limit: None,
            provider: None,
            latency_ms: None,
        }
    }

    pub fn no_data() -> Self {
        Self {
            status: ApiStatus::NoData,
            data: None,
            error: None,
            rate_limit: None,
            provider: None,
            latency_ms: None,
        }
    }

    pub fn err(error: ProviderError) -> Self {
        Self {
            status: ApiStatus::Error,
            data: None,
            error: Some(error),
            rate_limit: None,
            provider: None,
            latency_ms: None,
        }
    }

    pub fn with_provider(mut self, provider: ProviderType) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitInfo) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ApiStatus::Ok
    }

    pub fn is_no_data(&self) -> bool {
        self.status == ApiStatus::NoData
    }

    pub fn is_err(&self) -> bool {
        self.status == ApiStatus::Error
    }

    /// Ok(Some) on success, Ok(None) when the upstream had no data, Err on
    /// failure.
    pub fn into_result(self) -> Result<Option<T>, ProviderError> {
        match self.status {
            ApiStatus::Ok => Ok(self.data),
            ApiStatus::NoData => Ok(None),
            ApiStatus::Error => Err(self
                .error
                .unwrap_or_else(|| ProviderError::Transient("error envelope without error".into()))),
        }
    }
}
