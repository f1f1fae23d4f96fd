//! First-pass universe acquisition with a defensive local post-filter and a
//! criteria-keyed TTL cache.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use provider_router::ProviderRouter;
use rust_decimal::Decimal;
use scanner_core::{ProviderError, ScreenerResult, ScreeningCriteria};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::Mutex;

struct CacheEntry {
    data: Vec<ScreenerResult>,
    cached_at: DateTime<Utc>,
}

/// Content hash of the criteria, used as the cache key.
pub fn criteria_hash(criteria: &ScreeningCriteria) -> String {
    let canonical = serde_json::to_string(criteria).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)
}

/// The upstream screener occasionally under-enforces its filters; apply the
/// exclusions again locally before anything downstream sees the list.
pub fn post_filter(results: Vec<ScreenerResult>, criteria: &ScreeningCriteria) -> Vec<ScreenerResult> {
    let penny_floor = Decimal::ONE;
    results
        .into_iter()
        .filter(|r| {
            if criteria.exclude_etfs && r.is_etf() {
                return false;
            }
            if criteria.exclude_penny_stocks {
                if let Some(price) = r.price {
                    if price < penny_floor {
                        return false;
                    }
                }
            }
            if let Some(floor) = criteria.min_volume {
                if let Some(volume) = r.volume {
                    if volume < floor {
                        return false;
                    }
                }
            }
            true
        })
        .collect()
}

/// Universe screener backed by the router, with results cached per criteria
/// hash for a configurable TTL.
pub struct StockScreener {
    router: Arc<ProviderRouter>,
    cache: DashMap<String, CacheEntry>,
    /// Per-key guards so concurrent scans with identical criteria compute
    /// the screen once instead of stampeding the upstream.
    guards: DashMap<String, Arc<Mutex<()>>>,
    cache_ttl: Duration,
}

impl StockScreener {
    pub fn new(router: Arc<ProviderRouter>) -> Self {
        Self {
            router,
            cache: DashMap::new(),
            guards: DashMap::new(),
            cache_ttl: Duration::hours(24),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    fn cached(&self, key: &str) -> Option<Vec<ScreenerResult>> {
        let entry = self.cache.get(key)?;
        if Utc::now().signed_duration_since(entry.cached_at) < self.cache_ttl {
            Some(entry.data.clone())
        } else {
            None
        }
    }

    /// Screen the universe, bounded by `limit` and sorted by market cap
    /// descending. An upstream with nothing to say yields an empty list, not
    /// an error.
    pub async fn screen(
        &self,
        criteria: &ScreeningCriteria,
        limit: usize,
    ) -> Result<Vec<ScreenerResult>, ProviderError> {
        let key = criteria_hash(criteria);

        if let Some(hit) = self.cached(&key) {
            tracing::debug!(results = hit.len(), "screener cache hit");
            return Ok(truncate(hit, limit));
        }

        let guard = self
            .guards
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _held = guard.lock().await;

        // Another scan may have filled the cache while we waited.
        if let Some(hit) = self.cached(&key) {
            return Ok(truncate(hit, limit));
        }

        let response = self.router.screen_stocks(criteria, None).await;
        let results = response.into_result()?.unwrap_or_default();

        let mut filtered = post_filter(results, criteria);
        filtered.sort_by(|a, b| b.market_cap.cmp(&a.market_cap));

        tracing::info!(
            passed = filtered.len(),
            "universe screened and post-filtered"
        );
        self.cache.insert(
            key,
            CacheEntry {
                data: filtered.clone(),
                cached_at: Utc::now(),
            },
        );

        Ok(truncate(filtered, limit))
    }
}

fn truncate(mut results: Vec<ScreenerResult>, limit: usize) -> Vec<ScreenerResult> {
    results.truncate(limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(symbol: &str, price: Decimal, volume: i64, security_type: Option<&str>) -> ScreenerResult {
        ScreenerResult {
            symbol: symbol.to_string(),
            name: None,
            exchange: Some("NYSE".to_string()),
            market_cap: Some(dec!(1000000000)),
            price: Some(price),
            volume: Some(volume),
            security_type: security_type.map(str::to_string),
        }
    }

    #[test]
    fn hash_is_stable_and_criteria_sensitive() {
        let a = ScreeningCriteria::default();
        let mut b = ScreeningCriteria::default();
        assert_eq!(criteria_hash(&a), criteria_hash(&b));

        b.min_volume = Some(999);
        assert_ne!(criteria_hash(&a), criteria_hash(&b));
    }

    #[test]
    fn post_filter_drops_pennies_etfs_and_thin_volume() {
        let criteria = ScreeningCriteria {
            min_volume: Some(100_000),
            ..ScreeningCriteria::default()
        };
        let filtered = post_filter(
            vec![
                row("GOOD", dec!(42), 500_000, Some("common stock")),
                row("PENY", dec!(0.40), 500_000, None),
                row("FUND", dec!(42), 500_000, Some("ETF")),
                row("THIN", dec!(42), 5_000, None),
            ],
            &criteria,
        );
        let symbols: Vec<&str> = filtered.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["GOOD"]);
    }

    #[test]
    fn post_filter_respects_disabled_exclusions() {
        let criteria = ScreeningCriteria {
            exclude_penny_stocks: false,
            exclude_etfs: false,
            min_volume: None,
            ..ScreeningCriteria::default()
        };
        let filtered = post_filter(
            vec![
                row("PENY", dec!(0.40), 100, None),
                row("FUND", dec!(42), 100, Some("ETF")),
            ],
            &criteria,
        );
        assert_eq!(filtered.len(), 2);
    }
}
