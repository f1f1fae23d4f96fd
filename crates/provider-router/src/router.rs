use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use scanner_core::{
    AiInsights, ApiResponse, Bar, BarPeriod, CalendarEvent, CalendarEventType, DataProvider,
    EconomicEvent, EnhancedStockData, FundamentalMetrics, FundamentalRiskMetrics, MarketContext,
    NewsItem, Operation, OptionChain, PmccCandidate, ProviderError, ProviderHealth, ProviderType,
    ScreenerResult, ScreeningCriteria, StockQuote, TechnicalIndicators,
};
use tokio::sync::Semaphore;

use crate::circuit_breaker::CircuitBreaker;
use crate::health::HealthTracker;

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub max_retries: u32,
    /// Initial backoff in seconds; doubles on each retry.
    pub retry_backoff_secs: f64,
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
    pub max_concurrent_per_provider: usize,
    pub call_timeout_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_secs: 1.0,
            failure_threshold: 5,
            cooldown_secs: 600,
            max_concurrent_per_provider: 10,
            call_timeout_secs: 30,
        }
    }
}

struct RegisteredProvider {
    adapter: Arc<dyn DataProvider>,
    breaker: Mutex<CircuitBreaker>,
    health: RwLock<HealthTracker>,
    permits: Arc<Semaphore>,
}

/// Routes each operation to the best available adapter, with circuit
/// breaking, retry/backoff and fallback across providers.
pub struct ProviderRouter {
    providers: HashMap<ProviderType, RegisteredProvider>,
    preferences: HashMap<Operation, ProviderType>,
    config: RouterConfig,
}

impl ProviderRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            providers: HashMap::new(),
            preferences: Self::default_preferences(),
            config,
        }
    }

    /// Default per-operation routing: the fundamentals provider screens, the
    /// options provider quotes, the AI provider analyzes.
    fn default_preferences() -> HashMap<Operation, ProviderType> {
        use Operation::*;
        use ProviderType::*;
        HashMap::from([
            (ScreenStocks, Eodhd),
            (GetFundamentalData, Eodhd),
            (GetCalendarEvents, Eodhd),
            (GetTechnicalIndicators, Eodhd),
            (GetRiskMetrics, Eodhd),
            (GetCompanyNews, Eodhd),
            (GetEconomicEvents, Eodhd),
            (GetHistoricalPrices, Eodhd),
            (GetEnhancedStockData, Eodhd),
            (GetStockQuote, MarketData),
            (GetStockQuotes, MarketData),
            (GetOptionsChain, MarketData),
            (AnalyzePmccOpportunity, Claude),
        ])
    }

    pub fn register(&mut self, adapter: Arc<dyn DataProvider>) {
        let provider_type = adapter.provider_type();
        self.providers.insert(
            provider_type,
            RegisteredProvider {
                adapter,
                breaker: Mutex::new(CircuitBreaker::new(
                    self.config.failure_threshold,
                    Duration::from_secs(self.config.cooldown_secs),
                )),
                health: RwLock::new(HealthTracker::new()),
                permits: Arc::new(Semaphore::new(self.config.max_concurrent_per_provider)),
            },
        );
        tracing::info!(provider = %provider_type, "registered provider");
    }

    pub fn with_preference(mut self, operation: Operation, provider: ProviderType) -> Self {
        self.preferences.insert(operation, provider);
        self
    }

    pub fn registered_providers(&self) -> Vec<ProviderType> {
        self.providers.keys().copied().collect()
    }

    pub fn provider_health(&self, provider: ProviderType) -> Option<ProviderHealth> {
        self.providers
            .get(&provider)
            .map(|reg| reg.health.read().unwrap().snapshot())
    }

    /// Ordered candidate list for an operation: preferred first, then the
    /// default, then anything else that supports it.
    fn candidates_for(&self, operation: Operation, preferred: Option<ProviderType>) -> Vec<ProviderType> {
        let mut ordered: Vec<ProviderType> = Vec::new();
        let mut push = |pt: ProviderType, ordered: &mut Vec<ProviderType>| {
            if !ordered.contains(&pt) {
                ordered.push(pt);
            }
        };

        if let Some(p) = preferred {
            push(p, &mut ordered);
        }
        if let Some(&p) = self.preferences.get(&operation) {
            push(p, &mut ordered);
        }
        for &p in self.providers.keys() {
            push(p, &mut ordered);
        }

        ordered.retain(|pt| {
            self.providers
                .get(pt)
                .map(|reg| reg.adapter.supports_operation(operation))
                .unwrap_or(false)
        });
        ordered
    }

    fn is_usable(&self, provider: ProviderType) -> bool {
        let Some(reg) = self.providers.get(&provider) else {
            return false;
        };
        let healthy = reg.health.read().unwrap().snapshot().status.is_usable();
        let breaker_ok = reg.breaker.lock().unwrap().can_attempt();
        healthy && breaker_ok
    }

    /// Generic routing driver: resolve candidates, attempt each in order with
    /// retry/backoff, record outcomes, fall through to the next on failure.
    async fn execute<T, F, Fut>(
        &self,
        operation: Operation,
        preferred: Option<ProviderType>,
        call: F,
    ) -> ApiResponse<T>
    where
        F: Fn(Arc<dyn DataProvider>) -> Fut,
        Fut: Future<Output = ApiResponse<T>>,
    {
        let supported = self.candidates_for(operation, preferred);
        if supported.is_empty() {
            tracing::warn!(%operation, "no registered provider supports operation");
            return ApiResponse::err(ProviderError::NoProvider { operation });
        }

        let usable: Vec<ProviderType> = supported
            .iter()
            .copied()
            .filter(|&pt| self.is_usable(pt))
            .collect();
        if usable.is_empty() {
            // All supporting adapters are unhealthy or open: fail fast
            // without touching the network.
            tracing::warn!(%operation, "all supporting providers unhealthy or circuit-open");
            return ApiResponse::err(ProviderError::NoProvider { operation });
        }

        let mut last_error: Option<ProviderError> = None;
        for provider_type in usable {
            let reg = &self.providers[&provider_type];

            if !reg.breaker.lock().unwrap().try_acquire() {
                continue;
            }

            match self.attempt(operation, provider_type, reg, &call).await {
                Ok(response) => return response,
                Err(error) => {
                    tracing::warn!(
                        %operation,
                        provider = %provider_type,
                        %error,
                        "provider attempt failed, trying fallback"
                    );
                    last_error = Some(error);
                }
            }
        }

        ApiResponse::err(
            last_error.unwrap_or(ProviderError::NoProvider { operation }),
        )
    }

    /// One adapter's attempt, including its internal retry loop. Success and
    /// failure are recorded against the adapter's breaker and health.
    async fn attempt<T, F, Fut>(
        &self,
        operation: Operation,
        provider_type: ProviderType,
        reg: &RegisteredProvider,
        call: &F,
    ) -> Result<ApiResponse<T>, ProviderError>
    where
        F: Fn(Arc<dyn DataProvider>) -> Fut,
        Fut: Future<Output = ApiResponse<T>>,
    {
        let _permit = Arc::clone(&reg.permits)
            .acquire_owned()
            .await
            .map_err(|_| ProviderError::Transient("provider permits closed".into()))?;

        let timeout = Duration::from_secs(self.config.call_timeout_secs);
        let mut backoff = self.config.retry_backoff_secs;
        let mut error = ProviderError::Transient("no attempt made".into());

        for attempt in 0..=self.config.max_retries {
            let started = Instant::now();
            let response = match tokio::time::timeout(timeout, call(Arc::clone(&reg.adapter))).await
            {
                Ok(response) => response,
                Err(_) => ApiResponse::err(ProviderError::Timeout {
                    secs: self.config.call_timeout_secs,
                }),
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            if !response.is_err() {
                reg.breaker.lock().unwrap().record_success();
                reg.health.write().unwrap().record_success(latency_ms);
                return Ok(response
                    .with_provider(provider_type)
                    .with_latency(latency_ms));
            }

            error = response
                .error
                .unwrap_or_else(|| ProviderError::Transient("error envelope without error".into()));

            if !error.is_retryable() || attempt == self.config.max_retries {
                break;
            }

            let wait_secs = match &error {
                ProviderError::RateLimited {
                    retry_after_secs: Some(secs),
                } => *secs as f64,
                _ => backoff,
            };
            tracing::debug!(
                %operation,
                provider = %provider_type,
                attempt = attempt + 1,
                wait_secs,
                "retrying after transient failure"
            );
            tokio::time::sleep(Duration::from_secs_f64(wait_secs)).await;
            backoff *= 2.0;
        }

        // Retries exhausted (or the error was never retryable): this attempt
        // counts once against the breaker. Config-class errors never open a
        // closed breaker, but a failed half-open probe must still re-open it.
        {
            let mut breaker = reg.breaker.lock().unwrap();
            if error.trips_breaker() || breaker.state() == crate::circuit_breaker::CircuitState::HalfOpen
            {
                breaker.record_failure();
            }
        }
        reg.health.write().unwrap().record_failure(&error);
        Err(error)
    }

    // -- Typed operation wrappers -------------------------------------------

    pub async fn get_stock_quote(
        &self,
        symbol: &str,
        preferred: Option<ProviderType>,
    ) -> ApiResponse<StockQuote> {
        self.execute(Operation::GetStockQuote, preferred, |adapter| async move {
            adapter.get_stock_quote(symbol).await
        })
        .await
    }

    pub async fn get_stock_quotes(
        &self,
        symbols: &[String],
        preferred: Option<ProviderType>,
    ) -> ApiResponse<Vec<StockQuote>> {
        self.execute(Operation::GetStockQuotes, preferred, |adapter| async move {
            adapter.get_stock_quotes(symbols).await
        })
        .await
    }

    pub async fn get_options_chain(
        &self,
        symbol: &str,
        expiration_from: Option<NaiveDate>,
        expiration_to: Option<NaiveDate>,
        preferred: Option<ProviderType>,
    ) -> ApiResponse<OptionChain> {
        self.execute(Operation::GetOptionsChain, preferred, |adapter| async move {
            adapter
                .get_options_chain(symbol, expiration_from, expiration_to)
                .await
        })
        .await
    }

    pub async fn screen_stocks(
        &self,
        criteria: &ScreeningCriteria,
        preferred: Option<ProviderType>,
    ) -> ApiResponse<Vec<ScreenerResult>> {
        self.execute(Operation::ScreenStocks, preferred, |adapter| async move {
            adapter.screen_stocks(criteria).await
        })
        .await
    }

    pub async fn get_fundamental_data(
        &self,
        symbol: &str,
        preferred: Option<ProviderType>,
    ) -> ApiResponse<FundamentalMetrics> {
        self.execute(Operation::GetFundamentalData, preferred, |adapter| async move {
            adapter.get_fundamental_data(symbol).await
        })
        .await
    }

    pub async fn get_calendar_events(
        &self,
        symbol: &str,
        types: &[CalendarEventType],
        from: NaiveDate,
        to: NaiveDate,
        preferred: Option<ProviderType>,
    ) -> ApiResponse<Vec<CalendarEvent>> {
        self.execute(Operation::GetCalendarEvents, preferred, |adapter| async move {
            adapter.get_calendar_events(symbol, types, from, to).await
        })
        .await
    }

    pub async fn get_technical_indicators(
        &self,
        symbol: &str,
        preferred: Option<ProviderType>,
    ) -> ApiResponse<TechnicalIndicators> {
        self.execute(
            Operation::GetTechnicalIndicators,
            preferred,
            |adapter| async move { adapter.get_technical_indicators(symbol).await },
        )
        .await
    }

    pub async fn get_risk_metrics(
        &self,
        symbol: &str,
        preferred: Option<ProviderType>,
    ) -> ApiResponse<FundamentalRiskMetrics> {
        self.execute(Operation::GetRiskMetrics, preferred, |adapter| async move {
            adapter.get_risk_metrics(symbol).await
        })
        .await
    }

    pub async fn get_company_news(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
        limit: usize,
        preferred: Option<ProviderType>,
    ) -> ApiResponse<Vec<NewsItem>> {
        self.execute(Operation::GetCompanyNews, preferred, |adapter| async move {
            adapter.get_company_news(symbol, from, to, limit).await
        })
        .await
    }

    pub async fn get_economic_events(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        country: Option<&str>,
        preferred: Option<ProviderType>,
    ) -> ApiResponse<Vec<EconomicEvent>> {
        self.execute(Operation::GetEconomicEvents, preferred, |adapter| async move {
            adapter.get_economic_events(from, to, country).await
        })
        .await
    }

    pub async fn get_historical_prices(
        &self,
        symbol: &str,
        period: BarPeriod,
        from: NaiveDate,
        to: NaiveDate,
        preferred: Option<ProviderType>,
    ) -> ApiResponse<Vec<Bar>> {
        self.execute(
            Operation::GetHistoricalPrices,
            preferred,
            |adapter| async move { adapter.get_historical_prices(symbol, period, from, to).await },
        )
        .await
    }

    pub async fn get_enhanced_stock_data(
        &self,
        symbol: &str,
        preferred: Option<ProviderType>,
    ) -> ApiResponse<EnhancedStockData> {
        self.execute(
            Operation::GetEnhancedStockData,
            preferred,
            |adapter| async move { adapter.get_enhanced_stock_data(symbol).await },
        )
        .await
    }

    pub async fn analyze_pmcc_opportunity(
        &self,
        candidate: &PmccCandidate,
        enhanced: &EnhancedStockData,
        context: &MarketContext,
    ) -> ApiResponse<AiInsights> {
        self.execute(
            Operation::AnalyzePmccOpportunity,
            None,
            |adapter| async move {
                adapter
                    .analyze_pmcc_opportunity(candidate, enhanced, context)
                    .await
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quote(symbol: &str) -> StockQuote {
        StockQuote {
            symbol: symbol.to_string(),
            last: Some(dec!(100)),
            bid: Some(dec!(99.95)),
            ask: Some(dec!(100.05)),
            volume: Some(1_000_000),
            timestamp: Utc::now(),
            change: None,
            change_percent: None,
            previous_close: None,
            market_cap: None,
        }
    }

    /// Scripted adapter: pops one response per call, repeating the last
    /// script entry forever once drained.
    struct MockProvider {
        provider_type: ProviderType,
        operations: Vec<Operation>,
        script: Mutex<VecDeque<ApiResponse<StockQuote>>>,
        calls: AtomicUsize,
    }

    impl MockProvider {
        fn new(
            provider_type: ProviderType,
            operations: Vec<Operation>,
            script: Vec<ApiResponse<StockQuote>>,
        ) -> Self {
            Self {
                provider_type,
                operations,
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DataProvider for MockProvider {
        fn provider_type(&self) -> ProviderType {
            self.provider_type
        }

        fn supports_operation(&self, operation: Operation) -> bool {
            self.operations.contains(&operation)
        }

        async fn health_check(&self) -> ApiResponse<ProviderHealth> {
            ApiResponse::ok(ProviderHealth::healthy(1))
        }

        async fn get_stock_quote(&self, symbol: &str) -> ApiResponse<StockQuote> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script
                    .front()
                    .cloned()
                    .unwrap_or_else(|| ApiResponse::ok(quote(symbol)))
            }
        }
    }

    fn fast_config() -> RouterConfig {
        RouterConfig {
            retry_backoff_secs: 0.01,
            ..RouterConfig::default()
        }
    }

    #[tokio::test]
    async fn routes_to_preferred_provider() {
        let marketdata = Arc::new(MockProvider::new(
            ProviderType::MarketData,
            vec![Operation::GetStockQuote],
            vec![ApiResponse::ok(quote("AAPL"))],
        ));
        let mut router = ProviderRouter::new(fast_config());
        router.register(Arc::clone(&marketdata) as Arc<dyn DataProvider>);

        let response = router.get_stock_quote("AAPL", None).await;
        assert!(response.is_ok());
        assert_eq!(response.provider, Some(ProviderType::MarketData));
        assert_eq!(marketdata.calls(), 1);
    }

    #[tokio::test]
    async fn unsupported_operation_fails_without_calls() {
        let eodhd = Arc::new(MockProvider::new(
            ProviderType::Eodhd,
            vec![Operation::ScreenStocks],
            vec![],
        ));
        let mut router = ProviderRouter::new(fast_config());
        router.register(Arc::clone(&eodhd) as Arc<dyn DataProvider>);

        let response = router.get_stock_quote("AAPL", None).await;
        assert!(matches!(
            response.error,
            Some(ProviderError::NoProvider { .. })
        ));
        assert_eq!(eodhd.calls(), 0);
    }

    #[tokio::test]
    async fn falls_back_to_second_provider() {
        let failing = Arc::new(MockProvider::new(
            ProviderType::MarketData,
            vec![Operation::GetStockQuote],
            vec![ApiResponse::err(ProviderError::Upstream {
                status: 400,
                message: "bad request".into(),
            })],
        ));
        let backup = Arc::new(MockProvider::new(
            ProviderType::Eodhd,
            vec![Operation::GetStockQuote],
            vec![ApiResponse::ok(quote("AAPL"))],
        ));
        let mut router = ProviderRouter::new(fast_config());
        router.register(Arc::clone(&failing) as Arc<dyn DataProvider>);
        router.register(Arc::clone(&backup) as Arc<dyn DataProvider>);

        let response = router.get_stock_quote("AAPL", None).await;
        assert!(response.is_ok());
        assert_eq!(response.provider, Some(ProviderType::Eodhd));
        assert_eq!(failing.calls(), 1);
        assert_eq!(backup.calls(), 1);
    }

    #[tokio::test]
    async fn transient_errors_retried_then_succeed() {
        // Three 503s then success: stays under the retry budget, so the scan
        // sees a clean result and the breaker stays closed.
        let flaky = Arc::new(MockProvider::new(
            ProviderType::MarketData,
            vec![Operation::GetStockQuote],
            vec![
                ApiResponse::err(ProviderError::Transient("503".into())),
                ApiResponse::err(ProviderError::Transient("503".into())),
                ApiResponse::err(ProviderError::Transient("503".into())),
                ApiResponse::ok(quote("AAPL")),
            ],
        ));
        let mut router = ProviderRouter::new(fast_config());
        router.register(Arc::clone(&flaky) as Arc<dyn DataProvider>);

        let response = router.get_stock_quote("AAPL", None).await;
        assert!(response.is_ok());
        assert_eq!(flaky.calls(), 4);

        // Breaker never saw an exhausted attempt.
        let health = router.provider_health(ProviderType::MarketData).unwrap();
        assert!(health.status.is_usable());
    }

    #[tokio::test]
    async fn circuit_opens_after_consecutive_failures() {
        let broken = Arc::new(MockProvider::new(
            ProviderType::MarketData,
            vec![Operation::GetStockQuote],
            vec![ApiResponse::err(ProviderError::Upstream {
                status: 400,
                message: "rejected".into(),
            })],
        ));
        let mut router = ProviderRouter::new(RouterConfig {
            failure_threshold: 5,
            retry_backoff_secs: 0.01,
            ..RouterConfig::default()
        });
        router.register(Arc::clone(&broken) as Arc<dyn DataProvider>);

        for _ in 0..5 {
            let response = router.get_stock_quote("AAPL", None).await;
            assert!(response.is_err());
        }
        assert_eq!(broken.calls(), 5);

        // Circuit is now open: further invokes short-circuit with no network
        // calls.
        let response = router.get_stock_quote("AAPL", None).await;
        assert!(response.is_err());
        assert_eq!(broken.calls(), 5);
    }

    #[tokio::test]
    async fn half_open_admits_single_probe() {
        let recovering = Arc::new(MockProvider::new(
            ProviderType::MarketData,
            vec![Operation::GetStockQuote],
            vec![
                ApiResponse::err(ProviderError::Upstream {
                    status: 400,
                    message: "down".into(),
                }),
                ApiResponse::ok(quote("AAPL")),
            ],
        ));
        let mut router = ProviderRouter::new(RouterConfig {
            failure_threshold: 1,
            cooldown_secs: 0,
            retry_backoff_secs: 0.01,
            ..RouterConfig::default()
        });
        router.register(Arc::clone(&recovering) as Arc<dyn DataProvider>);

        assert!(router.get_stock_quote("AAPL", None).await.is_err());
        // Zero cooldown: the next call is the probe, and its success closes
        // the circuit again.
        let response = router.get_stock_quote("AAPL", None).await;
        assert!(response.is_ok());
        assert_eq!(recovering.calls(), 2);
        assert!(router.get_stock_quote("AAPL", None).await.is_ok());
    }

    #[tokio::test]
    async fn auth_failure_marks_unhealthy_without_breaker_trip() {
        let rejected = Arc::new(MockProvider::new(
            ProviderType::MarketData,
            vec![Operation::GetStockQuote],
            vec![ApiResponse::err(ProviderError::Authentication(
                "bad token".into(),
            ))],
        ));
        let mut router = ProviderRouter::new(fast_config());
        router.register(Arc::clone(&rejected) as Arc<dyn DataProvider>);

        let response = router.get_stock_quote("AAPL", None).await;
        assert!(response.is_err());
        assert_eq!(rejected.calls(), 1);

        let health = router.provider_health(ProviderType::MarketData).unwrap();
        assert_eq!(health.status, scanner_core::ProviderStatus::Unhealthy);

        // Unhealthy adapters are filtered out before any call is made.
        let response = router.get_stock_quote("AAPL", None).await;
        assert!(response.is_err());
        assert_eq!(rejected.calls(), 1);
    }

    #[tokio::test]
    async fn no_data_passes_through_as_success() {
        let empty = Arc::new(MockProvider::new(
            ProviderType::MarketData,
            vec![Operation::GetStockQuote],
            vec![ApiResponse::no_data()],
        ));
        let mut router = ProviderRouter::new(fast_config());
        router.register(Arc::clone(&empty) as Arc<dyn DataProvider>);

        let response = router.get_stock_quote("MISSING", None).await;
        assert!(response.is_no_data());
        assert_eq!(empty.calls(), 1);
    }
}
