//! The scan pipeline: screen, fan out per symbol, analyze, augment, rank,
//! export. Per-symbol failures are recorded and never abort the run.

use chrono::{DateTime, Utc};
use options_analyzer::{AnalysisOutcome, AnalyzerConfig, OptionsAnalyzer};
use provider_router::ProviderRouter;
use scanner_core::{MarketContext, PmccCandidate, ScreeningCriteria, StockQuote};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::ai::AiAugmentor;
use crate::export::{ExportError, ResultExporter};
use crate::screener::StockScreener;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("export failed: {0}")]
    Export(#[from] ExportError),
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Explicit symbol list; when set, screening is skipped.
    pub universe: Option<Vec<String>>,
    pub criteria: ScreeningCriteria,
    pub max_stocks_to_screen: usize,
    pub max_opportunities: usize,
    pub min_total_score: f64,
    pub worker_pool_size: usize,
    pub ai_enabled: bool,
    pub ai_pool_size: usize,
    pub min_completeness: f64,
    pub analyzer: AnalyzerConfig,
    pub output_dir: PathBuf,
    /// Optional wall-clock bound; outstanding per-symbol work is cancelled
    /// cooperatively when it elapses.
    pub scan_timeout_secs: Option<u64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            universe: None,
            criteria: ScreeningCriteria::default(),
            max_stocks_to_screen: 100,
            max_opportunities: 25,
            min_total_score: 50.0,
            worker_pool_size: 10,
            ai_enabled: true,
            ai_pool_size: 5,
            min_completeness: 60.0,
            analyzer: AnalyzerConfig::default(),
            output_dir: PathBuf::from("data"),
            scan_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResults {
    pub scan_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub stocks_screened: usize,
    pub stocks_passed_screening: usize,
    pub options_analyzed: usize,
    pub opportunities_found: usize,
    pub top_opportunities: Vec<PmccCandidate>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ScanResults {
    fn new(scan_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            scan_id,
            started_at,
            completed_at: None,
            duration_seconds: None,
            stocks_screened: 0,
            stocks_passed_screening: 0,
            options_analyzed: 0,
            opportunities_found: 0,
            top_opportunities: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.stocks_screened == 0 {
            return 0.0;
        }
        self.stocks_passed_screening as f64 / self.stocks_screened as f64 * 100.0
    }

    pub fn opportunity_rate(&self) -> f64 {
        if self.stocks_passed_screening == 0 {
            return 0.0;
        }
        self.opportunities_found as f64 / self.stocks_passed_screening as f64 * 100.0
    }
}

/// Drop candidates under the score floor, order by quantitative score and cap
/// the list.
pub fn rank_and_filter(
    mut candidates: Vec<PmccCandidate>,
    min_total_score: f64,
    max_opportunities: usize,
) -> Vec<PmccCandidate> {
    candidates.retain(|c| c.total_score >= min_total_score);
    candidates.sort_by(|a, b| {
        b.total_score
            .partial_cmp(&a.total_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.liquidity_score
                    .partial_cmp(&a.liquidity_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| b.risk_metrics.risk_reward.cmp(&a.risk_metrics.risk_reward))
    });
    candidates.truncate(max_opportunities);
    candidates
}

/// Final ordering: combined score when the AI ran, quantitative score
/// otherwise. Ranks come out contiguous from 1.
pub fn assign_ranks(candidates: &mut [PmccCandidate]) {
    candidates.sort_by(|a, b| {
        b.ranking_score()
            .partial_cmp(&a.ranking_score())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.liquidity_score
                    .partial_cmp(&a.liquidity_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| b.risk_metrics.risk_reward.cmp(&a.risk_metrics.risk_reward))
    });
    for (index, candidate) in candidates.iter_mut().enumerate() {
        candidate.rank = Some(index as u32 + 1);
    }
}

pub struct PmccScanner {
    router: Arc<ProviderRouter>,
    screener: StockScreener,
    analyzer: Arc<OptionsAnalyzer>,
    augmentor: AiAugmentor,
    exporter: ResultExporter,
    config: ScanConfig,
}

impl PmccScanner {
    pub fn new(router: Arc<ProviderRouter>, config: ScanConfig) -> Self {
        Self {
            screener: StockScreener::new(Arc::clone(&router)),
            analyzer: Arc::new(OptionsAnalyzer::with_config(config.analyzer.clone())),
            augmentor: AiAugmentor::new(
                Arc::clone(&router),
                config.min_completeness,
                config.ai_pool_size,
            ),
            exporter: ResultExporter::new(config.output_dir.clone()),
            router,
            config,
        }
    }

    /// Run one scan end to end. The run always completes and always exports;
    /// only a missing provider setup or an export failure is fatal.
    pub async fn run(&self) -> Result<ScanResults, ScanError> {
        if self.router.registered_providers().is_empty() {
            return Err(ScanError::Config("no providers registered".to_string()));
        }

        let started = Utc::now();
        let scan_id = format!("pmcc_scan_{}", started.format("%Y%m%d_%H%M%S"));
        let mut results = ScanResults::new(scan_id.clone(), started);
        tracing::info!(scan_id, "starting PMCC scan");

        // 1. Universe acquisition.
        let symbols = self.acquire_universe(&mut results).await;
        results.stocks_passed_screening = symbols.len();
        tracing::info!(symbols = symbols.len(), "universe ready");

        // 2. Per-symbol fan-out under a bounded worker pool.
        let cancel = CancellationToken::new();
        if let Some(secs) = self.config.scan_timeout_secs {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                cancel.cancel();
            });
        }

        let outcomes = self.fan_out(&symbols, &cancel).await;
        if cancel.is_cancelled() {
            results
                .warnings
                .push("scan timeout reached, outstanding work cancelled".to_string());
        }

        let mut candidates = Vec::new();
        for (symbol, outcome) in outcomes {
            match outcome {
                Ok(outcome) => {
                    results.options_analyzed += 1;
                    results.warnings.extend(outcome.warnings);
                    candidates.extend(outcome.candidates);
                }
                Err(error) => {
                    tracing::warn!(symbol, %error, "symbol failed, continuing");
                    results.errors.push(error);
                }
            }
        }

        // 3-4. Score floor, order, cap.
        let mut top = rank_and_filter(
            candidates,
            self.config.min_total_score,
            self.config.max_opportunities,
        );

        // 5. AI augmentation on the survivors.
        if self.config.ai_enabled && !top.is_empty() {
            let context = MarketContext {
                scan_date: Some(started.date_naive()),
                total_candidates: top.len(),
                market_regime: None,
            };
            let report = self.augmentor.augment(&mut top, &context).await;
            results.warnings.extend(report.warnings);
        }

        // 6. Final rank.
        assign_ranks(&mut top);
        results.opportunities_found = top.len();
        results.top_opportunities = top;

        let completed = Utc::now();
        results.completed_at = Some(completed);
        results.duration_seconds =
            Some((completed - started).num_milliseconds() as f64 / 1000.0);

        // 7. Export. Files are written even for an empty run.
        self.exporter.export(&results)?;

        tracing::info!(
            scan_id,
            opportunities = results.opportunities_found,
            errors = results.errors.len(),
            duration = ?results.duration_seconds,
            "scan complete"
        );
        Ok(results)
    }

    async fn acquire_universe(&self, results: &mut ScanResults) -> Vec<String> {
        if let Some(universe) = &self.config.universe {
            let symbols: Vec<String> = universe
                .iter()
                .take(self.config.max_stocks_to_screen)
                .cloned()
                .collect();
            results.stocks_screened = symbols.len();
            return symbols;
        }

        match self
            .screener
            .screen(&self.config.criteria, self.config.max_stocks_to_screen)
            .await
        {
            Ok(rows) => {
                results.stocks_screened = rows.len();
                rows.into_iter().map(|r| r.symbol).collect()
            }
            Err(e) => {
                results.errors.push(format!("screening failed: {e}"));
                Vec::new()
            }
        }
    }

    async fn fan_out(
        &self,
        symbols: &[String],
        cancel: &CancellationToken,
    ) -> Vec<(String, Result<AnalysisOutcome, String>)> {
        let semaphore = Arc::new(Semaphore::new(self.config.worker_pool_size.max(1)));
        let mut tasks: JoinSet<(String, Result<AnalysisOutcome, String>)> = JoinSet::new();

        for symbol in symbols.iter().cloned() {
            let router = Arc::clone(&self.router);
            let analyzer = Arc::clone(&self.analyzer);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (symbol, Err("worker pool closed".to_string())),
                };
                if cancel.is_cancelled() {
                    return (symbol, Err("cancelled before start".to_string()));
                }
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => Err(format!("{symbol}: cancelled in flight")),
                    outcome = scan_symbol(router, analyzer, symbol.clone()) => outcome,
                };
                (symbol, outcome)
            });
        }

        let mut outcomes = Vec::with_capacity(symbols.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => outcomes.push((
                    "unknown".to_string(),
                    Err(format!("worker task failure: {e}")),
                )),
            }
        }
        outcomes
    }
}

/// Fetch chain and quote concurrently, then analyze. An empty chain is a
/// normal zero-candidate outcome, not an error.
async fn scan_symbol(
    router: Arc<ProviderRouter>,
    analyzer: Arc<OptionsAnalyzer>,
    symbol: String,
) -> Result<AnalysisOutcome, String> {
    let (chain_response, quote_response) = tokio::join!(
        router.get_options_chain(&symbol, None, None, None),
        router.get_stock_quote(&symbol, None),
    );

    let chain = match chain_response.into_result() {
        Ok(Some(chain)) => chain,
        Ok(None) => return Ok(AnalysisOutcome::default()),
        Err(e) => return Err(format!("{symbol}: options chain: {e}")),
    };

    let quote = match quote_response.into_result() {
        Ok(Some(quote)) => quote,
        // No quote is survivable: the analyzer falls back to the chain's
        // underlying price.
        Ok(None) | Err(_) => StockQuote {
            symbol: symbol.clone(),
            last: None,
            bid: None,
            ask: None,
            volume: None,
            timestamp: Utc::now(),
            change: None,
            change_percent: None,
            previous_close: None,
            market_cap: None,
        },
    };

    Ok(analyzer.analyze(&chain, &quote))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{candidate, leg};
    use async_trait::async_trait;
    use provider_router::RouterConfig;
    use rust_decimal_macros::dec;
    use scanner_core::{
        AiInsights, ApiResponse, DataProvider, EnhancedStockData, Operation, OptionChain,
        ProviderError, ProviderHealth, ProviderType, Recommendation,
    };

    struct MockMarketProvider {
        fail_symbols: Vec<String>,
        empty_chain: bool,
    }

    impl MockMarketProvider {
        fn healthy() -> Self {
            Self {
                fail_symbols: Vec::new(),
                empty_chain: false,
            }
        }
    }

    fn test_quote(symbol: &str) -> StockQuote {
        StockQuote {
            symbol: symbol.to_string(),
            last: Some(dec!(155)),
            bid: None,
            ask: None,
            volume: Some(1_000_000),
            timestamp: Utc::now(),
            change: None,
            change_percent: None,
            previous_close: None,
            market_cap: None,
        }
    }

    #[async_trait]
    impl DataProvider for MockMarketProvider {
        fn provider_type(&self) -> ProviderType {
            ProviderType::MarketData
        }

        fn supports_operation(&self, operation: Operation) -> bool {
            matches!(
                operation,
                Operation::HealthCheck | Operation::GetStockQuote | Operation::GetOptionsChain
            )
        }

        async fn health_check(&self) -> ApiResponse<ProviderHealth> {
            ApiResponse::ok(ProviderHealth::healthy(1))
        }

        async fn get_stock_quote(&self, symbol: &str) -> ApiResponse<StockQuote> {
            ApiResponse::ok(test_quote(symbol))
        }

        async fn get_options_chain(
            &self,
            symbol: &str,
            _from: Option<chrono::NaiveDate>,
            _to: Option<chrono::NaiveDate>,
        ) -> ApiResponse<OptionChain> {
            if self.fail_symbols.iter().any(|s| s == symbol) {
                return ApiResponse::err(ProviderError::Transient("HTTP 503".to_string()));
            }
            if self.empty_chain {
                return ApiResponse::no_data();
            }
            ApiResponse::ok(OptionChain {
                underlying: "TEST".to_string(),
                underlying_price: Some(dec!(155)),
                updated: Some(Utc::now()),
                contracts: vec![
                    leg(dec!(150), 400, dec!(0.80)),
                    leg(dec!(160), 35, dec!(0.30)),
                ],
            })
        }
    }

    /// AI-side mock covering both the enhanced-data fetch and the analysis
    /// request. `parse_fail` simulates an analyst that never produces valid
    /// JSON.
    struct MockAiProvider {
        parse_fail: bool,
        completeness: f64,
    }

    #[async_trait]
    impl DataProvider for MockAiProvider {
        fn provider_type(&self) -> ProviderType {
            ProviderType::Claude
        }

        fn supports_operation(&self, operation: Operation) -> bool {
            matches!(
                operation,
                Operation::HealthCheck
                    | Operation::GetEnhancedStockData
                    | Operation::AnalyzePmccOpportunity
            )
        }

        async fn health_check(&self) -> ApiResponse<ProviderHealth> {
            ApiResponse::ok(ProviderHealth::healthy(1))
        }

        async fn get_enhanced_stock_data(&self, symbol: &str) -> ApiResponse<EnhancedStockData> {
            ApiResponse::ok(EnhancedStockData {
                quote: test_quote(symbol),
                fundamentals: None,
                calendar_events: Vec::new(),
                technicals: None,
                risk_metrics: None,
                news: Vec::new(),
                economic_events: Vec::new(),
                historical_prices: Vec::new(),
                completeness_score: self.completeness,
            })
        }

        async fn analyze_pmcc_opportunity(
            &self,
            candidate: &scanner_core::PmccCandidate,
            _enhanced: &EnhancedStockData,
            _context: &MarketContext,
        ) -> ApiResponse<AiInsights> {
            if self.parse_fail {
                return ApiResponse::err(ProviderError::Parse(
                    "invalid JSON after retry".to_string(),
                ));
            }
            ApiResponse::ok(AiInsights {
                symbol: candidate.symbol.clone(),
                pmcc_score: 90.0,
                execution_risk_score: None,
                financial_stability_score: None,
                calendar_event_score: None,
                technical_setup_score: None,
                recommendation: Recommendation::Buy,
                confidence_level: Some(75.0),
                key_risks: vec![],
                key_opportunities: vec![],
                management_strategy: None,
                entry_timing: None,
                exit_conditions: vec![],
                position_sizing: None,
            })
        }
    }

    fn scanner_with(
        market: MockMarketProvider,
        ai: Option<MockAiProvider>,
        output_dir: &std::path::Path,
        tweak: impl FnOnce(&mut ScanConfig),
    ) -> PmccScanner {
        let mut router = ProviderRouter::new(RouterConfig {
            retry_backoff_secs: 0.01,
            max_retries: 0,
            ..RouterConfig::default()
        });
        router.register(Arc::new(market));
        let ai_enabled = ai.is_some();
        if let Some(ai) = ai {
            router.register(Arc::new(ai));
        }

        let mut config = ScanConfig {
            universe: Some(vec!["TEST".to_string()]),
            min_total_score: 0.0,
            ai_enabled,
            output_dir: output_dir.to_path_buf(),
            ..ScanConfig::default()
        };
        tweak(&mut config);
        PmccScanner::new(Arc::new(router), config)
    }

    #[tokio::test]
    async fn complete_workflow_finds_and_exports_one_opportunity() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner_with(MockMarketProvider::healthy(), None, dir.path(), |_| {});

        let results = scanner.run().await.unwrap();
        assert_eq!(results.opportunities_found, 1);
        assert_eq!(results.top_opportunities[0].rank, Some(1));
        assert!(results.top_opportunities[0].is_valid_pmcc());
        assert!(results.errors.is_empty());

        let json = dir.path().join(format!("{}.json", results.scan_id));
        let csv = dir.path().join(format!("{}.csv", results.scan_id));
        assert!(json.exists());
        assert!(csv.exists());
    }

    #[tokio::test]
    async fn per_symbol_failure_is_recorded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let market = MockMarketProvider {
            fail_symbols: vec!["BAD".to_string()],
            empty_chain: false,
        };
        let scanner = scanner_with(market, None, dir.path(), |config| {
            config.universe = Some(vec!["TEST".to_string(), "BAD".to_string()]);
        });

        let results = scanner.run().await.unwrap();
        assert_eq!(results.opportunities_found, 1);
        assert_eq!(results.errors.len(), 1);
        assert!(results.errors[0].contains("BAD"));
    }

    #[tokio::test]
    async fn empty_chain_completes_with_zero_opportunities() {
        let dir = tempfile::tempdir().unwrap();
        let market = MockMarketProvider {
            fail_symbols: Vec::new(),
            empty_chain: true,
        };
        let scanner = scanner_with(market, None, dir.path(), |_| {});

        let results = scanner.run().await.unwrap();
        assert_eq!(results.opportunities_found, 0);
        assert!(results.errors.is_empty());
        assert!(dir
            .path()
            .join(format!("{}.csv", results.scan_id))
            .exists());
    }

    #[tokio::test]
    async fn impossible_score_floor_yields_zero() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner_with(MockMarketProvider::healthy(), None, dir.path(), |config| {
            config.min_total_score = 100.0;
        });

        let results = scanner.run().await.unwrap();
        assert_eq!(results.opportunities_found, 0);
        assert!(dir
            .path()
            .join(format!("{}.json", results.scan_id))
            .exists());
    }

    #[tokio::test]
    async fn zero_max_opportunities_still_exports() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner_with(
            MockMarketProvider::healthy(),
            Some(MockAiProvider {
                parse_fail: false,
                completeness: 80.0,
            }),
            dir.path(),
            |config| config.max_opportunities = 0,
        );

        let results = scanner.run().await.unwrap();
        assert_eq!(results.opportunities_found, 0);
        assert!(dir
            .path()
            .join(format!("{}.csv", results.scan_id))
            .exists());
    }

    #[tokio::test]
    async fn ai_merge_changes_final_score() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner_with(
            MockMarketProvider::healthy(),
            Some(MockAiProvider {
                parse_fail: false,
                completeness: 80.0,
            }),
            dir.path(),
            |_| {},
        );

        let results = scanner.run().await.unwrap();
        assert_eq!(results.opportunities_found, 1);
        let top = &results.top_opportunities[0];
        assert_eq!(top.claude_score, Some(90.0));
        let expected = 0.6 * top.total_score + 0.4 * 90.0;
        assert!((top.combined_score.unwrap() - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn ai_parse_failure_keeps_candidate_and_warns() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner_with(
            MockMarketProvider::healthy(),
            Some(MockAiProvider {
                parse_fail: true,
                completeness: 80.0,
            }),
            dir.path(),
            |_| {},
        );

        let results = scanner.run().await.unwrap();
        assert_eq!(results.opportunities_found, 1);
        let top = &results.top_opportunities[0];
        assert!(top.claude_score.is_none());
        assert_eq!(top.rank, Some(1));
        assert!(results.warnings.iter().any(|w| w.contains("analysis")));
    }

    #[tokio::test]
    async fn low_completeness_skips_ai() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner_with(
            MockMarketProvider::healthy(),
            Some(MockAiProvider {
                parse_fail: false,
                completeness: 30.0,
            }),
            dir.path(),
            |_| {},
        );

        let results = scanner.run().await.unwrap();
        let top = &results.top_opportunities[0];
        assert!(top.claude_score.is_none());
        assert!(results
            .warnings
            .iter()
            .any(|w| w.contains("completeness")));
    }

    #[tokio::test]
    async fn no_providers_is_a_config_error() {
        let router = ProviderRouter::new(RouterConfig::default());
        let scanner = PmccScanner::new(Arc::new(router), ScanConfig::default());
        assert!(matches!(
            scanner.run().await,
            Err(ScanError::Config(_))
        ));
    }

    #[test]
    fn ranks_are_contiguous_after_filtering() {
        let mut top = rank_and_filter(
            vec![
                candidate("AAA", 80.0),
                candidate("BBB", 70.0),
                candidate("CCC", 40.0),
            ],
            50.0,
            25,
        );
        assign_ranks(&mut top);

        assert_eq!(top.len(), 2);
        assert_eq!(top[0].symbol, "AAA");
        assert_eq!(top[0].rank, Some(1));
        assert_eq!(top[1].rank, Some(2));
    }

    #[test]
    fn combined_score_flips_rank_order() {
        let mut first = candidate("AAA", 80.0);
        let mut second = candidate("BBB", 70.0);
        crate::ai::merge_ai(
            &mut first,
            AiInsights {
                symbol: "AAA".to_string(),
                pmcc_score: 50.0,
                execution_risk_score: None,
                financial_stability_score: None,
                calendar_event_score: None,
                technical_setup_score: None,
                recommendation: Recommendation::Hold,
                confidence_level: None,
                key_risks: vec![],
                key_opportunities: vec![],
                management_strategy: None,
                entry_timing: None,
                exit_conditions: vec![],
                position_sizing: None,
            },
        );
        crate::ai::merge_ai(
            &mut second,
            AiInsights {
                symbol: "BBB".to_string(),
                pmcc_score: 95.0,
                execution_risk_score: None,
                financial_stability_score: None,
                calendar_event_score: None,
                technical_setup_score: None,
                recommendation: Recommendation::Buy,
                confidence_level: None,
                key_risks: vec![],
                key_opportunities: vec![],
                management_strategy: None,
                entry_timing: None,
                exit_conditions: vec![],
                position_sizing: None,
            },
        );

        let mut candidates = vec![first, second];
        assign_ranks(&mut candidates);
        assert_eq!(candidates[0].symbol, "BBB");
        assert_eq!(candidates[0].rank, Some(1));
        assert_eq!(candidates[1].symbol, "AAA");
        assert_eq!(candidates[1].rank, Some(2));
    }

    #[test]
    fn exactly_one_valid_pair_gets_rank_one() {
        let mut top = rank_and_filter(vec![candidate("ONLY", 66.0)], 50.0, 25);
        assign_ranks(&mut top);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].rank, Some(1));
    }
}
