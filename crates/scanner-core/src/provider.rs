use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::envelope::ApiResponse;
use crate::error::ProviderError;
use crate::types::{
    AiInsights, Bar, BarPeriod, CalendarEvent, CalendarEventType, EconomicEvent,
    EnhancedStockData, FundamentalMetrics, FundamentalRiskMetrics, MarketContext, NewsItem,
    OptionChain, PmccCandidate, ProviderHealth, ScreenerResult, ScreeningCriteria, StockQuote,
    TechnicalIndicators,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Eodhd,
    MarketData,
    Claude,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Eodhd => "eodhd",
            ProviderType::MarketData => "marketdata",
            ProviderType::Claude => "claude",
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The common operation catalogue. Adapters declare support per operation;
/// the router routes per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    HealthCheck,
    GetStockQuote,
    GetStockQuotes,
    GetOptionsChain,
    ScreenStocks,
    GetFundamentalData,
    GetCalendarEvents,
    GetTechnicalIndicators,
    GetRiskMetrics,
    GetCompanyNews,
    GetEconomicEvents,
    GetHistoricalPrices,
    GetEnhancedStockData,
    AnalyzePmccOpportunity,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::HealthCheck => "health_check",
            Operation::GetStockQuote => "get_stock_quote",
            Operation::GetStockQuotes => "get_stock_quotes",
            Operation::GetOptionsChain => "get_options_chain",
            Operation::ScreenStocks => "screen_stocks",
            Operation::GetFundamentalData => "get_fundamental_data",
            Operation::GetCalendarEvents => "get_calendar_events",
            Operation::GetTechnicalIndicators => "get_technical_indicators",
            Operation::GetRiskMetrics => "get_risk_metrics",
            Operation::GetCompanyNews => "get_company_news",
            Operation::GetEconomicEvents => "get_economic_events",
            Operation::GetHistoricalPrices => "get_historical_prices",
            Operation::GetEnhancedStockData => "get_enhanced_stock_data",
            Operation::AnalyzePmccOpportunity => "analyze_pmcc_opportunity",
        }
    }

    pub const ALL: [Operation; 14] = [
        Operation::HealthCheck,
        Operation::GetStockQuote,
        Operation::GetStockQuotes,
        Operation::GetOptionsChain,
        Operation::ScreenStocks,
        Operation::GetFundamentalData,
        Operation::GetCalendarEvents,
        Operation::GetTechnicalIndicators,
        Operation::GetRiskMetrics,
        Operation::GetCompanyNews,
        Operation::GetEconomicEvents,
        Operation::GetHistoricalPrices,
        Operation::GetEnhancedStockData,
        Operation::AnalyzePmccOpportunity,
    ];
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// NotSupported envelope for operations an adapter does not implement.
pub fn unsupported<T>(provider: ProviderType, operation: Operation) -> ApiResponse<T> {
    ApiResponse::err(ProviderError::NotSupported {
        provider,
        operation,
    })
    .with_provider(provider)
}

/// Uniform interface every upstream adapter implements. Operations the
/// adapter does not support keep the default body and fail with a
/// distinguishable NotSupported error.
#[async_trait]
pub trait DataProvider: Send + Sync {
    fn provider_type(&self) -> ProviderType;

    fn supports_operation(&self, operation: Operation) -> bool;

    /// Cheap probe of the upstream.
    async fn health_check(&self) -> ApiResponse<ProviderHealth>;

    async fn get_stock_quote(&self, _symbol: &str) -> ApiResponse<StockQuote> {
        unsupported(self.provider_type(), Operation::GetStockQuote)
    }

    async fn get_stock_quotes(&self, _symbols: &[String]) -> ApiResponse<Vec<StockQuote>> {
        unsupported(self.provider_type(), Operation::GetStockQuotes)
    }

    async fn get_options_chain(
        &self,
        _symbol: &str,
        _expiration_from: Option<NaiveDate>,
        _expiration_to: Option<NaiveDate>,
    ) -> ApiResponse<OptionChain> {
        unsupported(self.provider_type(), Operation::GetOptionsChain)
    }

    async fn screen_stocks(&self, _criteria: &ScreeningCriteria) -> ApiResponse<Vec<ScreenerResult>> {
        unsupported(self.provider_type(), Operation::ScreenStocks)
    }

    async fn get_fundamental_data(&self, _symbol: &str) -> ApiResponse<FundamentalMetrics> {
        unsupported(self.provider_type(), Operation::GetFundamentalData)
    }

    async fn get_calendar_events(
        &self,
        _symbol: &str,
        _types: &[CalendarEventType],
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> ApiResponse<Vec<CalendarEvent>> {
        unsupported(self.provider_type(), Operation::GetCalendarEvents)
    }

    async fn get_technical_indicators(&self, _symbol: &str) -> ApiResponse<TechnicalIndicators> {
        unsupported(self.provider_type(), Operation::GetTechnicalIndicators)
    }

    async fn get_risk_metrics(&self, _symbol: &str) -> ApiResponse<FundamentalRiskMetrics> {
        unsupported(self.provider_type(), Operation::GetRiskMetrics)
    }

    async fn get_company_news(
        &self,
        _symbol: &str,
        _from: NaiveDate,
        _to: NaiveDate,
        _limit: usize,
    ) -> ApiResponse<Vec<NewsItem>> {
        unsupported(self.provider_type(), Operation::GetCompanyNews)
    }

    async fn get_economic_events(
        &self,
        _from: NaiveDate,
        _to: NaiveDate,
        _country: Option<&str>,
    ) -> ApiResponse<Vec<EconomicEvent>> {
        unsupported(self.provider_type(), Operation::GetEconomicEvents)
    }

    async fn get_historical_prices(
        &self,
        _symbol: &str,
        _period: BarPeriod,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> ApiResponse<Vec<Bar>> {
        unsupported(self.provider_type(), Operation::GetHistoricalPrices)
    }

    async fn get_enhanced_stock_data(&self, _symbol: &str) -> ApiResponse<EnhancedStockData> {
        unsupported(self.provider_type(), Operation::GetEnhancedStockData)
    }

    async fn analyze_pmcc_opportunity(
        &self,
        _candidate: &PmccCandidate,
        _enhanced: &EnhancedStockData,
        _context: &MarketContext,
    ) -> ApiResponse<AiInsights> {
        unsupported(self.provider_type(), Operation::AnalyzePmccOpportunity)
    }
}
