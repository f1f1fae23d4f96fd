use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Stock quote snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockQuote {
    pub symbol: String,
    pub last: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub volume: Option<i64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub change: Option<Decimal>,
    #[serde(default)]
    pub change_percent: Option<Decimal>,
    #[serde(default)]
    pub previous_close: Option<Decimal>,
    #[serde(default)]
    pub market_cap: Option<Decimal>,
}

impl StockQuote {
    /// Sanity check: positive last price, bid not above ask.
    pub fn is_consistent(&self) -> bool {
        if let Some(last) = self.last {
            if last <= Decimal::ZERO {
                return false;
            }
        }
        if let (Some(bid), Some(ask)) = (self.bid, self.ask) {
            if bid > ask {
                return false;
            }
        }
        true
    }

    /// Quote is stale if its timestamp is more than 24 hours old.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.timestamp) > chrono::Duration::hours(24)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionSide {
    Call,
    Put,
}

impl OptionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionSide::Call => "call",
            OptionSide::Put => "put",
        }
    }
}

/// Single option contract. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub option_symbol: String,
    pub underlying: String,
    pub strike: Decimal,
    pub expiration: DateTime<Utc>,
    pub side: OptionSide,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub mid: Option<Decimal>,
    pub last: Option<Decimal>,
    #[serde(default)]
    pub bid_size: Option<i64>,
    #[serde(default)]
    pub ask_size: Option<i64>,
    pub volume: Option<i64>,
    pub open_interest: Option<i64>,
    pub delta: Option<Decimal>,
    pub gamma: Option<Decimal>,
    pub theta: Option<Decimal>,
    pub vega: Option<Decimal>,
    pub iv: Option<Decimal>,
    pub dte: i64,
    pub underlying_price: Option<Decimal>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

impl OptionContract {
    /// Bid-ask spread, when both sides are quoted.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Spread as a percentage of the mid price.
    pub fn spread_percentage(&self) -> Option<Decimal> {
        let spread = self.spread()?;
        let mid = self.mid?;
        if mid <= Decimal::ZERO {
            return None;
        }
        Some(spread / mid * Decimal::ONE_HUNDRED)
    }

    /// A bid above the ask means the market is crossed and the quote is junk.
    pub fn is_crossed(&self) -> bool {
        matches!((self.bid, self.ask), (Some(bid), Some(ask)) if bid > ask)
    }

    pub fn has_greeks(&self) -> bool {
        self.delta.is_some() && self.gamma.is_some() && self.theta.is_some() && self.vega.is_some()
    }

    /// For calls: underlying trading above the strike.
    pub fn in_the_money(&self) -> bool {
        let Some(underlying_price) = self.underlying_price else {
            return false;
        };
        match self.side {
            OptionSide::Call => underlying_price > self.strike,
            OptionSide::Put => underlying_price < self.strike,
        }
    }

    pub fn intrinsic_value(&self) -> Option<Decimal> {
        let underlying_price = self.underlying_price?;
        let intrinsic = match self.side {
            OptionSide::Call => underlying_price - self.strike,
            OptionSide::Put => self.strike - underlying_price,
        };
        Some(intrinsic.max(Decimal::ZERO))
    }

    pub fn extrinsic_value(&self) -> Option<Decimal> {
        let mid = self.mid?;
        let intrinsic = self.intrinsic_value()?;
        Some((mid - intrinsic).max(Decimal::ZERO))
    }

    /// Underlying price over strike; > 1 means an ITM call.
    pub fn moneyness(&self) -> Option<Decimal> {
        let underlying_price = self.underlying_price?;
        if self.strike <= Decimal::ZERO {
            return None;
        }
        Some(underlying_price / self.strike)
    }

    /// Long-dated contract usable as a stock surrogate.
    pub fn is_leaps(&self) -> bool {
        self.dte >= 270
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.updated {
            Some(updated) => now.signed_duration_since(updated) > chrono::Duration::hours(24),
            None => false,
        }
    }
}

/// Options chain for one underlying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChain {
    pub underlying: String,
    pub underlying_price: Option<Decimal>,
    pub updated: Option<DateTime<Utc>>,
    pub contracts: Vec<OptionContract>,
}

impl OptionChain {
    /// Every contract must carry the chain's underlying symbol.
    pub fn is_consistent(&self) -> bool {
        self.contracts.iter().all(|c| c.underlying == self.underlying)
    }

    pub fn calls(&self) -> impl Iterator<Item = &OptionContract> {
        self.contracts.iter().filter(|c| c.side == OptionSide::Call)
    }

    /// Earliest and latest expiration present in the chain.
    pub fn expiration_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let min = self.contracts.iter().map(|c| c.expiration).min()?;
        let max = self.contracts.iter().map(|c| c.expiration).max()?;
        Some((min, max))
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

/// First-pass universe filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningCriteria {
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub min_market_cap: Option<Decimal>,
    pub max_market_cap: Option<Decimal>,
    pub min_volume: Option<i64>,
    pub exchanges: Vec<String>,
    pub exclude_penny_stocks: bool,
    pub exclude_etfs: bool,
    pub limit: Option<usize>,
}

impl Default for ScreeningCriteria {
    fn default() -> Self {
        Self {
            min_price: Some(Decimal::new(5, 0)),
            max_price: None,
            min_market_cap: Some(Decimal::new(50_000_000, 0)),
            max_market_cap: Some(Decimal::new(5_000_000_000, 0)),
            min_volume: Some(100_000),
            exchanges: vec!["NYSE".to_string(), "NASDAQ".to_string()],
            exclude_penny_stocks: true,
            exclude_etfs: true,
            limit: None,
        }
    }
}

/// One row out of the stock screener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenerResult {
    pub symbol: String,
    pub name: Option<String>,
    pub exchange: Option<String>,
    pub market_cap: Option<Decimal>,
    pub price: Option<Decimal>,
    pub volume: Option<i64>,
    #[serde(default)]
    pub security_type: Option<String>,
}

impl ScreenerResult {
    pub fn is_etf(&self) -> bool {
        self.security_type
            .as_deref()
            .map(|t| t.eq_ignore_ascii_case("etf") || t.eq_ignore_ascii_case("fund"))
            .unwrap_or(false)
    }
}

/// Fundamentals reduced to a fixed schema. Raw upstream payloads never leave
/// the adapter; quarterly statements are reduced to the most recent quarter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalMetrics {
    pub symbol: String,
    // Company info
    pub company_name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<Decimal>,
    // Profitability
    pub revenue_ttm: Option<Decimal>,
    pub net_income_ttm: Option<Decimal>,
    pub gross_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub profit_margin: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub return_on_assets: Option<f64>,
    // Valuation
    pub pe_ratio: Option<f64>,
    pub peg_ratio: Option<f64>,
    pub price_to_book: Option<f64>,
    pub eps: Option<Decimal>,
    // Dividends
    pub dividend_yield: Option<f64>,
    pub dividend_per_share: Option<Decimal>,
    pub ex_dividend_date: Option<NaiveDate>,
    // Analyst view
    pub analyst_rating: Option<String>,
    pub analyst_target_price: Option<Decimal>,
    pub analyst_count: Option<i32>,
    // Balance sheet, most recent quarter
    pub total_assets: Option<Decimal>,
    pub total_liabilities: Option<Decimal>,
    pub total_equity: Option<Decimal>,
    pub cash_and_equivalents: Option<Decimal>,
    pub total_debt: Option<Decimal>,
    pub debt_to_equity: Option<f64>,
    pub current_ratio: Option<f64>,
    // Cash flow, most recent quarter
    pub operating_cash_flow: Option<Decimal>,
    pub free_cash_flow: Option<Decimal>,
    // Income statement, most recent quarter
    pub quarterly_revenue: Option<Decimal>,
    pub quarterly_net_income: Option<Decimal>,
    pub fiscal_period: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarEventType {
    Earnings,
    Dividend,
}

/// Upcoming corporate event. For earnings the date is the announcement date,
/// not the fiscal quarter end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub symbol: String,
    pub event_type: CalendarEventType,
    pub date: NaiveDate,
    pub estimate: Option<Decimal>,
    pub actual: Option<Decimal>,
}

/// Technical indicator snapshot, normalized to one shape inside the adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalIndicators {
    pub symbol: String,
    pub rsi_14: Option<f64>,
    pub atr_14: Option<f64>,
    pub sma_20: Option<Decimal>,
    pub sma_50: Option<Decimal>,
    pub sma_200: Option<Decimal>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub bollinger_upper: Option<Decimal>,
    pub bollinger_lower: Option<Decimal>,
    pub beta: Option<f64>,
    pub week52_high: Option<Decimal>,
    pub week52_low: Option<Decimal>,
}

/// Fundamental risk profile of the underlying (distinct from position risk).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalRiskMetrics {
    pub symbol: String,
    pub volatility: Option<f64>,
    pub beta: Option<f64>,
    pub short_interest: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub current_ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub source: Option<String>,
    pub date: DateTime<Utc>,
    pub url: Option<String>,
    pub sentiment: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicEvent {
    pub country: String,
    pub event_type: String,
    pub date: NaiveDate,
    pub actual: Option<f64>,
    pub estimate: Option<f64>,
    pub previous: Option<f64>,
}

/// OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl BarPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarPeriod::Daily => "d",
            BarPeriod::Weekly => "w",
            BarPeriod::Monthly => "m",
        }
    }
}

/// Composite per-symbol package assembled for the AI analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedStockData {
    pub quote: StockQuote,
    pub fundamentals: Option<FundamentalMetrics>,
    pub calendar_events: Vec<CalendarEvent>,
    pub technicals: Option<TechnicalIndicators>,
    pub risk_metrics: Option<FundamentalRiskMetrics>,
    pub news: Vec<NewsItem>,
    pub economic_events: Vec<EconomicEvent>,
    pub historical_prices: Vec<Bar>,
    pub completeness_score: f64,
}

impl EnhancedStockData {
    /// Fraction of optional sections populated, 0-100.
    pub fn compute_completeness(&self) -> f64 {
        let sections: [bool; 7] = [
            self.fundamentals.is_some(),
            !self.calendar_events.is_empty(),
            self.technicals.is_some(),
            self.risk_metrics.is_some(),
            !self.news.is_empty(),
            !self.economic_events.is_empty(),
            !self.historical_prices.is_empty(),
        ];
        let populated = sections.iter().filter(|&&s| s).count();
        populated as f64 / sections.len() as f64 * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Maintenance,
}

impl ProviderStatus {
    /// Degraded providers still take traffic; unhealthy ones do not.
    pub fn is_usable(&self) -> bool {
        matches!(self, ProviderStatus::Healthy | ProviderStatus::Degraded)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub status: ProviderStatus,
    pub last_check: DateTime<Utc>,
    pub latency_ms: Option<u64>,
    pub success_rate: f64,
    pub rate_limit_remaining: Option<i64>,
    pub rate_limit_reset: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl ProviderHealth {
    pub fn healthy(latency_ms: u64) -> Self {
        Self {
            status: ProviderStatus::Healthy,
            last_check: Utc::now(),
            latency_ms: Some(latency_ms),
            success_rate: 1.0,
            rate_limit_remaining: None,
            rate_limit_reset: None,
            error_message: None,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: ProviderStatus::Unhealthy,
            last_check: Utc::now(),
            latency_ms: None,
            success_rate: 0.0,
            rate_limit_remaining: None,
            rate_limit_reset: None,
            error_message: Some(message.into()),
        }
    }
}

/// Position-level risk block for a PMCC pair. All monetary fields are exact
/// decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub max_loss: Decimal,
    pub max_profit: Decimal,
    pub breakeven: Decimal,
    pub risk_reward: Decimal,
    pub net_delta: Option<Decimal>,
    pub net_gamma: Option<Decimal>,
    pub net_theta: Option<Decimal>,
    pub net_vega: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Buy,
    Hold,
    Avoid,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Buy => "buy",
            Recommendation::Hold => "hold",
            Recommendation::Avoid => "avoid",
        }
    }
}

/// Strict response contract of the AI analyst.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiInsights {
    pub symbol: String,
    pub pmcc_score: f64,
    #[serde(default)]
    pub execution_risk_score: Option<f64>,
    #[serde(default)]
    pub financial_stability_score: Option<f64>,
    #[serde(default)]
    pub calendar_event_score: Option<f64>,
    #[serde(default)]
    pub technical_setup_score: Option<f64>,
    pub recommendation: Recommendation,
    #[serde(default)]
    pub confidence_level: Option<f64>,
    #[serde(default)]
    pub key_risks: Vec<String>,
    #[serde(default)]
    pub key_opportunities: Vec<String>,
    #[serde(default)]
    pub management_strategy: Option<String>,
    #[serde(default)]
    pub entry_timing: Option<String>,
    #[serde(default)]
    pub exit_conditions: Vec<String>,
    #[serde(default)]
    pub position_sizing: Option<String>,
}

/// Scan-level context handed to the AI analyst alongside each candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub scan_date: Option<NaiveDate>,
    pub total_candidates: usize,
    pub market_regime: Option<String>,
}

/// A scored PMCC candidate. AI fields are declared up front and stay None
/// until the augmentation stage fills them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmccCandidate {
    pub symbol: String,
    pub underlying_price: Decimal,
    pub long_call: OptionContract,
    pub short_call: OptionContract,
    pub net_debit: Decimal,
    pub risk_metrics: RiskMetrics,
    pub liquidity_score: f64,
    pub volatility_score: Option<f64>,
    pub technical_score: Option<f64>,
    pub fundamental_score: Option<f64>,
    pub probability_score: f64,
    pub total_score: f64,
    pub rank: Option<u32>,
    pub ai_insights: Option<AiInsights>,
    pub claude_score: Option<f64>,
    pub combined_score: Option<f64>,
    pub claude_reasoning: Option<String>,
    pub ai_recommendation: Option<String>,
    pub claude_confidence: Option<f64>,
    pub ai_analysis_timestamp: Option<DateTime<Utc>>,
    pub discovered_at: DateTime<Utc>,
}

impl PmccCandidate {
    /// Structural validity of the diagonal: long call under short call strike,
    /// long-dated over short-dated, positive debit.
    pub fn is_valid_pmcc(&self) -> bool {
        self.long_call.side == OptionSide::Call
            && self.short_call.side == OptionSide::Call
            && self.long_call.strike < self.short_call.strike
            && self.long_call.dte > self.short_call.dte
            && self.net_debit > Decimal::ZERO
    }

    pub fn is_profitable(&self) -> bool {
        self.risk_metrics.max_profit > Decimal::ZERO
    }

    pub fn strike_width(&self) -> Decimal {
        self.short_call.strike - self.long_call.strike
    }

    /// Score used for final ranking: combined when AI ran, quantitative
    /// otherwise.
    pub fn ranking_score(&self) -> f64 {
        self.combined_score.unwrap_or(self.total_score)
    }
}
