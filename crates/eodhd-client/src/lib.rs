//! EODHD adapter: stock screening, fundamentals, calendar events, news,
//! technical indicators, economic events and historical prices.
//!
//! The screener splits the requested market-cap window into bands to get
//! around the upstream's per-query result cap; fundamentals are reduced to a
//! fixed schema before they leave this crate.

mod fundamentals;
mod screener;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::Client;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use scanner_core::{
    ApiResponse, Bar, BarPeriod, CalendarEvent, CalendarEventType, DataProvider, EconomicEvent,
    EnhancedStockData, FundamentalMetrics, FundamentalRiskMetrics, NewsItem, Operation,
    ProviderError, ProviderHealth, ProviderType, ScreenerResult, ScreeningCriteria, StockQuote,
    TechnicalIndicators, Throttle,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct EodhdConfig {
    pub api_token: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub requests_per_minute: usize,
}

impl EodhdConfig {
    pub fn new(api_token: String) -> Self {
        Self {
            api_token,
            base_url: "https://eodhd.com/api".to_string(),
            timeout_secs: 30,
            requests_per_minute: 60,
        }
    }
}

#[derive(Clone)]
pub struct EodhdClient {
    config: EodhdConfig,
    client: Client,
    throttle: Arc<Throttle>,
}

impl EodhdClient {
    pub fn new(config: EodhdConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        let throttle = Arc::new(Throttle::per_minute(config.requests_per_minute));

        Self {
            config,
            client,
            throttle,
        }
    }

    /// Send one request under the upstream quota and map HTTP failures onto
    /// the shared taxonomy. Retries are the router's job.
    pub(crate) async fn send_request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<String, ProviderError> {
        self.throttle.acquire().await;

        let response = builder
            .query(&[("api_token", self.config.api_token.as_str()), ("fmt", "json")])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout {
                        secs: self.config.timeout_secs,
                    }
                } else {
                    ProviderError::Transient(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        match status {
            200..=299 => response
                .text()
                .await
                .map_err(|e| ProviderError::Transient(e.to_string())),
            401 | 403 => Err(ProviderError::Authentication(format!("HTTP {status}"))),
            429 => {
                let retry_after_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                Err(ProviderError::RateLimited { retry_after_secs })
            }
            500..=599 => Err(ProviderError::Transient(format!("HTTP {status}"))),
            _ => Err(ProviderError::Upstream {
                status,
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    pub(crate) fn http(&self) -> &Client {
        &self.client
    }

    async fn fetch_raw_fundamentals(&self, symbol: &str) -> Result<serde_json::Value, ProviderError> {
        let url = self.url(&format!("/fundamentals/{symbol}.US"));
        let body = self.send_request(self.client.get(&url)).await?;
        serde_json::from_str(&body).map_err(|e| ProviderError::Parse(e.to_string()))
    }

    /// Latest value of one technical-indicator function. The upstream
    /// answers with a list of dated rows; only the newest matters here.
    async fn fetch_indicator(&self, symbol: &str, function: &str, period: u32) -> Option<f64> {
        let url = self.url(&format!("/technical/{symbol}.US"));
        let from = (Utc::now() - ChronoDuration::days(400)).date_naive();
        let body = self
            .send_request(self.client.get(&url).query(&[
                ("function", function.to_string()),
                ("period", period.to_string()),
                ("from", from.format("%Y-%m-%d").to_string()),
            ]))
            .await
            .ok()?;
        last_indicator_value(&body, function)
    }
}

/// Normalize the upstream's indicator payload to one number. Responses are
/// sometimes a list of objects keyed by function name, sometimes keyed by
/// a generic `value`; both collapse to the most recent row.
fn last_indicator_value(body: &str, function: &str) -> Option<f64> {
    let parsed: serde_json::Value = serde_json::from_str(body).ok()?;
    let rows = parsed.as_array()?;
    let last = rows.last()?;
    last.get(function)
        .or_else(|| last.get("value"))
        .and_then(|v| v.as_f64())
}

#[derive(Debug, Deserialize)]
struct RealTimeQuote {
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    close: Option<f64>,
    #[serde(default, rename = "previousClose")]
    previous_close: Option<f64>,
    #[serde(default)]
    change: Option<f64>,
    #[serde(default)]
    change_p: Option<f64>,
    #[serde(default)]
    volume: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct EodBar {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct EarningsCalendarResponse {
    #[serde(default)]
    earnings: Vec<EarningsRow>,
}

#[derive(Debug, Deserialize)]
struct EarningsRow {
    #[serde(default)]
    code: Option<String>,
    /// Announcement date. The `date` field is the fiscal quarter end and is
    /// deliberately ignored.
    #[serde(default)]
    report_date: Option<NaiveDate>,
    #[serde(default)]
    estimate: Option<f64>,
    #[serde(default)]
    actual: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DividendRow {
    date: NaiveDate,
    #[serde(default)]
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct NewsRow {
    #[serde(default)]
    date: Option<DateTime<Utc>>,
    title: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    sentiment: Option<NewsSentiment>,
}

#[derive(Debug, Deserialize)]
struct NewsSentiment {
    #[serde(default)]
    polarity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct EconomicEventRow {
    #[serde(default)]
    country: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    date: NaiveDate,
    #[serde(default)]
    actual: Option<f64>,
    #[serde(default)]
    estimate: Option<f64>,
    #[serde(default)]
    previous: Option<f64>,
}

fn decimal(value: Option<f64>) -> Option<Decimal> {
    value.and_then(Decimal::from_f64)
}

#[async_trait]
impl DataProvider for EodhdClient {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Eodhd
    }

    fn supports_operation(&self, operation: Operation) -> bool {
        matches!(
            operation,
            Operation::HealthCheck
                | Operation::GetStockQuote
                | Operation::ScreenStocks
                | Operation::GetFundamentalData
                | Operation::GetCalendarEvents
                | Operation::GetTechnicalIndicators
                | Operation::GetRiskMetrics
                | Operation::GetCompanyNews
                | Operation::GetEconomicEvents
                | Operation::GetHistoricalPrices
                | Operation::GetEnhancedStockData
        )
    }

    async fn health_check(&self) -> ApiResponse<ProviderHealth> {
        let started = Instant::now();
        let url = self.url("/real-time/SPY.US");
        match self.send_request(self.client.get(&url)).await {
            Ok(_) => ApiResponse::ok(ProviderHealth::healthy(
                started.elapsed().as_millis() as u64
            )),
            Err(e) => ApiResponse::ok(ProviderHealth::unhealthy(e.to_string())),
        }
    }

    async fn get_stock_quote(&self, symbol: &str) -> ApiResponse<StockQuote> {
        let url = self.url(&format!("/real-time/{symbol}.US"));
        let body = match self.send_request(self.client.get(&url)).await {
            Ok(body) => body,
            Err(e) => return ApiResponse::err(e),
        };

        let parsed: RealTimeQuote = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) => return ApiResponse::err(ProviderError::Parse(e.to_string())),
        };

        let Some(last) = parsed.close.filter(|&c| c > 0.0) else {
            return ApiResponse::no_data();
        };

        ApiResponse::ok(StockQuote {
            symbol: symbol.to_string(),
            last: decimal(Some(last)),
            bid: None,
            ask: None,
            volume: parsed.volume,
            timestamp: parsed
                .timestamp
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
                .unwrap_or_else(Utc::now),
            change: decimal(parsed.change),
            change_percent: decimal(parsed.change_p),
            previous_close: decimal(parsed.previous_close),
            market_cap: None,
        })
    }

    async fn screen_stocks(&self, criteria: &ScreeningCriteria) -> ApiResponse<Vec<ScreenerResult>> {
        screener::screen_stocks(self, criteria).await
    }

    async fn get_fundamental_data(&self, symbol: &str) -> ApiResponse<FundamentalMetrics> {
        let raw = match self.fetch_raw_fundamentals(symbol).await {
            Ok(raw) => raw,
            Err(e) => return ApiResponse::err(e),
        };
        match fundamentals::reduce_fundamentals(symbol, &raw) {
            Some(metrics) => ApiResponse::ok(metrics),
            None => ApiResponse::no_data(),
        }
    }

    async fn get_calendar_events(
        &self,
        symbol: &str,
        types: &[CalendarEventType],
        from: NaiveDate,
        to: NaiveDate,
    ) -> ApiResponse<Vec<CalendarEvent>> {
        let mut events = Vec::new();

        if types.contains(&CalendarEventType::Earnings) {
            let url = self.url("/calendar/earnings");
            let request = self.client.get(&url).query(&[
                ("symbols", format!("{symbol}.US")),
                ("from", from.format("%Y-%m-%d").to_string()),
                ("to", to.format("%Y-%m-%d").to_string()),
            ]);
            match self.send_request(request).await {
                Ok(body) => match serde_json::from_str::<EarningsCalendarResponse>(&body) {
                    Ok(parsed) => {
                        for row in parsed.earnings {
                            let Some(date) = row.report_date else {
                                continue;
                            };
                            if date < from || date > to {
                                continue;
                            }
                            if let Some(code) = &row.code {
                                if !code.starts_with(symbol) {
                                    continue;
                                }
                            }
                            events.push(CalendarEvent {
                                symbol: symbol.to_string(),
                                event_type: CalendarEventType::Earnings,
                                date,
                                estimate: decimal(row.estimate),
                                actual: decimal(row.actual),
                            });
                        }
                    }
                    Err(e) => return ApiResponse::err(ProviderError::Parse(e.to_string())),
                },
                Err(e) => return ApiResponse::err(e),
            }
        }

        if types.contains(&CalendarEventType::Dividend) {
            let url = self.url(&format!("/div/{symbol}.US"));
            let request = self.client.get(&url).query(&[
                ("from", from.format("%Y-%m-%d").to_string()),
                ("to", to.format("%Y-%m-%d").to_string()),
            ]);
            match self.send_request(request).await {
                Ok(body) => match serde_json::from_str::<Vec<DividendRow>>(&body) {
                    Ok(rows) => {
                        for row in rows {
                            events.push(CalendarEvent {
                                symbol: symbol.to_string(),
                                event_type: CalendarEventType::Dividend,
                                date: row.date,
                                estimate: None,
                                actual: decimal(row.value),
                            });
                        }
                    }
                    Err(e) => return ApiResponse::err(ProviderError::Parse(e.to_string())),
                },
                Err(e) => return ApiResponse::err(e),
            }
        }

        if events.is_empty() {
            ApiResponse::no_data()
        } else {
            events.sort_by_key(|e| e.date);
            ApiResponse::ok(events)
        }
    }

    async fn get_technical_indicators(&self, symbol: &str) -> ApiResponse<TechnicalIndicators> {
        let (rsi, atr, sma_20, sma_50, sma_200, macd_row, bbands, beta) = tokio::join!(
            self.fetch_indicator(symbol, "rsi", 14),
            self.fetch_indicator(symbol, "atr", 14),
            self.fetch_indicator(symbol, "sma", 20),
            self.fetch_indicator(symbol, "sma", 50),
            self.fetch_indicator(symbol, "sma", 200),
            self.fetch_macd(symbol),
            self.fetch_bbands(symbol),
            self.fetch_indicator(symbol, "beta", 252),
        );

        let (macd, macd_signal, macd_histogram) = macd_row.unwrap_or((None, None, None));
        let (bollinger_upper, bollinger_lower) = bbands.unwrap_or((None, None));
        let (week52_high, week52_low) = match self.fetch_raw_fundamentals(symbol).await {
            Ok(raw) => fundamentals::week52_levels(&raw),
            Err(_) => (None, None),
        };

        let indicators = TechnicalIndicators {
            symbol: symbol.to_string(),
            rsi_14: rsi,
            atr_14: atr,
            sma_20: decimal(sma_20),
            sma_50: decimal(sma_50),
            sma_200: decimal(sma_200),
            macd,
            macd_signal,
            macd_histogram,
            bollinger_upper: decimal(bollinger_upper),
            bollinger_lower: decimal(bollinger_lower),
            beta,
            week52_high,
            week52_low,
        };

        let has_any = indicators.rsi_14.is_some()
            || indicators.atr_14.is_some()
            || indicators.sma_50.is_some()
            || indicators.macd.is_some()
            || indicators.beta.is_some()
            || indicators.week52_high.is_some();
        if has_any {
            ApiResponse::ok(indicators)
        } else {
            ApiResponse::no_data()
        }
    }

    async fn get_risk_metrics(&self, symbol: &str) -> ApiResponse<FundamentalRiskMetrics> {
        let raw = match self.fetch_raw_fundamentals(symbol).await {
            Ok(raw) => raw,
            Err(e) => return ApiResponse::err(e),
        };
        match fundamentals::reduce_risk_metrics(symbol, &raw) {
            Some(metrics) => ApiResponse::ok(metrics),
            None => ApiResponse::no_data(),
        }
    }

    async fn get_company_news(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
        limit: usize,
    ) -> ApiResponse<Vec<NewsItem>> {
        let url = self.url("/news");
        let request = self.client.get(&url).query(&[
            ("s", format!("{symbol}.US")),
            ("from", from.format("%Y-%m-%d").to_string()),
            ("to", to.format("%Y-%m-%d").to_string()),
            ("limit", limit.to_string()),
        ]);
        let body = match self.send_request(request).await {
            Ok(body) => body,
            Err(e) => return ApiResponse::err(e),
        };

        let rows: Vec<NewsRow> = match serde_json::from_str(&body) {
            Ok(rows) => rows,
            Err(e) => return ApiResponse::err(ProviderError::Parse(e.to_string())),
        };

        let items: Vec<NewsItem> = rows
            .into_iter()
            .map(|row| NewsItem {
                title: row.title,
                source: row.source,
                date: row.date.unwrap_or_else(Utc::now),
                url: row.link,
                sentiment: row.sentiment.and_then(|s| s.polarity),
            })
            .collect();

        if items.is_empty() {
            ApiResponse::no_data()
        } else {
            ApiResponse::ok(items)
        }
    }

    async fn get_economic_events(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        country: Option<&str>,
    ) -> ApiResponse<Vec<EconomicEvent>> {
        let url = self.url("/economic-events");
        let mut request = self.client.get(&url).query(&[
            ("from", from.format("%Y-%m-%d").to_string()),
            ("to", to.format("%Y-%m-%d").to_string()),
        ]);
        if let Some(country) = country {
            request = request.query(&[("country", country)]);
        }

        let body = match self.send_request(request).await {
            Ok(body) => body,
            Err(e) => return ApiResponse::err(e),
        };

        let rows: Vec<EconomicEventRow> = match serde_json::from_str(&body) {
            Ok(rows) => rows,
            Err(e) => return ApiResponse::err(ProviderError::Parse(e.to_string())),
        };

        let events: Vec<EconomicEvent> = rows
            .into_iter()
            .map(|row| EconomicEvent {
                country: row.country.unwrap_or_else(|| "US".to_string()),
                event_type: row.event_type,
                date: row.date,
                actual: row.actual,
                estimate: row.estimate,
                previous: row.previous,
            })
            .collect();

        if events.is_empty() {
            ApiResponse::no_data()
        } else {
            ApiResponse::ok(events)
        }
    }

    async fn get_historical_prices(
        &self,
        symbol: &str,
        period: BarPeriod,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ApiResponse<Vec<Bar>> {
        let url = self.url(&format!("/eod/{symbol}.US"));
        let request = self.client.get(&url).query(&[
            ("period", period.as_str().to_string()),
            ("from", from.format("%Y-%m-%d").to_string()),
            ("to", to.format("%Y-%m-%d").to_string()),
        ]);
        let body = match self.send_request(request).await {
            Ok(body) => body,
            Err(e) => return ApiResponse::err(e),
        };

        let rows: Vec<EodBar> = match serde_json::from_str(&body) {
            Ok(rows) => rows,
            Err(e) => return ApiResponse::err(ProviderError::Parse(e.to_string())),
        };

        let bars: Vec<Bar> = rows
            .into_iter()
            .filter_map(|row| {
                Some(Bar {
                    date: row.date,
                    open: Decimal::from_f64(row.open)?,
                    high: Decimal::from_f64(row.high)?,
                    low: Decimal::from_f64(row.low)?,
                    close: Decimal::from_f64(row.close)?,
                    volume: row.volume.unwrap_or(0),
                })
            })
            .collect();

        if bars.is_empty() {
            ApiResponse::no_data()
        } else {
            ApiResponse::ok(bars)
        }
    }

    /// Composite package for the AI stage. Sub-fetches run concurrently and
    /// fail independently; a missing section lowers the completeness score
    /// instead of failing the whole composite.
    async fn get_enhanced_stock_data(&self, symbol: &str) -> ApiResponse<EnhancedStockData> {
        let today = Utc::now().date_naive();
        let calendar_types = [CalendarEventType::Earnings, CalendarEventType::Dividend];

        let (quote, fundamentals, calendar, technicals, risk, news, econ, history) = tokio::join!(
            self.get_stock_quote(symbol),
            self.get_fundamental_data(symbol),
            self.get_calendar_events(
                symbol,
                &calendar_types,
                today,
                today + ChronoDuration::days(45),
            ),
            self.get_technical_indicators(symbol),
            self.get_risk_metrics(symbol),
            self.get_company_news(symbol, today - ChronoDuration::days(7), today, 10),
            self.get_economic_events(today, today + ChronoDuration::days(14), Some("US")),
            self.get_historical_prices(
                symbol,
                BarPeriod::Daily,
                today - ChronoDuration::days(30),
                today,
            ),
        );

        // The quote anchors the composite; without it there is nothing to
        // analyze.
        let quote = match quote.into_result() {
            Ok(Some(quote)) => quote,
            Ok(None) => return ApiResponse::no_data(),
            Err(e) => return ApiResponse::err(e),
        };

        let mut enhanced = EnhancedStockData {
            quote,
            fundamentals: fundamentals.into_result().ok().flatten(),
            calendar_events: calendar.into_result().ok().flatten().unwrap_or_default(),
            technicals: technicals.into_result().ok().flatten(),
            risk_metrics: risk.into_result().ok().flatten(),
            news: news.into_result().ok().flatten().unwrap_or_default(),
            economic_events: econ.into_result().ok().flatten().unwrap_or_default(),
            historical_prices: history.into_result().ok().flatten().unwrap_or_default(),
            completeness_score: 0.0,
        };
        enhanced.completeness_score = enhanced.compute_completeness();

        tracing::debug!(
            symbol,
            completeness = enhanced.completeness_score,
            "enhanced stock data assembled"
        );
        ApiResponse::ok(enhanced)
    }
}

impl EodhdClient {
    /// MACD needs three values from one response row.
    async fn fetch_macd(&self, symbol: &str) -> Option<(Option<f64>, Option<f64>, Option<f64>)> {
        let url = self.url(&format!("/technical/{symbol}.US"));
        let from = (Utc::now() - ChronoDuration::days(400)).date_naive();
        let body = self
            .send_request(self.client.get(&url).query(&[
                ("function", "macd".to_string()),
                ("from", from.format("%Y-%m-%d").to_string()),
            ]))
            .await
            .ok()?;

        let parsed: serde_json::Value = serde_json::from_str(&body).ok()?;
        let last = parsed.as_array()?.last()?;
        Some((
            last.get("macd").and_then(|v| v.as_f64()),
            last.get("signal").and_then(|v| v.as_f64()),
            last.get("divergence").and_then(|v| v.as_f64()),
        ))
    }

    /// Bollinger bands come back as upper/middle/lower columns per row.
    async fn fetch_bbands(&self, symbol: &str) -> Option<(Option<f64>, Option<f64>)> {
        let url = self.url(&format!("/technical/{symbol}.US"));
        let from = (Utc::now() - ChronoDuration::days(120)).date_naive();
        let body = self
            .send_request(self.client.get(&url).query(&[
                ("function", "bbands".to_string()),
                ("period", "20".to_string()),
                ("from", from.format("%Y-%m-%d").to_string()),
            ]))
            .await
            .ok()?;

        let parsed: serde_json::Value = serde_json::from_str(&body).ok()?;
        let last = parsed.as_array()?.last()?;
        Some((
            last.get("uband").and_then(|v| v.as_f64()),
            last.get("lband").and_then(|v| v.as_f64()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_rows_normalize_to_last_value() {
        let body = r#"[
            {"date": "2026-07-29", "rsi": 44.1},
            {"date": "2026-07-30", "rsi": 47.9},
            {"date": "2026-07-31", "rsi": 52.3}
        ]"#;
        assert_eq!(last_indicator_value(body, "rsi"), Some(52.3));
    }

    #[test]
    fn indicator_value_key_fallback() {
        let body = r#"[{"date": "2026-07-31", "value": 1.08}]"#;
        assert_eq!(last_indicator_value(body, "beta"), Some(1.08));
    }

    #[test]
    fn indicator_garbage_is_none() {
        assert_eq!(last_indicator_value("not json", "rsi"), None);
        assert_eq!(last_indicator_value("{}", "rsi"), None);
    }
}
