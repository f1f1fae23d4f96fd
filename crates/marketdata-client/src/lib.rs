//! MarketData.app adapter: real-time quotes and options chains with Greeks.
//!
//! Chains are requested calls-only over an expiration window wide enough to
//! cover both the LEAPS and the short-call legs in a single request, against
//! the cached feed, which bills per call instead of per contract.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use futures_util::future::join_all;
use reqwest::Client;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use scanner_core::{
    ApiResponse, DataProvider, Operation, OptionChain, OptionContract, OptionSide, ProviderError,
    ProviderHealth, ProviderType, StockQuote, Throttle,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct MarketDataConfig {
    pub api_token: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub requests_per_minute: usize,
    /// Use the cached feed, which bills one credit per call rather than one
    /// per returned contract.
    pub use_cached_feed: bool,
}

impl MarketDataConfig {
    pub fn new(api_token: String) -> Self {
        Self {
            api_token,
            base_url: "https://api.marketdata.app".to_string(),
            timeout_secs: 30,
            requests_per_minute: 100,
            use_cached_feed: true,
        }
    }
}

#[derive(Clone)]
pub struct MarketDataClient {
    config: MarketDataConfig,
    client: Client,
    throttle: Arc<Throttle>,
}

impl MarketDataClient {
    pub fn new(config: MarketDataConfig) -> Self {
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

    /// Send one request under the upstream quota and map HTTP-level failures
    /// onto the shared taxonomy. Retries are the router's job.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<String, ProviderError> {
        self.throttle.acquire().await;

        let response = builder
            .bearer_auth(&self.config.api_token)
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

    async fn fetch_quote(&self, symbol: &str) -> ApiResponse<StockQuote> {
        let url = format!("{}/v1/stocks/quotes/{}/", self.config.base_url, symbol);
        let body = match self.send_request(self.client.get(&url)).await {
            Ok(body) => body,
            Err(e) => return ApiResponse::err(e),
        };

        match parse_quote_response(symbol, &body) {
            Ok(Some(quote)) => ApiResponse::ok(quote),
            Ok(None) => ApiResponse::no_data(),
            Err(e) => ApiResponse::err(e),
        }
    }
}

#[async_trait]
impl DataProvider for MarketDataClient {
    fn provider_type(&self) -> ProviderType {
        ProviderType::MarketData
    }

    fn supports_operation(&self, operation: Operation) -> bool {
        matches!(
            operation,
            Operation::HealthCheck
                | Operation::GetStockQuote
                | Operation::GetStockQuotes
                | Operation::GetOptionsChain
        )
    }

    async fn health_check(&self) -> ApiResponse<ProviderHealth> {
        let started = Instant::now();
        match self.fetch_quote("SPY").await.status {
            scanner_core::ApiStatus::Ok | scanner_core::ApiStatus::NoData => ApiResponse::ok(
                ProviderHealth::healthy(started.elapsed().as_millis() as u64),
            ),
            scanner_core::ApiStatus::Error => {
                ApiResponse::ok(ProviderHealth::unhealthy("quote probe failed"))
            }
        }
    }

    async fn get_stock_quote(&self, symbol: &str) -> ApiResponse<StockQuote> {
        self.fetch_quote(symbol).await
    }

    async fn get_stock_quotes(&self, symbols: &[String]) -> ApiResponse<Vec<StockQuote>> {
        let fetches = symbols.iter().map(|symbol| self.fetch_quote(symbol));
        let results = join_all(fetches).await;

        let mut quotes = Vec::with_capacity(symbols.len());
        for (symbol, response) in symbols.iter().zip(results) {
            match response.into_result() {
                Ok(Some(quote)) => quotes.push(quote),
                Ok(None) => {}
                Err(e) => tracing::warn!("quote fetch failed for {}: {}", symbol, e),
            }
        }

        if quotes.is_empty() {
            ApiResponse::no_data()
        } else {
            ApiResponse::ok(quotes)
        }
    }

    async fn get_options_chain(
        &self,
        symbol: &str,
        expiration_from: Option<NaiveDate>,
        expiration_to: Option<NaiveDate>,
    ) -> ApiResponse<OptionChain> {
        let today = Utc::now().date_naive();
        // One wide window covers both the short-call and LEAPS legs so the
        // whole chain costs a single cached-feed call.
        let from = expiration_from.unwrap_or(today + ChronoDuration::days(21));
        let to = expiration_to.unwrap_or(today + ChronoDuration::days(730));

        let url = format!("{}/v1/options/chain/{}/", self.config.base_url, symbol);
        let mut request = self.client.get(&url).query(&[
            ("side", "call".to_string()),
            ("from", from.format("%Y-%m-%d").to_string()),
            ("to", to.format("%Y-%m-%d").to_string()),
        ]);
        if self.config.use_cached_feed {
            request = request.query(&[("feed", "cached")]);
        }

        let body = match self.send_request(request).await {
            Ok(body) => body,
            Err(e) => return ApiResponse::err(e),
        };

        match parse_chain_response(symbol, &body, Utc::now()) {
            Ok(Some(chain)) => {
                tracing::debug!(
                    symbol,
                    contracts = chain.contracts.len(),
                    "options chain fetched"
                );
                ApiResponse::ok(chain)
            }
            Ok(None) => ApiResponse::no_data(),
            Err(e) => ApiResponse::err(e),
        }
    }
}

// MarketData.app encodes every response as parallel arrays indexed by
// contract; a chain of N contracts is N entries in each column.
#[derive(Debug, Deserialize)]
struct ChainResponse {
    s: String,
    #[serde(default)]
    errmsg: Option<String>,
    #[serde(default, rename = "optionSymbol")]
    option_symbol: Vec<String>,
    #[serde(default)]
    underlying: Vec<String>,
    #[serde(default)]
    expiration: Vec<i64>,
    #[serde(default)]
    side: Vec<String>,
    #[serde(default)]
    strike: Vec<Option<f64>>,
    #[serde(default)]
    bid: Vec<Option<f64>>,
    #[serde(default)]
    ask: Vec<Option<f64>>,
    #[serde(default)]
    mid: Vec<Option<f64>>,
    #[serde(default)]
    last: Vec<Option<f64>>,
    #[serde(default, rename = "bidSize")]
    bid_size: Vec<Option<i64>>,
    #[serde(default, rename = "askSize")]
    ask_size: Vec<Option<i64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
    #[serde(default, rename = "openInterest")]
    open_interest: Vec<Option<i64>>,
    #[serde(default)]
    delta: Vec<Option<f64>>,
    #[serde(default)]
    gamma: Vec<Option<f64>>,
    #[serde(default)]
    theta: Vec<Option<f64>>,
    #[serde(default)]
    vega: Vec<Option<f64>>,
    #[serde(default)]
    iv: Vec<Option<f64>>,
    #[serde(default)]
    dte: Vec<Option<i64>>,
    #[serde(default, rename = "underlyingPrice")]
    underlying_price: Vec<Option<f64>>,
    #[serde(default)]
    updated: Vec<Option<i64>>,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    s: String,
    #[serde(default)]
    errmsg: Option<String>,
    #[serde(default)]
    symbol: Vec<String>,
    #[serde(default)]
    bid: Vec<Option<f64>>,
    #[serde(default)]
    ask: Vec<Option<f64>>,
    #[serde(default)]
    last: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
    #[serde(default)]
    change: Vec<Option<f64>>,
    #[serde(default, rename = "changepct")]
    change_pct: Vec<Option<f64>>,
    #[serde(default)]
    updated: Vec<Option<i64>>,
}

fn decimal(value: Option<f64>) -> Option<Decimal> {
    value.and_then(Decimal::from_f64)
}

fn column<T: Copy>(values: &[Option<T>], i: usize) -> Option<T> {
    values.get(i).copied().flatten()
}

fn parse_quote_response(symbol: &str, body: &str) -> Result<Option<StockQuote>, ProviderError> {
    let parsed: QuoteResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    match parsed.s.as_str() {
        "ok" => {}
        "no_data" => return Ok(None),
        _ => {
            return Err(ProviderError::Upstream {
                status: 200,
                message: parsed.errmsg.unwrap_or_else(|| "status not ok".into()),
            })
        }
    }

    if parsed.symbol.is_empty() {
        return Ok(None);
    }

    let timestamp = column(&parsed.updated, 0)
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .unwrap_or_else(Utc::now);

    let quote = StockQuote {
        symbol: symbol.to_string(),
        last: decimal(column(&parsed.last, 0)),
        bid: decimal(column(&parsed.bid, 0)),
        ask: decimal(column(&parsed.ask, 0)),
        volume: column(&parsed.volume, 0),
        timestamp,
        change: decimal(column(&parsed.change, 0)),
        change_percent: decimal(column(&parsed.change_pct, 0)),
        previous_close: None,
        market_cap: None,
    };

    if !quote.is_consistent() {
        return Err(ProviderError::Parse(format!(
            "inconsistent quote for {symbol}"
        )));
    }
    Ok(Some(quote))
}

fn parse_chain_response(
    symbol: &str,
    body: &str,
    now: DateTime<Utc>,
) -> Result<Option<OptionChain>, ProviderError> {
    let parsed: ChainResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    match parsed.s.as_str() {
        "ok" => {}
        "no_data" => return Ok(None),
        _ => {
            return Err(ProviderError::Upstream {
                status: 200,
                message: parsed.errmsg.unwrap_or_else(|| "status not ok".into()),
            })
        }
    }

    let count = parsed.option_symbol.len();
    if count == 0 {
        return Ok(None);
    }

    let mut contracts = Vec::with_capacity(count);
    for i in 0..count {
        let Some(strike) = decimal(column(&parsed.strike, i)) else {
            continue;
        };
        let side = match parsed.side.get(i).map(String::as_str) {
            Some("call") => OptionSide::Call,
            Some("put") => OptionSide::Put,
            _ => continue,
        };
        let Some(expiration) = parsed
            .expiration
            .get(i)
            .and_then(|&ts| DateTime::from_timestamp(ts, 0))
        else {
            continue;
        };

        let bid = decimal(column(&parsed.bid, i));
        let ask = decimal(column(&parsed.ask, i));
        let mid = match (bid, ask) {
            (Some(b), Some(a)) => Some((b + a) / Decimal::TWO),
            _ => decimal(column(&parsed.mid, i)),
        };
        let dte = column(&parsed.dte, i)
            .unwrap_or_else(|| (expiration - now).num_days().max(0));

        contracts.push(OptionContract {
            option_symbol: parsed.option_symbol[i].clone(),
            underlying: parsed
                .underlying
                .get(i)
                .cloned()
                .unwrap_or_else(|| symbol.to_string()),
            strike,
            expiration,
            side,
            bid,
            ask,
            mid,
            last: decimal(column(&parsed.last, i)),
            bid_size: column(&parsed.bid_size, i),
            ask_size: column(&parsed.ask_size, i),
            volume: column(&parsed.volume, i),
            open_interest: column(&parsed.open_interest, i),
            delta: decimal(column(&parsed.delta, i)),
            gamma: decimal(column(&parsed.gamma, i)),
            theta: decimal(column(&parsed.theta, i)),
            vega: decimal(column(&parsed.vega, i)),
            iv: decimal(column(&parsed.iv, i)),
            dte,
            underlying_price: decimal(column(&parsed.underlying_price, i)),
            updated: column(&parsed.updated, i).and_then(|ts| DateTime::from_timestamp(ts, 0)),
        });
    }

    if contracts.is_empty() {
        return Ok(None);
    }

    let underlying_price = contracts.iter().find_map(|c| c.underlying_price);
    Ok(Some(OptionChain {
        underlying: symbol.to_string(),
        underlying_price,
        updated: Some(now),
        contracts,
    }))
}
