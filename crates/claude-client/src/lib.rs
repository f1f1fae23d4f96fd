//! Claude adapter: per-candidate PMCC analysis.
//!
//! Supports exactly one operation, `analyze_pmcc_opportunity`. Each request
//! carries a dense context package assembled from the candidate and its
//! enhanced stock data, is parsed strictly as JSON (with a single reminder
//! retry), and is accounted against a daily dollar budget.

mod parse;
mod prompt;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use scanner_core::{
    AiInsights, ApiResponse, DataProvider, EnhancedStockData, MarketContext, Operation,
    PmccCandidate, ProviderError, ProviderHealth, ProviderType,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_RESPONSE_TOKENS: u32 = 2000;

// Rough per-token pricing used for budget accounting.
const INPUT_COST_PER_MTOK: f64 = 3.0;
const OUTPUT_COST_PER_MTOK: f64 = 15.0;

#[derive(Debug, Clone)]
pub struct ClaudeConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Hard daily spend ceiling in USD; requests past it are skipped.
    pub daily_cost_limit: f64,
    pub max_concurrent: usize,
    /// When set, raw model responses are dumped here keyed by symbol and
    /// timestamp.
    pub debug_dump_dir: Option<PathBuf>,
}

impl ClaudeConfig {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: "claude-3-5-sonnet-20241022".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            timeout_secs: 60,
            daily_cost_limit: 10.0,
            max_concurrent: 5,
            debug_dump_dir: None,
        }
    }
}

struct BudgetState {
    date: NaiveDate,
    spent_usd: f64,
}

pub struct ClaudeClient {
    config: ClaudeConfig,
    client: Client,
    budget: Mutex<BudgetState>,
    permits: Arc<Semaphore>,
}

impl ClaudeClient {
    pub fn new(config: ClaudeConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        let permits = Arc::new(Semaphore::new(config.max_concurrent));

        Self {
            config,
            client,
            budget: Mutex::new(BudgetState {
                date: Utc::now().date_naive(),
                spent_usd: 0.0,
            }),
            permits,
        }
    }

    /// Dollars spent against today's budget.
    pub async fn spent_today(&self) -> f64 {
        let budget = self.budget.lock().await;
        if budget.date == Utc::now().date_naive() {
            budget.spent_usd
        } else {
            0.0
        }
    }

    async fn check_budget(&self) -> Result<(), ProviderError> {
        let mut budget = self.budget.lock().await;
        let today = Utc::now().date_naive();
        if budget.date != today {
            budget.date = today;
            budget.spent_usd = 0.0;
        }
        if budget.spent_usd >= self.config.daily_cost_limit {
            return Err(ProviderError::BudgetExhausted(format!(
                "${:.2} of ${:.2} spent today",
                budget.spent_usd, self.config.daily_cost_limit
            )));
        }
        Ok(())
    }

    async fn record_cost(&self, usage: &Usage) {
        let cost = usage.input_tokens as f64 * INPUT_COST_PER_MTOK / 1_000_000.0
            + usage.output_tokens as f64 * OUTPUT_COST_PER_MTOK / 1_000_000.0;
        let mut budget = self.budget.lock().await;
        budget.spent_usd += cost;
        tracing::debug!(
            cost_usd = cost,
            spent_today = budget.spent_usd,
            "recorded analysis cost"
        );
    }

    async fn send_message(&self, prompt: &str) -> Result<(String, Usage), ProviderError> {
        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: MAX_RESPONSE_TOKENS,
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
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
            200..=299 => {}
            401 | 403 => return Err(ProviderError::Authentication(format!("HTTP {status}"))),
            429 => {
                let retry_after_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                return Err(ProviderError::RateLimited { retry_after_secs });
            }
            500..=599 => return Err(ProviderError::Transient(format!("HTTP {status}"))),
            _ => {
                return Err(ProviderError::Upstream {
                    status,
                    message: response.text().await.unwrap_or_default(),
                })
            }
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let text = parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| ProviderError::Parse("response without text content".to_string()))?;

        Ok((text, parsed.usage.unwrap_or_default()))
    }

    fn dump_response(&self, symbol: &str, text: &str) {
        let Some(dir) = &self.config.debug_dump_dir else {
            return;
        };
        let path = dir.join(format!(
            "{symbol}_{}.json",
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        if let Err(e) = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, text)) {
            tracing::warn!("failed to dump analysis response to {:?}: {}", path, e);
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[async_trait]
impl DataProvider for ClaudeClient {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Claude
    }

    fn supports_operation(&self, operation: Operation) -> bool {
        matches!(
            operation,
            Operation::HealthCheck | Operation::AnalyzePmccOpportunity
        )
    }

    async fn health_check(&self) -> ApiResponse<ProviderHealth> {
        if self.config.api_key.trim().is_empty() {
            ApiResponse::ok(ProviderHealth::unhealthy("API key not configured"))
        } else {
            ApiResponse::ok(ProviderHealth::healthy(0))
        }
    }

    async fn analyze_pmcc_opportunity(
        &self,
        candidate: &PmccCandidate,
        enhanced: &EnhancedStockData,
        context: &MarketContext,
    ) -> ApiResponse<AiInsights> {
        let _permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return ApiResponse::err(ProviderError::Transient("permits closed".to_string()))
            }
        };

        if let Err(e) = self.check_budget().await {
            tracing::info!(symbol = %candidate.symbol, "skipping AI analysis: {}", e);
            return ApiResponse::err(e);
        }

        let base_prompt = prompt::build_analysis_prompt(candidate, enhanced, context);
        let mut current_prompt = base_prompt.clone();

        for attempt in 0..2 {
            let (text, usage) = match self.send_message(&current_prompt).await {
                Ok(result) => result,
                Err(e) => return ApiResponse::err(e),
            };
            self.record_cost(&usage).await;
            self.dump_response(&candidate.symbol, &text);

            match parse::parse_insights(&text) {
                Ok(insights) => return ApiResponse::ok(insights),
                Err(e) if attempt == 0 => {
                    tracing::warn!(
                        symbol = %candidate.symbol,
                        error = %e,
                        "analysis response unparseable, retrying with reminder"
                    );
                    current_prompt = format!(
                        "{base_prompt}\n\nReminder: respond with ONLY the JSON object in \
                         the exact structure requested, with no surrounding commentary."
                    );
                }
                Err(e) => return ApiResponse::err(e),
            }
        }

        unreachable!("analysis loop returns within two attempts")
    }
}
