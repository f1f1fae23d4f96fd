use std::sync::Arc;

use anyhow::{Context, Result};
use claude_client::{ClaudeClient, ClaudeConfig};
use eodhd_client::{EodhdClient, EodhdConfig};
use marketdata_client::{MarketDataClient, MarketDataConfig};
use provider_router::{ProviderRouter, RouterConfig};
use scan_orchestrator::{PmccScanner, ScanConfig};

mod config;

use config::AgentConfig;

/// Structured logging, filtered by RUST_LOG (default info). Setting
/// RUST_LOG_FORMAT=json switches to line-delimited JSON for log shippers.
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let wants_json = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if wants_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    tracing::info!("Starting PMCC scanner");

    // Configuration: environment first, CLI overrides on top. A bad
    // configuration exits non-zero before any provider is touched.
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = AgentConfig::from_env()
        .and_then(|c| c.apply_args(&args))
        .context("invalid configuration")?;

    tracing::info!("Configuration loaded");
    tracing::info!("  Max stocks to screen: {}", config.max_stocks_to_screen);
    tracing::info!("  Max opportunities: {}", config.max_opportunities);
    tracing::info!("  Min total score: {}", config.min_total_score);
    tracing::info!("  AI analysis: {}", if config.ai_enabled() { "on" } else { "off" });
    tracing::info!("  Output directory: {}", config.output_dir.display());

    // Register whichever providers have credentials; the router degrades
    // around the missing ones.
    let mut router = ProviderRouter::new(RouterConfig::default());

    if let Some(token) = config.eodhd_api_token.clone() {
        router.register(Arc::new(EodhdClient::new(EodhdConfig::new(token))));
    }
    if let Some(token) = config.marketdata_api_token.clone() {
        router.register(Arc::new(MarketDataClient::new(MarketDataConfig::new(token))));
    }
    if let Some(api_key) = config.claude_api_key.clone() {
        let mut claude_config = ClaudeConfig::new(api_key);
        claude_config.model = config.claude_model.clone();
        claude_config.daily_cost_limit = config.claude_daily_cost_limit;
        claude_config.max_concurrent = config.ai_pool_size;
        if config.debug_claude_responses {
            claude_config.debug_dump_dir = Some(config.output_dir.join("debug_claude_responses"));
        }
        router.register(Arc::new(ClaudeClient::new(claude_config)));
    }

    // One scan per invocation
    let scan_config = ScanConfig {
        universe: config.universe.clone(),
        max_stocks_to_screen: config.max_stocks_to_screen,
        max_opportunities: config.max_opportunities,
        min_total_score: config.min_total_score,
        worker_pool_size: config.worker_pool_size,
        ai_enabled: config.ai_enabled(),
        ai_pool_size: config.ai_pool_size,
        min_completeness: config.claude_min_completeness,
        output_dir: config.output_dir.clone(),
        scan_timeout_secs: config.scan_timeout_secs,
        ..ScanConfig::default()
    };

    let scanner = PmccScanner::new(Arc::new(router), scan_config);
    let results = scanner.run().await.context("scan failed")?;

    // Per-symbol errors are part of a normal run; the process still exits
    // zero.
    tracing::info!("Scan {} complete", results.scan_id);
    tracing::info!(
        "  {} screened, {} analyzed, {} opportunities",
        results.stocks_screened,
        results.options_analyzed,
        results.opportunities_found
    );
    for opportunity in &results.top_opportunities {
        tracing::info!(
            "  #{} {} debit ${} max profit ${} score {:.1}",
            opportunity.rank.unwrap_or(0),
            opportunity.symbol,
            opportunity.net_debit,
            opportunity.risk_metrics.max_profit,
            opportunity.ranking_score()
        );
    }
    if !results.errors.is_empty() {
        tracing::warn!("  {} symbol-level errors (see export)", results.errors.len());
    }

    Ok(())
}
