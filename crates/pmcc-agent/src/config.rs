use anyhow::{bail, Result};
use std::env;
use std::path::PathBuf;

/// Agent configuration loaded from the environment, with CLI overrides
/// applied on top. No global singleton: the value is built once in main and
/// injected downward.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    // Provider credentials; any subset may be absent
    pub eodhd_api_token: Option<String>,
    pub marketdata_api_token: Option<String>,
    pub claude_api_key: Option<String>,

    // AI analyst
    pub claude_model: String,
    pub claude_daily_cost_limit: f64,
    pub claude_min_completeness: f64,
    pub debug_claude_responses: bool,

    // Scan shape
    pub universe: Option<Vec<String>>,
    pub max_stocks_to_screen: usize,
    pub max_opportunities: usize,
    pub min_total_score: f64,
    pub worker_pool_size: usize,
    pub ai_pool_size: usize,
    pub scan_timeout_secs: Option<u64>,

    // Output
    pub output_dir: PathBuf,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            eodhd_api_token: env::var("EODHD_API_TOKEN").ok().filter(|t| !t.is_empty()),
            marketdata_api_token: env::var("MARKETDATA_API_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            claude_api_key: env::var("CLAUDE_API_KEY").ok().filter(|k| !k.is_empty()),

            claude_model: env::var("CLAUDE_MODEL")
                .unwrap_or_else(|_| "claude-3-5-sonnet-20241022".to_string()),
            claude_daily_cost_limit: env_parse("CLAUDE_DAILY_COST_LIMIT", 10.0),
            claude_min_completeness: env_parse("CLAUDE_MIN_COMPLETENESS", 60.0),
            debug_claude_responses: env_parse("DEBUG_CLAUDE_RESPONSES", false),

            universe: env::var("SCAN_UNIVERSE").ok().map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),
            max_stocks_to_screen: env_parse("MAX_STOCKS_TO_SCREEN", 100),
            max_opportunities: env_parse("MAX_OPPORTUNITIES", 25),
            min_total_score: env_parse("MIN_TOTAL_SCORE", 50.0),
            worker_pool_size: env_parse("WORKER_POOL_SIZE", 10),
            ai_pool_size: env_parse("AI_POOL_SIZE", 5),
            scan_timeout_secs: env::var("SCAN_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()),

            output_dir: PathBuf::from(env::var("OUTPUT_DIR").unwrap_or_else(|_| "data".to_string())),
        };

        config.validate()?;
        Ok(config)
    }

    /// Apply the thin CLI surface: one scan per invocation with optional
    /// overrides.
    pub fn apply_args(mut self, args: &[String]) -> Result<Self> {
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--universe" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--universe needs a symbol list"))?;
                    self.universe = Some(
                        value
                            .split(',')
                            .map(|s| s.trim().to_uppercase())
                            .filter(|s| !s.is_empty())
                            .collect(),
                    );
                }
                "--max-stocks" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--max-stocks needs a number"))?;
                    self.max_stocks_to_screen = value.parse()?;
                }
                "--max-opportunities" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--max-opportunities needs a number"))?;
                    self.max_opportunities = value.parse()?;
                }
                "--min-score" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--min-score needs a number"))?;
                    self.min_total_score = value.parse()?;
                }
                other => bail!("unknown argument: {other}"),
            }
        }
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.eodhd_api_token.is_none() && self.marketdata_api_token.is_none() {
            bail!(
                "no data provider configured: set EODHD_API_TOKEN and/or MARKETDATA_API_TOKEN"
            );
        }
        if self.claude_daily_cost_limit < 0.0 {
            bail!("CLAUDE_DAILY_COST_LIMIT must be non-negative");
        }
        Ok(())
    }

    pub fn ai_enabled(&self) -> bool {
        self.claude_api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AgentConfig {
        AgentConfig {
            eodhd_api_token: Some("token".to_string()),
            marketdata_api_token: None,
            claude_api_key: None,
            claude_model: "claude-3-5-sonnet-20241022".to_string(),
            claude_daily_cost_limit: 10.0,
            claude_min_completeness: 60.0,
            debug_claude_responses: false,
            universe: None,
            max_stocks_to_screen: 100,
            max_opportunities: 25,
            min_total_score: 50.0,
            worker_pool_size: 10,
            ai_pool_size: 5,
            scan_timeout_secs: None,
            output_dir: PathBuf::from("data"),
        }
    }

    #[test]
    fn args_override_env() {
        let args: Vec<String> = [
            "--universe",
            "aapl, msft",
            "--max-opportunities",
            "10",
            "--min-score",
            "70",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let config = base_config().apply_args(&args).unwrap();
        assert_eq!(
            config.universe,
            Some(vec!["AAPL".to_string(), "MSFT".to_string()])
        );
        assert_eq!(config.max_opportunities, 10);
        assert_eq!(config.min_total_score, 70.0);
    }

    #[test]
    fn unknown_arg_rejected() {
        let args = vec!["--frobnicate".to_string()];
        assert!(base_config().apply_args(&args).is_err());
    }

    #[test]
    fn missing_providers_rejected() {
        let mut config = base_config();
        config.eodhd_api_token = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn ai_enabled_tracks_key_presence() {
        let mut config = base_config();
        assert!(!config.ai_enabled());
        config.claude_api_key = Some("key".to_string());
        assert!(config.ai_enabled());
    }
}
