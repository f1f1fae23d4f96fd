use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Selection window for the long LEAPS leg. Deep ITM, long-dated, liquid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeapsCriteria {
    pub min_dte: i64,
    pub max_dte: i64,
    pub min_delta: Decimal,
    pub max_delta: Decimal,
    /// Maximum bid-ask spread as a percentage of mid.
    pub max_spread_pct: Decimal,
    pub min_open_interest: i64,
}

impl Default for LeapsCriteria {
    fn default() -> Self {
        Self {
            min_dte: 270,
            max_dte: 730,
            min_delta: dec!(0.75),
            max_delta: dec!(0.90),
            max_spread_pct: dec!(5),
            min_open_interest: 10,
        }
    }
}

/// Selection window for the short near-term leg. OTM, rich premium.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortCallCriteria {
    pub min_dte: i64,
    pub max_dte: i64,
    pub min_delta: Decimal,
    pub max_delta: Decimal,
    pub max_spread_pct: Decimal,
    pub min_open_interest: i64,
}

impl Default for ShortCallCriteria {
    fn default() -> Self {
        Self {
            min_dte: 21,
            max_dte: 45,
            min_delta: dec!(0.20),
            max_delta: dec!(0.35),
            max_spread_pct: dec!(10),
            min_open_interest: 5,
        }
    }
}

/// Weights for the total score. The four factors carry equal weight by
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub roi: f64,
    pub risk_reward: f64,
    pub probability: f64,
    pub liquidity: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            roi: 0.25,
            risk_reward: 0.25,
            probability: 0.25,
            liquidity: 0.25,
        }
    }
}

/// Full analyzer configuration, versioned with the scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub leaps: LeapsCriteria,
    pub short_call: ShortCallCriteria,
    pub min_risk_reward: Decimal,
    /// Cap on each leg's candidate list before the cross-product pairing.
    pub max_pairs_per_leg: usize,
    /// Best pairs kept per symbol after bucket deduplication.
    pub top_k_per_symbol: usize,
    pub weights: ScoreWeights,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            leaps: LeapsCriteria::default(),
            short_call: ShortCallCriteria::default(),
            min_risk_reward: dec!(0.10),
            max_pairs_per_leg: 20,
            top_k_per_symbol: 3,
            weights: ScoreWeights::default(),
        }
    }
}
