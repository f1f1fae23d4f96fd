//! Shared fixtures for the crate's tests.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use scanner_core::{OptionContract, OptionSide, PmccCandidate, RiskMetrics};

pub(crate) fn leg(strike: Decimal, dte: i64, delta: Decimal) -> OptionContract {
    OptionContract {
        option_symbol: format!("TEST-{strike}-{dte}"),
        underlying: "TEST".to_string(),
        strike,
        expiration: Utc::now() + chrono::Duration::days(dte),
        side: OptionSide::Call,
        bid: Some(dec!(2.50)),
        ask: Some(dec!(2.60)),
        mid: Some(dec!(2.55)),
        last: None,
        bid_size: None,
        ask_size: None,
        volume: Some(100),
        open_interest: Some(500),
        delta: Some(delta),
        gamma: Some(dec!(0.01)),
        theta: Some(dec!(-0.02)),
        vega: Some(dec!(0.10)),
        iv: Some(dec!(0.30)),
        dte,
        underlying_price: Some(dec!(155)),
        updated: Some(Utc::now()),
    }
}

pub(crate) fn candidate(symbol: &str, total_score: f64) -> PmccCandidate {
    PmccCandidate {
        symbol: symbol.to_string(),
        underlying_price: dec!(155),
        long_call: leg(dec!(150), 400, dec!(0.80)),
        short_call: leg(dec!(160), 35, dec!(0.30)),
        net_debit: dec!(4.50),
        risk_metrics: RiskMetrics {
            max_loss: dec!(4.50),
            max_profit: dec!(5.50),
            breakeven: dec!(154.50),
            risk_reward: dec!(1.22),
            net_delta: Some(dec!(0.50)),
            net_gamma: None,
            net_theta: None,
            net_vega: None,
        },
        liquidity_score: 70.0,
        volatility_score: None,
        technical_score: None,
        fundamental_score: None,
        probability_score: 60.0,
        total_score,
        rank: None,
        ai_insights: None,
        claude_score: None,
        combined_score: None,
        claude_reasoning: None,
        ai_recommendation: None,
        claude_confidence: None,
        ai_analysis_timestamp: None,
        discovered_at: Utc::now(),
    }
}
