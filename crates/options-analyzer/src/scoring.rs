//! Sub-score computation, each on a 0-100 scale. Scores are f64; only the
//! price arithmetic feeding them is decimal.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use scanner_core::{OptionContract, RiskMetrics};

use crate::criteria::{ScoreWeights, ShortCallCriteria};

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

/// Spread component: each 1% of bid-ask spread costs ~10 points.
fn spread_score(contract: &OptionContract) -> Option<f64> {
    let pct = contract.spread_percentage()?.to_f64()?;
    Some(clamp_score(100.0 - pct * 10.0))
}

/// Log-scaled activity component over combined volume and open interest.
fn activity_score(long: &OptionContract, short: &OptionContract) -> f64 {
    let total_volume = long.volume.unwrap_or(0) + short.volume.unwrap_or(0);
    let mut score = clamp_score((total_volume.max(1) as f64).log10() * 25.0);

    let total_oi = long.open_interest.unwrap_or(0) + short.open_interest.unwrap_or(0);
    if total_oi > 0 {
        let oi_score = clamp_score((total_oi as f64).log10() * 25.0);
        score = (score + oi_score) / 2.0;
    }
    score
}

/// Liquidity: 40% LEAPS spread, 30% short spread, 30% volume/OI activity.
pub fn liquidity_score(long: &OptionContract, short: &OptionContract) -> f64 {
    let mut score = 0.0;
    if let Some(s) = spread_score(long) {
        score += s * 0.4;
    }
    if let Some(s) = spread_score(short) {
        score += s * 0.3;
    }
    score += activity_score(long, short) * 0.3;
    clamp_score(score)
}

/// Qualitative probability proxy: breakeven close to the current price, a
/// short call in the middle of its DTE window, and a LEAPS delta near 0.80
/// each pull the score up.
pub fn probability_score(
    risk: &RiskMetrics,
    underlying_price: Decimal,
    long: &OptionContract,
    short: &OptionContract,
    short_criteria: &ShortCallCriteria,
) -> f64 {
    // Distance from breakeven, as a percent of the underlying price. A
    // breakeven already below spot scores full marks.
    let breakeven_component = if underlying_price > Decimal::ZERO {
        let distance_pct = ((risk.breakeven - underlying_price) / underlying_price
            * Decimal::ONE_HUNDRED)
            .to_f64()
            .unwrap_or(100.0);
        if distance_pct <= 0.0 {
            100.0
        } else {
            clamp_score(100.0 - distance_pct * 10.0)
        }
    } else {
        0.0
    };

    // Short DTE near the middle of the allowed window.
    let window_mid = (short_criteria.min_dte + short_criteria.max_dte) as f64 / 2.0;
    let half_width = ((short_criteria.max_dte - short_criteria.min_dte) as f64 / 2.0).max(1.0);
    let dte_component = clamp_score(100.0 * (1.0 - (short.dte as f64 - window_mid).abs() / half_width));

    // LEAPS delta near 0.80.
    let delta_component = match long.delta.and_then(|d| d.to_f64()) {
        Some(delta) => clamp_score(100.0 - (delta - 0.80).abs() * 500.0),
        None => 0.0,
    };

    clamp_score((breakeven_component + dte_component + delta_component) / 3.0)
}

/// Informational volatility sub-score from the legs' implied volatility.
/// Richer IV means richer short-call premium; saturates around 50% IV.
pub fn volatility_score(long: &OptionContract, short: &OptionContract) -> Option<f64> {
    let long_iv = long.iv?.to_f64()?;
    let short_iv = short.iv?.to_f64()?;
    let avg_iv = (long_iv + short_iv) / 2.0;
    Some(clamp_score(avg_iv * 200.0))
}

/// Return on the capital at risk, saturating at 100% ROI.
pub fn roi_score(risk: &RiskMetrics) -> f64 {
    if risk.max_loss <= Decimal::ZERO {
        return 0.0;
    }
    let roi_pct = (risk.max_profit / risk.max_loss * Decimal::ONE_HUNDRED)
        .to_f64()
        .unwrap_or(0.0);
    clamp_score(roi_pct)
}

/// Risk/reward, saturating at 2:1.
pub fn risk_reward_score(risk: &RiskMetrics) -> f64 {
    let rr = risk.risk_reward.to_f64().unwrap_or(0.0);
    clamp_score(rr * 50.0)
}

pub fn total_score(
    weights: &ScoreWeights,
    roi: f64,
    risk_reward: f64,
    probability: f64,
    liquidity: f64,
) -> f64 {
    clamp_score(
        roi * weights.roi
            + risk_reward * weights.risk_reward
            + probability * weights.probability
            + liquidity * weights.liquidity,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use scanner_core::OptionSide;

    fn leg(
        strike: Decimal,
        dte: i64,
        bid: Decimal,
        ask: Decimal,
        delta: Decimal,
        volume: i64,
        oi: i64,
    ) -> OptionContract {
        OptionContract {
            option_symbol: format!("X-{strike}-{dte}"),
            underlying: "X".to_string(),
            strike,
            expiration: Utc::now() + chrono::Duration::days(dte),
            side: OptionSide::Call,
            bid: Some(bid),
            ask: Some(ask),
            mid: Some((bid + ask) / dec!(2)),
            last: None,
            bid_size: None,
            ask_size: None,
            volume: Some(volume),
            open_interest: Some(oi),
            delta: Some(delta),
            gamma: Some(dec!(0.01)),
            theta: Some(dec!(-0.03)),
            vega: Some(dec!(0.12)),
            iv: Some(dec!(0.30)),
            dte,
            underlying_price: Some(dec!(155)),
            updated: Some(Utc::now()),
        }
    }

    #[test]
    fn tight_spread_scores_higher() {
        let tight = leg(dec!(130), 400, dec!(10.00), dec!(10.10), dec!(0.80), 100, 1000);
        let wide = leg(dec!(130), 400, dec!(10.00), dec!(12.00), dec!(0.80), 100, 1000);
        let short = leg(dec!(160), 35, dec!(2.50), dec!(2.60), dec!(0.30), 50, 500);

        assert!(liquidity_score(&tight, &short) > liquidity_score(&wide, &short));
    }

    #[test]
    fn liquidity_bounded() {
        let long = leg(dec!(130), 400, dec!(10.00), dec!(10.02), dec!(0.80), 1_000_000, 1_000_000);
        let short = leg(dec!(160), 35, dec!(2.50), dec!(2.51), dec!(0.30), 1_000_000, 1_000_000);
        let score = liquidity_score(&long, &short);
        assert!(score > 90.0 && score <= 100.0);
    }

    #[test]
    fn probability_prefers_centered_short_dte() {
        let long = leg(dec!(130), 400, dec!(27.00), dec!(27.20), dec!(0.80), 100, 1000);
        let centered = leg(dec!(160), 33, dec!(2.50), dec!(2.60), dec!(0.30), 50, 500);
        let edge = leg(dec!(160), 45, dec!(2.50), dec!(2.60), dec!(0.30), 50, 500);

        let risk = crate::risk::position_risk(&long, &centered).unwrap();
        let criteria = ShortCallCriteria::default();
        let score_centered = probability_score(&risk, dec!(155), &long, &centered, &criteria);
        let score_edge = probability_score(&risk, dec!(155), &long, &edge, &criteria);
        assert!(score_centered > score_edge);
    }

    #[test]
    fn volatility_score_tracks_iv() {
        let calm_long = leg(dec!(130), 400, dec!(10.00), dec!(10.10), dec!(0.80), 100, 1000);
        let mut calm_short = leg(dec!(160), 35, dec!(2.50), dec!(2.60), dec!(0.30), 50, 500);
        calm_short.iv = Some(dec!(0.20));

        let mut hot_short = calm_short.clone();
        hot_short.iv = Some(dec!(0.60));

        let calm = volatility_score(&calm_long, &calm_short).unwrap();
        let hot = volatility_score(&calm_long, &hot_short).unwrap();
        assert!(hot > calm);

        let mut missing = calm_short.clone();
        missing.iv = None;
        assert!(volatility_score(&calm_long, &missing).is_none());
    }

    #[test]
    fn roi_saturates() {
        let risk = RiskMetrics {
            max_loss: dec!(4.50),
            max_profit: dec!(9.00),
            breakeven: dec!(134.50),
            risk_reward: dec!(2.0),
            net_delta: None,
            net_gamma: None,
            net_theta: None,
            net_vega: None,
        };
        assert_eq!(roi_score(&risk), 100.0);
        assert_eq!(risk_reward_score(&risk), 100.0);
    }

    #[test]
    fn equal_weights_average_the_factors() {
        let weights = ScoreWeights::default();
        let total = total_score(&weights, 80.0, 60.0, 40.0, 20.0);
        assert!((total - 50.0).abs() < 1e-9);
    }
}
