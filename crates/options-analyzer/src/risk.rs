//! Position-level risk arithmetic. Pure and deterministic; all monetary
//! values stay in exact decimals.

use rust_decimal::Decimal;
use scanner_core::{OptionContract, RiskMetrics};

/// Cash outlay to open the diagonal: buy the LEAPS at the ask, sell the
/// short call at the bid.
pub fn net_debit(long: &OptionContract, short: &OptionContract) -> Option<Decimal> {
    match (long.ask, short.bid) {
        (Some(long_ask), Some(short_bid)) => Some(long_ask - short_bid),
        _ => None,
    }
}

/// Full risk block for a PMCC pair, or None when either leg is missing the
/// quotes needed to price the position or the debit is non-positive.
pub fn position_risk(long: &OptionContract, short: &OptionContract) -> Option<RiskMetrics> {
    let net_debit = net_debit(long, short)?;
    if net_debit <= Decimal::ZERO {
        return None;
    }

    let max_loss = net_debit;
    // Max profit: short assigned at its strike, LEAPS sold for intrinsic.
    let max_profit = (short.strike - long.strike) - net_debit;
    let breakeven = long.strike + net_debit;
    let risk_reward = max_profit / max_loss;

    let diff = |l: Option<Decimal>, s: Option<Decimal>| match (l, s) {
        (Some(l), Some(s)) => Some(l - s),
        _ => None,
    };

    Some(RiskMetrics {
        max_loss,
        max_profit,
        breakeven,
        risk_reward,
        net_delta: diff(long.delta, short.delta),
        net_gamma: diff(long.gamma, short.gamma),
        net_theta: diff(long.theta, short.theta),
        net_vega: diff(long.vega, short.vega),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use scanner_core::OptionSide;

    fn leg(strike: Decimal, dte: i64, bid: Decimal, ask: Decimal, delta: Decimal) -> OptionContract {
        OptionContract {
            option_symbol: format!("AAPL-{strike}-{dte}"),
            underlying: "AAPL".to_string(),
            strike,
            expiration: Utc::now() + chrono::Duration::days(dte),
            side: OptionSide::Call,
            bid: Some(bid),
            ask: Some(ask),
            mid: Some((bid + ask) / dec!(2)),
            last: None,
            bid_size: None,
            ask_size: None,
            volume: Some(50),
            open_interest: Some(200),
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
    fn risk_block_arithmetic() {
        let long = leg(dec!(130), 400, dec!(28.00), dec!(28.50), dec!(0.82));
        let short = leg(dec!(160), 35, dec!(2.50), dec!(2.60), dec!(0.30));

        let risk = position_risk(&long, &short).unwrap();
        assert_eq!(risk.max_loss, dec!(26.00));
        assert_eq!(risk.max_profit, dec!(30) - dec!(26.00));
        assert_eq!(risk.breakeven, dec!(130) + dec!(26.00));
        assert_eq!(risk.risk_reward, dec!(4.00) / dec!(26.00));
        assert_eq!(risk.net_delta, Some(dec!(0.52)));
    }

    #[test]
    fn negative_debit_rejected() {
        // Short bid above the LEAPS ask would be a credit, not a PMCC debit.
        let long = leg(dec!(130), 400, dec!(1.00), dec!(1.50), dec!(0.82));
        let short = leg(dec!(160), 35, dec!(2.50), dec!(2.60), dec!(0.30));
        assert!(position_risk(&long, &short).is_none());
    }

    #[test]
    fn missing_quotes_rejected() {
        let mut long = leg(dec!(130), 400, dec!(28.00), dec!(28.50), dec!(0.82));
        long.ask = None;
        let short = leg(dec!(160), 35, dec!(2.50), dec!(2.60), dec!(0.30));
        assert!(position_risk(&long, &short).is_none());
    }

    #[test]
    fn net_greeks_require_both_legs() {
        let long = leg(dec!(130), 400, dec!(28.00), dec!(28.50), dec!(0.82));
        let mut short = leg(dec!(160), 35, dec!(2.50), dec!(2.60), dec!(0.30));
        short.vega = None;
        let risk = position_risk(&long, &short).unwrap();
        assert!(risk.net_vega.is_none());
        assert!(risk.net_delta.is_some());
    }
}
