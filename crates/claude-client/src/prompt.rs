//! Analysis prompt assembly.
//!
//! Fields whose values are missing or zero are omitted outright. Rendering
//! them as "N/A" or 0 would steer the analyst toward treating absent data as
//! a bearish signal.

use rust_decimal::Decimal;
use scanner_core::{
    CalendarEventType, EnhancedStockData, MarketContext, OptionContract, PmccCandidate,
};

fn fmt_dec(value: Option<Decimal>) -> Option<String> {
    value
        .filter(|v| !v.is_zero())
        .map(|v| format!("{}", v.round_dp(4).normalize()))
}

fn fmt_money(value: Option<Decimal>) -> Option<String> {
    value
        .filter(|v| !v.is_zero())
        .map(|v| format!("${}", v.round_dp(2).normalize()))
}

fn fmt_f64(value: Option<f64>) -> Option<String> {
    value
        .filter(|v| v.is_finite() && *v != 0.0)
        .map(|v| format!("{v:.2}"))
}

fn fmt_pct(value: Option<f64>) -> Option<String> {
    value
        .filter(|v| v.is_finite() && *v != 0.0)
        .map(|v| format!("{:.1}%", v * 100.0))
}

fn fmt_count(value: Option<i64>) -> Option<String> {
    value.filter(|v| *v != 0).map(|v| v.to_string())
}

fn push_line(out: &mut String, label: &str, value: Option<String>) {
    if let Some(value) = value {
        out.push_str("- ");
        out.push_str(label);
        out.push_str(": ");
        out.push_str(&value);
        out.push('\n');
    }
}

fn leg_section(out: &mut String, title: &str, leg: &OptionContract) {
    out.push_str(&format!("### {title}\n"));
    push_line(out, "Contract", Some(leg.option_symbol.clone()));
    push_line(out, "Strike", fmt_money(Some(leg.strike)));
    push_line(
        out,
        "Expiration",
        Some(format!("{} ({} DTE)", leg.expiration.format("%Y-%m-%d"), leg.dte)),
    );
    push_line(out, "Bid", fmt_money(leg.bid));
    push_line(out, "Ask", fmt_money(leg.ask));
    push_line(out, "Delta", fmt_dec(leg.delta));
    push_line(out, "Gamma", fmt_dec(leg.gamma));
    push_line(out, "Theta", fmt_dec(leg.theta));
    push_line(out, "Vega", fmt_dec(leg.vega));
    push_line(out, "IV", fmt_dec(leg.iv));
    push_line(out, "Volume", fmt_count(leg.volume));
    push_line(out, "Open interest", fmt_count(leg.open_interest));
    out.push('\n');
}

pub(crate) fn build_analysis_prompt(
    candidate: &PmccCandidate,
    enhanced: &EnhancedStockData,
    context: &MarketContext,
) -> String {
    let mut out = String::with_capacity(4096);

    out.push_str(&format!(
        "You are an expert options strategist evaluating a Poor Man's Covered \
         Call (PMCC) opportunity on {}.\n\n## POSITION\n",
        candidate.symbol
    ));
    push_line(
        &mut out,
        "Underlying price",
        fmt_money(Some(candidate.underlying_price)),
    );
    push_line(&mut out, "Net debit", fmt_money(Some(candidate.net_debit)));
    push_line(
        &mut out,
        "Max profit",
        fmt_money(Some(candidate.risk_metrics.max_profit)),
    );
    push_line(
        &mut out,
        "Max loss",
        fmt_money(Some(candidate.risk_metrics.max_loss)),
    );
    push_line(
        &mut out,
        "Breakeven",
        fmt_money(Some(candidate.risk_metrics.breakeven)),
    );
    push_line(
        &mut out,
        "Risk/reward",
        fmt_dec(Some(candidate.risk_metrics.risk_reward)),
    );
    push_line(&mut out, "Net delta", fmt_dec(candidate.risk_metrics.net_delta));
    push_line(&mut out, "Net theta", fmt_dec(candidate.risk_metrics.net_theta));
    push_line(
        &mut out,
        "Quantitative score",
        fmt_f64(Some(candidate.total_score)),
    );
    out.push('\n');

    leg_section(&mut out, "Long LEAPS call", &candidate.long_call);
    leg_section(&mut out, "Short call", &candidate.short_call);

    let quote = &enhanced.quote;
    out.push_str("## MARKET DATA\n");
    push_line(&mut out, "Last", fmt_money(quote.last));
    push_line(&mut out, "Change", fmt_dec(quote.change));
    push_line(&mut out, "Volume", fmt_count(quote.volume));
    push_line(&mut out, "Market cap", fmt_money(quote.market_cap));
    out.push('\n');

    if let Some(f) = &enhanced.fundamentals {
        out.push_str("## FUNDAMENTALS\n");
        push_line(&mut out, "Company", f.company_name.clone());
        push_line(&mut out, "Sector", f.sector.clone());
        push_line(&mut out, "Industry", f.industry.clone());
        push_line(&mut out, "Revenue (TTM)", fmt_money(f.revenue_ttm));
        push_line(&mut out, "Net income (TTM)", fmt_money(f.net_income_ttm));
        push_line(&mut out, "Gross margin", fmt_pct(f.gross_margin));
        push_line(&mut out, "Operating margin", fmt_pct(f.operating_margin));
        push_line(&mut out, "Profit margin", fmt_pct(f.profit_margin));
        push_line(&mut out, "ROE", fmt_pct(f.return_on_equity));
        push_line(&mut out, "P/E", fmt_f64(f.pe_ratio));
        push_line(&mut out, "PEG", fmt_f64(f.peg_ratio));
        push_line(&mut out, "EPS", fmt_money(f.eps));
        push_line(&mut out, "Dividend yield", fmt_pct(f.dividend_yield));
        push_line(
            &mut out,
            "Ex-dividend date",
            f.ex_dividend_date.map(|d| d.to_string()),
        );
        push_line(&mut out, "Debt/equity", fmt_f64(f.debt_to_equity));
        push_line(&mut out, "Current ratio", fmt_f64(f.current_ratio));
        push_line(&mut out, "Free cash flow (MRQ)", fmt_money(f.free_cash_flow));
        push_line(&mut out, "Analyst rating", f.analyst_rating.clone());
        push_line(
            &mut out,
            "Analyst target",
            fmt_money(f.analyst_target_price),
        );
        out.push('\n');
    }

    if let Some(t) = &enhanced.technicals {
        out.push_str("## TECHNICALS\n");
        push_line(&mut out, "RSI(14)", fmt_f64(t.rsi_14));
        push_line(&mut out, "ATR(14)", fmt_f64(t.atr_14));
        push_line(&mut out, "SMA 20", fmt_money(t.sma_20));
        push_line(&mut out, "SMA 50", fmt_money(t.sma_50));
        push_line(&mut out, "SMA 200", fmt_money(t.sma_200));
        push_line(&mut out, "MACD", fmt_f64(t.macd));
        push_line(&mut out, "MACD signal", fmt_f64(t.macd_signal));
        push_line(&mut out, "Bollinger upper", fmt_money(t.bollinger_upper));
        push_line(&mut out, "Bollinger lower", fmt_money(t.bollinger_lower));
        push_line(&mut out, "Beta", fmt_f64(t.beta));
        push_line(&mut out, "52-week high", fmt_money(t.week52_high));
        push_line(&mut out, "52-week low", fmt_money(t.week52_low));
        out.push('\n');
    }

    if !enhanced.calendar_events.is_empty() {
        out.push_str("## UPCOMING EVENTS\n");
        for event in &enhanced.calendar_events {
            let kind = match event.event_type {
                CalendarEventType::Earnings => "Earnings",
                CalendarEventType::Dividend => "Dividend",
            };
            out.push_str(&format!("- {} on {}", kind, event.date));
            if let Some(estimate) = fmt_dec(event.estimate) {
                out.push_str(&format!(" (estimate {estimate})"));
            }
            out.push('\n');
        }
        out.push('\n');
    }

    if !enhanced.news.is_empty() {
        out.push_str("## RECENT NEWS\n");
        for item in enhanced.news.iter().take(10) {
            out.push_str(&format!("- [{}] {}\n", item.date.format("%Y-%m-%d"), item.title));
        }
        out.push('\n');
    }

    if !enhanced.economic_events.is_empty() {
        out.push_str("## MACRO CALENDAR\n");
        for event in enhanced.economic_events.iter().take(10) {
            out.push_str(&format!("- {} on {}\n", event.event_type, event.date));
        }
        out.push('\n');
    }

    if enhanced.historical_prices.len() >= 2 {
        let first = &enhanced.historical_prices[0];
        let last = enhanced.historical_prices.last().unwrap();
        if first.close > Decimal::ZERO {
            let change = ((last.close - first.close) / first.close * Decimal::ONE_HUNDRED)
                .round_dp(1)
                .normalize();
            out.push_str(&format!(
                "## PRICE TREND\n- {} bars from {} to {}: {}%\n\n",
                enhanced.historical_prices.len(),
                first.date,
                last.date,
                change
            ));
        }
    }

    out.push_str("## CONTEXT\n");
    push_line(
        &mut out,
        "Scan date",
        context.scan_date.map(|d| d.to_string()),
    );
    if context.total_candidates > 0 {
        push_line(
            &mut out,
            "Candidates in this scan",
            Some(context.total_candidates.to_string()),
        );
    }
    push_line(&mut out, "Market regime", context.market_regime.clone());
    push_line(
        &mut out,
        "Data completeness",
        Some(format!("{:.0}%", enhanced.completeness_score)),
    );
    out.push('\n');

    out.push_str(&format!(
        r#"## RESPONSE FORMAT

Respond with a JSON object in exactly this structure and nothing else:

{{
"symbol": "{symbol}",
"pmcc_score": 0,
"execution_risk_score": 0,
"financial_stability_score": 0,
"calendar_event_score": 0,
"technical_setup_score": 0,
"recommendation": "buy/hold/avoid",
"confidence_level": 0,
"key_risks": ["risk1", "risk2"],
"key_opportunities": ["opp1", "opp2"],
"management_strategy": "specific position management guidance",
"entry_timing": "Immediate/Wait for condition/Avoid",
"exit_conditions": ["condition1", "condition2"],
"position_sizing": "percent of portfolio with rationale"
}}

Scores are 0-100. Base the analysis strictly on the data above."#,
        symbol = candidate.symbol
    ));

    out
}
