//! Reduction of EODHD's raw fundamentals payload into the fixed
//! `FundamentalMetrics` schema. The raw JSON never leaves this crate;
//! quarterly statements collapse to the most recent quarter plus derived
//! margins and leverage ratios.

use chrono::NaiveDate;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use scanner_core::{FundamentalMetrics, FundamentalRiskMetrics};
use serde_json::Value;

fn at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

fn f64_at(value: &Value, path: &[&str]) -> Option<f64> {
    let v = at(value, path)?;
    // Numbers occasionally arrive as quoted strings.
    v.as_f64().or_else(|| v.as_str()?.parse().ok())
}

fn dec_at(value: &Value, path: &[&str]) -> Option<Decimal> {
    f64_at(value, path).and_then(Decimal::from_f64)
}

fn str_at(value: &Value, path: &[&str]) -> Option<String> {
    at(value, path)?.as_str().map(str::to_string)
}

fn i32_at(value: &Value, path: &[&str]) -> Option<i32> {
    at(value, path)?.as_i64().map(|v| v as i32)
}

/// Pick the most recent quarter from a `quarterly` map keyed by ISO date.
fn most_recent_quarter<'a>(raw: &'a Value, statement: &str) -> Option<(&'a str, &'a Value)> {
    let quarterly = at(raw, &["Financials", statement, "quarterly"])?.as_object()?;
    quarterly
        .iter()
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(date, value)| (date.as_str(), value))
}

pub(crate) fn reduce_fundamentals(symbol: &str, raw: &Value) -> Option<FundamentalMetrics> {
    if !raw.is_object() || raw.as_object().map(|o| o.is_empty()).unwrap_or(true) {
        return None;
    }

    let balance = most_recent_quarter(raw, "Balance_Sheet");
    let cash_flow = most_recent_quarter(raw, "Cash_Flow");
    let income = most_recent_quarter(raw, "Income_Statement");

    let total_equity = balance.and_then(|(_, q)| dec_at(q, &["totalStockholderEquity"]));
    let total_debt = balance.and_then(|(_, q)| dec_at(q, &["shortLongTermDebtTotal"]));
    let current_assets = balance.and_then(|(_, q)| dec_at(q, &["totalCurrentAssets"]));
    let current_liabilities = balance.and_then(|(_, q)| dec_at(q, &["totalCurrentLiabilities"]));

    let debt_to_equity = match (total_debt, total_equity) {
        (Some(debt), Some(equity)) if equity > Decimal::ZERO => {
            (debt / equity).to_f64()
        }
        _ => None,
    };
    let current_ratio = match (current_assets, current_liabilities) {
        (Some(assets), Some(liabilities)) if liabilities > Decimal::ZERO => {
            (assets / liabilities).to_f64()
        }
        _ => None,
    };

    let operating_cash_flow =
        cash_flow.and_then(|(_, q)| dec_at(q, &["totalCashFromOperatingActivities"]));
    let capex = cash_flow.and_then(|(_, q)| dec_at(q, &["capitalExpenditures"]));
    let free_cash_flow = match (operating_cash_flow, capex) {
        (Some(ocf), Some(capex)) => Some(ocf - capex),
        (Some(ocf), None) => Some(ocf),
        _ => None,
    };

    let revenue_ttm = dec_at(raw, &["Highlights", "RevenueTTM"]);
    let gross_margin = match (f64_at(raw, &["Highlights", "GrossProfitTTM"]), revenue_ttm) {
        (Some(gross), Some(revenue)) if revenue > Decimal::ZERO => {
            revenue.to_f64().map(|r| gross / r)
        }
        _ => None,
    };

    let rating_counts: Option<i32> = {
        let counts = ["StrongBuy", "Buy", "Hold", "Sell", "StrongSell"]
            .iter()
            .filter_map(|k| i32_at(raw, &["AnalystRatings", k]))
            .collect::<Vec<_>>();
        if counts.is_empty() {
            None
        } else {
            Some(counts.iter().sum())
        }
    };

    Some(FundamentalMetrics {
        symbol: symbol.to_string(),
        company_name: str_at(raw, &["General", "Name"]),
        sector: str_at(raw, &["General", "Sector"]),
        industry: str_at(raw, &["General", "Industry"]),
        market_cap: dec_at(raw, &["Highlights", "MarketCapitalization"]),
        revenue_ttm,
        net_income_ttm: dec_at(raw, &["Highlights", "NetIncomeTTM"]),
        gross_margin,
        operating_margin: f64_at(raw, &["Highlights", "OperatingMarginTTM"]),
        profit_margin: f64_at(raw, &["Highlights", "ProfitMargin"]),
        return_on_equity: f64_at(raw, &["Highlights", "ReturnOnEquityTTM"]),
        return_on_assets: f64_at(raw, &["Highlights", "ReturnOnAssetsTTM"]),
        pe_ratio: f64_at(raw, &["Highlights", "PERatio"]),
        peg_ratio: f64_at(raw, &["Highlights", "PEGRatio"]),
        price_to_book: f64_at(raw, &["Valuation", "PriceBookMRQ"]),
        eps: dec_at(raw, &["Highlights", "EarningsShare"]),
        dividend_yield: f64_at(raw, &["Highlights", "DividendYield"]),
        dividend_per_share: dec_at(raw, &["Highlights", "DividendShare"]),
        ex_dividend_date: str_at(raw, &["SplitsDividends", "ExDividendDate"])
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        analyst_rating: f64_at(raw, &["AnalystRatings", "Rating"]).map(|r| format!("{r:.1}")),
        analyst_target_price: dec_at(raw, &["AnalystRatings", "TargetPrice"]),
        analyst_count: rating_counts,
        total_assets: balance.and_then(|(_, q)| dec_at(q, &["totalAssets"])),
        total_liabilities: balance.and_then(|(_, q)| dec_at(q, &["totalLiab"])),
        total_equity,
        cash_and_equivalents: balance.and_then(|(_, q)| dec_at(q, &["cashAndEquivalents"])),
        total_debt,
        debt_to_equity,
        current_ratio,
        operating_cash_flow,
        free_cash_flow,
        quarterly_revenue: income.and_then(|(_, q)| dec_at(q, &["totalRevenue"])),
        quarterly_net_income: income.and_then(|(_, q)| dec_at(q, &["netIncome"])),
        fiscal_period: income
            .or(balance)
            .map(|(date, _)| date.to_string()),
    })
}

pub(crate) fn reduce_risk_metrics(symbol: &str, raw: &Value) -> Option<FundamentalRiskMetrics> {
    if !raw.is_object() || raw.as_object().map(|o| o.is_empty()).unwrap_or(true) {
        return None;
    }

    let fundamentals = reduce_fundamentals(symbol, raw)?;
    Some(FundamentalRiskMetrics {
        symbol: symbol.to_string(),
        volatility: None,
        beta: f64_at(raw, &["Technicals", "Beta"]),
        short_interest: f64_at(raw, &["Technicals", "ShortPercent"]),
        debt_to_equity: fundamentals.debt_to_equity,
        current_ratio: fundamentals.current_ratio,
    })
}

/// 52-week levels out of the Technicals block.
pub(crate) fn week52_levels(raw: &Value) -> (Option<Decimal>, Option<Decimal>) {
    (
        dec_at(raw, &["Technicals", "52WeekHigh"]),
        dec_at(raw, &["Technicals", "52WeekLow"]),
    )
}
