//! Stock screening against the EODHD screener API.
//!
//! The upstream caps any single query at 1000 rows and its offset at 999, so
//! one query can never see the whole universe. The requested market-cap
//! window is split into bands, each band is paged per exchange, and the
//! results are concatenated, deduplicated by symbol and sorted by market cap.

use rust_decimal::prelude::*;
use scanner_core::{ApiResponse, ProviderError, ScreenerResult, ScreeningCriteria};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;

use crate::EodhdClient;

/// Band edges in descending order. This list is data, not logic: adjust the
/// cuts to the observed density of the universe.
const MARKET_CAP_BAND_EDGES: &[i64] = &[
    5_000_000_000,
    4_000_000_000,
    3_000_000_000,
    2_000_000_000,
    1_000_000_000,
    500_000_000,
    250_000_000,
    100_000_000,
];

const PAGE_SIZE: usize = 100;
/// The upstream rejects offsets above 999.
const MAX_OFFSET: usize = 999;

const DEFAULT_MIN_CAP: i64 = 50_000_000;
const DEFAULT_MAX_CAP: i64 = 5_000_000_000;

/// Split [min_cap, max_cap] into descending bands along the fixed edges.
pub(crate) fn market_cap_bands(min_cap: i64, max_cap: i64) -> Vec<(i64, i64)> {
    let mut bands = Vec::new();
    let mut upper = max_cap;

    for &edge in MARKET_CAP_BAND_EDGES {
        if edge >= upper {
            continue;
        }
        if edge <= min_cap {
            break;
        }
        bands.push((edge, upper));
        upper = edge;
    }
    if min_cap < upper {
        bands.push((min_cap, upper));
    }
    bands
}

#[derive(Debug, Deserialize)]
struct ScreenerPage {
    #[serde(default)]
    data: Vec<ScreenerRow>,
}

#[derive(Debug, Deserialize)]
struct ScreenerRow {
    code: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    exchange: Option<String>,
    #[serde(default)]
    market_capitalization: Option<f64>,
    #[serde(default)]
    adjusted_close: Option<f64>,
    #[serde(default)]
    avgvol_200d: Option<f64>,
    #[serde(default, rename = "type")]
    security_type: Option<String>,
}

pub(crate) fn parse_screener_page(body: &str) -> Result<Vec<ScreenerResult>, ProviderError> {
    let page: ScreenerPage =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    Ok(page
        .data
        .into_iter()
        .map(|row| ScreenerResult {
            symbol: row.code,
            name: row.name,
            exchange: row.exchange,
            market_cap: row.market_capitalization.and_then(Decimal::from_f64),
            price: row.adjusted_close.and_then(Decimal::from_f64),
            volume: row.avgvol_200d.map(|v| v as i64),
            security_type: row.security_type,
        })
        .collect())
}

/// Concatenated band results carry duplicates at the band boundaries; keep
/// the first sighting of each symbol, sort by market cap descending and trim.
pub(crate) fn dedup_and_sort(
    results: Vec<ScreenerResult>,
    limit: Option<usize>,
) -> Vec<ScreenerResult> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut unique: Vec<ScreenerResult> = results
        .into_iter()
        .filter(|r| seen.insert(r.symbol.clone()))
        .collect();

    unique.sort_by(|a, b| b.market_cap.cmp(&a.market_cap));
    if let Some(limit) = limit {
        unique.truncate(limit);
    }
    unique
}

fn band_filters(
    criteria: &ScreeningCriteria,
    band_min: i64,
    band_max: i64,
    exchange: &str,
) -> String {
    let mut filters = vec![
        json!(["market_capitalization", ">=", band_min]),
        json!(["market_capitalization", "<=", band_max]),
        json!(["exchange", "=", exchange]),
    ];
    if let Some(volume) = criteria.min_volume {
        filters.push(json!(["avgvol_200d", ">=", volume]));
    }
    if let Some(price) = criteria.min_price.and_then(|p| p.to_f64()) {
        filters.push(json!(["adjusted_close", ">=", price]));
    }
    if let Some(price) = criteria.max_price.and_then(|p| p.to_f64()) {
        filters.push(json!(["adjusted_close", "<=", price]));
    }
    serde_json::Value::Array(filters).to_string()
}

pub(crate) async fn screen_stocks(
    client: &EodhdClient,
    criteria: &ScreeningCriteria,
) -> ApiResponse<Vec<ScreenerResult>> {
    let exchanges: Vec<String> = if criteria.exchanges.is_empty() {
        vec!["NYSE".to_string(), "NASDAQ".to_string()]
    } else {
        criteria.exchanges.clone()
    };

    let min_cap = criteria
        .min_market_cap
        .and_then(|c| c.to_i64())
        .unwrap_or(DEFAULT_MIN_CAP);
    let max_cap = criteria
        .max_market_cap
        .and_then(|c| c.to_i64())
        .unwrap_or(DEFAULT_MAX_CAP);

    let bands = market_cap_bands(min_cap, max_cap);
    tracing::info!(
        bands = bands.len(),
        exchanges = exchanges.len(),
        "screening in market-cap bands to bypass the per-query result cap"
    );

    let mut all_results: Vec<ScreenerResult> = Vec::new();
    let mut failed_bands = 0usize;

    for &(band_min, band_max) in &bands {
        for exchange in &exchanges {
            let filters = band_filters(criteria, band_min, band_max, exchange);
            let mut offset = 0usize;

            loop {
                let url = client.url("/screener");
                let request = client.http().get(&url).query(&[
                    ("sort", "market_capitalization.desc".to_string()),
                    ("filters", filters.clone()),
                    ("limit", PAGE_SIZE.to_string()),
                    ("offset", offset.to_string()),
                ]);

                let body = match client.send_request(request).await {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::warn!(
                            exchange,
                            band_min,
                            band_max,
                            error = %e,
                            "screener band failed, continuing with remaining bands"
                        );
                        failed_bands += 1;
                        break;
                    }
                };

                let page = match parse_screener_page(&body) {
                    Ok(page) => page,
                    Err(e) => {
                        tracing::warn!(exchange, band_min, band_max, error = %e, "screener page unparseable");
                        failed_bands += 1;
                        break;
                    }
                };

                let fetched = page.len();
                if fetched == 0 {
                    break;
                }
                all_results.extend(page);

                if fetched < PAGE_SIZE {
                    break;
                }
                offset += fetched;
                if offset > MAX_OFFSET {
                    break;
                }
            }
        }
    }

    if all_results.is_empty() {
        return if failed_bands == bands.len() * exchanges.len() && failed_bands > 0 {
            ApiResponse::err(ProviderError::Transient(
                "every screener band request failed".to_string(),
            ))
        } else {
            ApiResponse::no_data()
        };
    }

    let results = dedup_and_sort(all_results, criteria.limit);
    tracing::info!(total = results.len(), "screening complete");
    ApiResponse::ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn bands_cover_the_full_window_without_overlap() {
        let bands = market_cap_bands(50_000_000, 5_000_000_000);
        assert_eq!(bands.len(), 8);
        assert_eq!(bands.first(), Some(&(4_000_000_000, 5_000_000_000)));
        assert_eq!(bands.last(), Some(&(50_000_000, 100_000_000)));

        // Adjacent bands meet exactly at the edges.
        for pair in bands.windows(2) {
            assert_eq!(pair[0].0, pair[1].1);
        }
    }

    #[test]
    fn narrow_window_is_a_single_band() {
        let bands = market_cap_bands(1_200_000_000, 1_800_000_000);
        assert_eq!(bands, vec![(1_200_000_000, 1_800_000_000)]);
    }

    #[test]
    fn window_straddling_one_edge_splits_once() {
        let bands = market_cap_bands(800_000_000, 1_500_000_000);
        assert_eq!(
            bands,
            vec![
                (1_000_000_000, 1_500_000_000),
                (800_000_000, 1_000_000_000)
            ]
        );
    }

    #[test]
    fn parses_screener_rows() {
        let body = r#"{"data": [
            {"code": "ACME", "name": "Acme Corp", "exchange": "NYSE",
             "market_capitalization": 2500000000.0, "adjusted_close": 42.5,
             "avgvol_200d": 1500000.0, "type": "common stock"},
            {"code": "BETA", "market_capitalization": 900000000.0}
        ]}"#;
        let rows = parse_screener_page(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].symbol, "ACME");
        assert_eq!(rows[0].market_cap, Some(dec!(2500000000.0)));
        assert_eq!(rows[1].name, None);
    }

    #[test]
    fn dedup_keeps_one_row_per_symbol() {
        let row = |symbol: &str, cap: i64| ScreenerResult {
            symbol: symbol.to_string(),
            name: None,
            exchange: None,
            market_cap: Some(Decimal::from(cap)),
            price: None,
            volume: None,
            security_type: None,
        };
        // ACME shows up in two adjacent bands; the union must not.
        let merged = dedup_and_sort(
            vec![
                row("ACME", 1_000_000_000),
                row("BETA", 3_000_000_000),
                row("ACME", 1_000_000_000),
                row("GAMA", 200_000_000),
            ],
            None,
        );

        let symbols: Vec<&str> = merged.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BETA", "ACME", "GAMA"]);
    }

    #[test]
    fn limit_applied_after_sort() {
        let row = |symbol: &str, cap: i64| ScreenerResult {
            symbol: symbol.to_string(),
            name: None,
            exchange: None,
            market_cap: Some(Decimal::from(cap)),
            price: None,
            volume: None,
            security_type: None,
        };
        let merged = dedup_and_sort(
            vec![row("SMALL", 100), row("BIG", 10_000), row("MID", 1_000)],
            Some(2),
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].symbol, "BIG");
    }
}
