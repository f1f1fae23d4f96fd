//! Result export: one JSON and one CSV file per scan, named by the scan id
//! so earlier runs are never overwritten.

use rust_decimal::Decimal;
use scanner_core::OptionContract;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::scanner::ScanResults;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub struct ResultExporter {
    output_dir: PathBuf,
}

impl ResultExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write both export formats; returns (json_path, csv_path).
    pub fn export(&self, results: &ScanResults) -> Result<(PathBuf, PathBuf), ExportError> {
        let json = self.export_json(results)?;
        let csv = self.export_csv(results)?;
        Ok((json, csv))
    }

    /// Full structured dump. Candidate serialization is recursive: both legs
    /// with all Greeks, the risk block, and every AI field (null when absent)
    /// round-trip losslessly.
    pub fn export_json(&self, results: &ScanResults) -> Result<PathBuf, ExportError> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(format!("{}.json", results.scan_id));
        let file = fs::File::create(&path)?;
        serde_json::to_writer_pretty(file, results)?;
        tracing::info!(path = %path.display(), "JSON results exported");
        Ok(path)
    }

    /// Flat tabular dump: scan metadata repeated on every row, one row per
    /// opportunity, or a single metadata-only row when there are none.
    pub fn export_csv(&self, results: &ScanResults) -> Result<PathBuf, ExportError> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(format!("{}.csv", results.scan_id));
        let mut writer = csv::Writer::from_path(&path)?;

        writer.write_record(CSV_COLUMNS)?;

        let metadata = [
            results.scan_id.clone(),
            results.started_at.to_rfc3339(),
            results
                .completed_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            results
                .duration_seconds
                .map(|d| format!("{d:.1}"))
                .unwrap_or_default(),
            results.stocks_screened.to_string(),
            results.stocks_passed_screening.to_string(),
            results.opportunities_found.to_string(),
        ];

        if results.top_opportunities.is_empty() {
            let empty = vec![String::new(); CSV_COLUMNS.len() - metadata.len()];
            writer.write_record(metadata.iter().cloned().chain(empty))?;
        } else {
            for candidate in &results.top_opportunities {
                let row = candidate_columns(candidate);
                writer.write_record(metadata.iter().cloned().chain(row))?;
            }
        }

        writer.flush()?;
        tracing::info!(path = %path.display(), "CSV results exported");
        Ok(path)
    }
}

const CSV_COLUMNS: &[&str] = &[
    // Scan metadata, repeated on every row
    "scan_id",
    "started_at",
    "completed_at",
    "duration_seconds",
    "stocks_screened",
    "stocks_passed_screening",
    "opportunities_found",
    // Candidate
    "rank",
    "symbol",
    "underlying_price",
    "long_option_symbol",
    "long_strike",
    "long_expiration",
    "long_dte",
    "long_delta",
    "long_bid",
    "long_ask",
    "short_option_symbol",
    "short_strike",
    "short_expiration",
    "short_dte",
    "short_delta",
    "short_bid",
    "short_ask",
    "net_debit",
    "max_loss",
    "max_profit",
    "breakeven",
    "risk_reward",
    "net_delta",
    "net_theta",
    "liquidity_score",
    "probability_score",
    "total_score",
    "claude_score",
    "combined_score",
    "ai_recommendation",
];

fn dec_cell(value: Option<Decimal>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn f64_cell(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}")).unwrap_or_default()
}

fn leg_columns(leg: &OptionContract) -> [String; 7] {
    [
        leg.option_symbol.clone(),
        leg.strike.to_string(),
        leg.expiration.format("%Y-%m-%d").to_string(),
        leg.dte.to_string(),
        dec_cell(leg.delta),
        dec_cell(leg.bid),
        dec_cell(leg.ask),
    ]
}

fn candidate_columns(candidate: &scanner_core::PmccCandidate) -> Vec<String> {
    let mut row = vec![
        candidate
            .rank
            .map(|r| r.to_string())
            .unwrap_or_default(),
        candidate.symbol.clone(),
        candidate.underlying_price.to_string(),
    ];
    row.extend(leg_columns(&candidate.long_call));
    row.extend(leg_columns(&candidate.short_call));
    row.extend([
        candidate.net_debit.to_string(),
        candidate.risk_metrics.max_loss.to_string(),
        candidate.risk_metrics.max_profit.to_string(),
        candidate.risk_metrics.breakeven.to_string(),
        candidate.risk_metrics.risk_reward.round_dp(4).to_string(),
        dec_cell(candidate.risk_metrics.net_delta),
        dec_cell(candidate.risk_metrics.net_theta),
        format!("{:.2}", candidate.liquidity_score),
        format!("{:.2}", candidate.probability_score),
        format!("{:.2}", candidate.total_score),
        f64_cell(candidate.claude_score),
        f64_cell(candidate.combined_score),
        candidate.ai_recommendation.clone().unwrap_or_default(),
    ]);
    row
}
