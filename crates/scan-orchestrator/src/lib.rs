//! Scan orchestration: universe screening, per-symbol fan-out, AI
//! augmentation and result export.

pub mod ai;
pub mod export;
pub mod scanner;
pub mod screener;

#[cfg(test)]
pub(crate) mod test_support;

pub use ai::AiAugmentor;
pub use export::ResultExporter;
pub use scanner::{PmccScanner, ScanConfig, ScanError, ScanResults};
pub use screener::StockScreener;
