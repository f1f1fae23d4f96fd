//! PMCC options analysis: chain filtering, leg pairing, risk metrics and
//! multi-factor scoring.

pub mod analyzer;
pub mod criteria;
pub mod risk;
pub mod scoring;

pub use analyzer::{AnalysisOutcome, OptionsAnalyzer};
pub use criteria::{AnalyzerConfig, LeapsCriteria, ScoreWeights, ShortCallCriteria};
