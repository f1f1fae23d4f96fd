//! AI augmentation stage: per-candidate enhanced data fetch, analysis
//! request and score merge.

use chrono::Utc;
use provider_router::ProviderRouter;
use scanner_core::{AiInsights, MarketContext, PmccCandidate};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Weights for blending the quantitative and AI scores.
const QUANT_WEIGHT: f64 = 0.6;
const AI_WEIGHT: f64 = 0.4;

#[derive(Debug, Default)]
pub struct AiStageReport {
    pub analyzed: usize,
    pub skipped: usize,
    pub warnings: Vec<String>,
}

/// Merge an analysis result into a candidate, blending the scores.
pub fn merge_ai(candidate: &mut PmccCandidate, insights: AiInsights) {
    candidate.claude_score = Some(insights.pmcc_score);
    candidate.combined_score =
        Some(QUANT_WEIGHT * candidate.total_score + AI_WEIGHT * insights.pmcc_score);
    candidate.claude_reasoning = insights.management_strategy.clone();
    candidate.ai_recommendation = Some(insights.recommendation.as_str().to_string());
    candidate.claude_confidence = insights.confidence_level;
    candidate.ai_analysis_timestamp = Some(Utc::now());
    candidate.ai_insights = Some(insights);
}

/// Runs the AI stage over the top candidates with a small concurrency cap.
pub struct AiAugmentor {
    router: Arc<ProviderRouter>,
    min_completeness: f64,
    pool_size: usize,
}

impl AiAugmentor {
    pub fn new(router: Arc<ProviderRouter>, min_completeness: f64, pool_size: usize) -> Self {
        Self {
            router,
            min_completeness,
            pool_size: pool_size.max(1),
        }
    }

    /// Augment candidates in place. Failures and skips never remove a
    /// candidate; they only leave its AI fields unset.
    pub async fn augment(
        &self,
        candidates: &mut [PmccCandidate],
        context: &MarketContext,
    ) -> AiStageReport {
        let mut report = AiStageReport::default();
        if candidates.is_empty() {
            return report;
        }

        let semaphore = Arc::new(Semaphore::new(self.pool_size));
        let mut tasks: JoinSet<(usize, Result<AiInsights, String>)> = JoinSet::new();

        for (index, candidate) in candidates.iter().enumerate() {
            let router = Arc::clone(&self.router);
            let semaphore = Arc::clone(&semaphore);
            let candidate = candidate.clone();
            let context = context.clone();
            let min_completeness = self.min_completeness;

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (index, Err("AI pool closed".to_string())),
                };

                let enhanced = match router
                    .get_enhanced_stock_data(&candidate.symbol, None)
                    .await
                    .into_result()
                {
                    Ok(Some(enhanced)) => enhanced,
                    Ok(None) => {
                        return (
                            index,
                            Err(format!("{}: no enhanced data available", candidate.symbol)),
                        )
                    }
                    Err(e) => {
                        return (index, Err(format!("{}: enhanced data: {e}", candidate.symbol)))
                    }
                };

                if enhanced.completeness_score < min_completeness {
                    return (
                        index,
                        Err(format!(
                            "{}: completeness {:.0} below threshold {:.0}, AI skipped",
                            candidate.symbol, enhanced.completeness_score, min_completeness
                        )),
                    );
                }

                match router
                    .analyze_pmcc_opportunity(&candidate, &enhanced, &context)
                    .await
                    .into_result()
                {
                    Ok(Some(insights)) => (index, Ok(insights)),
                    Ok(None) => (
                        index,
                        Err(format!("{}: empty analysis response", candidate.symbol)),
                    ),
                    Err(e) => (index, Err(format!("{}: analysis: {e}", candidate.symbol))),
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(insights))) => {
                    merge_ai(&mut candidates[index], insights);
                    report.analyzed += 1;
                }
                Ok((_, Err(warning))) => {
                    tracing::warn!("{warning}");
                    report.warnings.push(warning);
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::error!("AI task panicked: {e}");
                    report.warnings.push(format!("AI task failure: {e}"));
                    report.skipped += 1;
                }
            }
        }

        tracing::info!(
            analyzed = report.analyzed,
            skipped = report.skipped,
            "AI augmentation stage complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::candidate;
    use scanner_core::Recommendation;

    fn insights(symbol: &str, pmcc_score: f64) -> AiInsights {
        AiInsights {
            symbol: symbol.to_string(),
            pmcc_score,
            execution_risk_score: None,
            financial_stability_score: None,
            calendar_event_score: None,
            technical_setup_score: None,
            recommendation: Recommendation::Buy,
            confidence_level: Some(65.0),
            key_risks: vec![],
            key_opportunities: vec![],
            management_strategy: Some("roll at 21 DTE".to_string()),
            entry_timing: None,
            exit_conditions: vec![],
            position_sizing: None,
        }
    }

    #[test]
    fn merge_blends_scores() {
        let mut c = candidate("ACME", 80.0);
        merge_ai(&mut c, insights("ACME", 50.0));
        assert_eq!(c.claude_score, Some(50.0));
        assert!((c.combined_score.unwrap() - 68.0).abs() < 1e-9);
        assert_eq!(c.ai_recommendation.as_deref(), Some("buy"));
        assert!(c.ai_insights.is_some());
        assert!(c.ai_analysis_timestamp.is_some());
    }

    #[test]
    fn ai_can_flip_the_ranking() {
        // Quant order: first over second. AI strongly favors the second.
        let mut first = candidate("AAA", 80.0);
        let mut second = candidate("BBB", 70.0);
        merge_ai(&mut first, insights("AAA", 50.0));
        merge_ai(&mut second, insights("BBB", 95.0));

        assert!(second.ranking_score() > first.ranking_score());
    }

    #[test]
    fn ranking_score_falls_back_to_total() {
        let c = candidate("ACME", 73.0);
        assert_eq!(c.ranking_score(), 73.0);
    }
}
