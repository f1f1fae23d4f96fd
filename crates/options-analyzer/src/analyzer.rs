use chrono::Utc;
use rust_decimal::Decimal;
use scanner_core::{OptionChain, OptionContract, OptionSide, PmccCandidate, StockQuote};
use std::collections::HashMap;

use crate::criteria::AnalyzerConfig;
use crate::risk;
use crate::scoring;

/// Candidates found in one chain plus any non-fatal flags raised on the way.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOutcome {
    pub candidates: Vec<PmccCandidate>,
    pub warnings: Vec<String>,
}

/// Filters an options chain into PMCC leg candidates, pairs them, and scores
/// the surviving combinations.
pub struct OptionsAnalyzer {
    config: AnalyzerConfig,
}

impl Default for OptionsAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl OptionsAnalyzer {
    pub fn new() -> Self {
        Self {
            config: AnalyzerConfig::default(),
        }
    }

    pub fn with_config(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze one symbol's chain against the current quote.
    pub fn analyze(&self, chain: &OptionChain, quote: &StockQuote) -> AnalysisOutcome {
        let mut outcome = AnalysisOutcome::default();

        let Some(underlying_price) = quote.last.or(chain.underlying_price) else {
            outcome
                .warnings
                .push(format!("{}: no underlying price, chain skipped", chain.underlying));
            return outcome;
        };

        if quote.is_stale(Utc::now()) {
            outcome
                .warnings
                .push(format!("{}: quote older than 24h", quote.symbol));
        }

        let (mut leaps, mut shorts) = self.partition(chain, underlying_price);
        if leaps.is_empty() || shorts.is_empty() {
            tracing::debug!(
                symbol = %chain.underlying,
                leaps = leaps.len(),
                shorts = shorts.len(),
                "no pairable legs after filtering"
            );
            return outcome;
        }

        // Deepest ITM first for the LEAPS, richest premium first for the
        // shorts, then cap both lists before the cross-product.
        leaps.sort_by(|a, b| b.delta.cmp(&a.delta));
        shorts.sort_by(|a, b| b.bid.cmp(&a.bid));
        leaps.truncate(self.config.max_pairs_per_leg);
        shorts.truncate(self.config.max_pairs_per_leg);

        let mut candidates = Vec::new();
        for long in &leaps {
            for short in &shorts {
                if let Some(candidate) = self.build_candidate(long, short, underlying_price) {
                    candidates.push(candidate);
                }
            }
        }

        outcome.candidates = self.dedup_and_rank(candidates);
        outcome
    }

    /// Split the chain's calls into LEAPS and short-call candidate lists.
    fn partition(
        &self,
        chain: &OptionChain,
        underlying_price: Decimal,
    ) -> (Vec<OptionContract>, Vec<OptionContract>) {
        let mut leaps = Vec::new();
        let mut shorts = Vec::new();

        for contract in chain.calls() {
            if !self.passes_common_gate(contract) {
                continue;
            }

            let c = &self.config.leaps;
            if contract.dte >= c.min_dte
                && contract.dte <= c.max_dte
                && contract.strike < underlying_price
                && delta_in(contract, c.min_delta, c.max_delta)
                && spread_within(contract, c.max_spread_pct)
                && contract.open_interest.unwrap_or(0) >= c.min_open_interest
            {
                leaps.push(contract.clone());
                continue;
            }

            let c = &self.config.short_call;
            if contract.dte >= c.min_dte
                && contract.dte <= c.max_dte
                && contract.strike > underlying_price
                && delta_in(contract, c.min_delta, c.max_delta)
                && spread_within(contract, c.max_spread_pct)
                && contract.open_interest.unwrap_or(0) >= c.min_open_interest
            {
                shorts.push(contract.clone());
            }
        }

        (leaps, shorts)
    }

    /// Edge-case gate applied to every contract before leg classification:
    /// calls only, Greeks present, not crossed, some sign of life.
    fn passes_common_gate(&self, contract: &OptionContract) -> bool {
        if contract.side != OptionSide::Call {
            return false;
        }
        if !contract.has_greeks() {
            return false;
        }
        if contract.is_crossed() {
            return false;
        }
        if contract.bid.is_none() || contract.ask.is_none() {
            return false;
        }
        // Dead contracts with no volume and no open interest are untradeable
        // regardless of the quoted spread.
        if contract.volume.unwrap_or(0) == 0 && contract.open_interest.unwrap_or(0) == 0 {
            return false;
        }
        true
    }

    /// Validity-check one (long, short) pair and score it.
    fn build_candidate(
        &self,
        long: &OptionContract,
        short: &OptionContract,
        underlying_price: Decimal,
    ) -> Option<PmccCandidate> {
        if long.strike >= short.strike || long.dte <= short.dte {
            return None;
        }
        if short.strike <= underlying_price {
            return None;
        }

        let risk = risk::position_risk(long, short)?;
        if risk.max_profit <= Decimal::ZERO {
            return None;
        }
        if risk.risk_reward < self.config.min_risk_reward {
            return None;
        }

        let liquidity = scoring::liquidity_score(long, short);
        let probability =
            scoring::probability_score(&risk, underlying_price, long, short, &self.config.short_call);
        let roi = scoring::roi_score(&risk);
        let risk_reward = scoring::risk_reward_score(&risk);
        let total =
            scoring::total_score(&self.config.weights, roi, risk_reward, probability, liquidity);

        let net_debit = risk.max_loss;
        Some(PmccCandidate {
            symbol: long.underlying.clone(),
            underlying_price,
            long_call: long.clone(),
            short_call: short.clone(),
            net_debit,
            risk_metrics: risk,
            liquidity_score: liquidity,
            volatility_score: scoring::volatility_score(long, short),
            technical_score: None,
            fundamental_score: None,
            probability_score: probability,
            total_score: total,
            rank: None,
            ai_insights: None,
            claude_score: None,
            combined_score: None,
            claude_reasoning: None,
            ai_recommendation: None,
            claude_confidence: None,
            ai_analysis_timestamp: None,
            discovered_at: Utc::now(),
        })
    }

    /// Keep the best-scoring pair per (long expiration, short expiration)
    /// bucket, then the top K overall, ordered by score with liquidity and
    /// risk/reward tiebreaks.
    fn dedup_and_rank(&self, candidates: Vec<PmccCandidate>) -> Vec<PmccCandidate> {
        let mut best_per_bucket: HashMap<(chrono::NaiveDate, chrono::NaiveDate), PmccCandidate> =
            HashMap::new();

        for candidate in candidates {
            let key = (
                candidate.long_call.expiration.date_naive(),
                candidate.short_call.expiration.date_naive(),
            );
            match best_per_bucket.get(&key) {
                Some(existing) if existing.total_score >= candidate.total_score => {}
                _ => {
                    best_per_bucket.insert(key, candidate);
                }
            }
        }

        let mut deduped: Vec<PmccCandidate> = best_per_bucket.into_values().collect();
        deduped.sort_by(|a, b| {
            b.total_score
                .partial_cmp(&a.total_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.liquidity_score
                        .partial_cmp(&a.liquidity_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| b.risk_metrics.risk_reward.cmp(&a.risk_metrics.risk_reward))
        });
        deduped.truncate(self.config.top_k_per_symbol);
        deduped
    }
}

fn delta_in(contract: &OptionContract, min: Decimal, max: Decimal) -> bool {
    matches!(contract.delta, Some(delta) if delta >= min && delta <= max)
}

fn spread_within(contract: &OptionContract, max_pct: Decimal) -> bool {
    matches!(contract.spread_percentage(), Some(pct) if pct <= max_pct)
}
