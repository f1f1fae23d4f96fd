//! Strict parsing of the analyst's JSON response.

use scanner_core::{AiInsights, ProviderError};

/// The model occasionally wraps its JSON in prose or code fences; fall back
/// to the outermost brace pair before giving up.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

pub(crate) fn parse_insights(text: &str) -> Result<AiInsights, ProviderError> {
    let insights: AiInsights = serde_json::from_str(text).or_else(|first_err| {
        extract_json(text)
            .ok_or_else(|| ProviderError::Parse(first_err.to_string()))
            .and_then(|json| {
                serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))
            })
    })?;

    if !(0.0..=100.0).contains(&insights.pmcc_score) {
        return Err(ProviderError::Parse(format!(
            "pmcc_score {} outside 0-100",
            insights.pmcc_score
        )));
    }
    if let Some(confidence) = insights.confidence_level {
        if !(0.0..=100.0).contains(&confidence) {
            return Err(ProviderError::Parse(format!(
                "confidence_level {confidence} outside 0-100"
            )));
        }
    }

    Ok(insights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanner_core::Recommendation;

    const VALID: &str = r#"{
        "symbol": "ACME",
        "pmcc_score": 72.5,
        "execution_risk_score": 60,
        "financial_stability_score": 80,
        "calendar_event_score": 55,
        "technical_setup_score": 65,
        "recommendation": "buy",
        "confidence_level": 70,
        "key_risks": ["earnings in 30 days"],
        "key_opportunities": ["oversold bounce"],
        "management_strategy": "Roll the short at 21 DTE",
        "entry_timing": "Immediate",
        "exit_conditions": ["LEAPS delta under 0.70"],
        "position_sizing": "2% of portfolio"
    }"#;

    #[test]
    fn parses_clean_json() {
        let insights = parse_insights(VALID).unwrap();
        assert_eq!(insights.symbol, "ACME");
        assert_eq!(insights.pmcc_score, 72.5);
        assert_eq!(insights.recommendation, Recommendation::Buy);
        assert_eq!(insights.key_risks.len(), 1);
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let wrapped = format!("Here is my analysis:\n\n{VALID}\n\nLet me know if you need more.");
        let insights = parse_insights(&wrapped).unwrap();
        assert_eq!(insights.symbol, "ACME");
    }

    #[test]
    fn rejects_score_out_of_range() {
        let bad = VALID.replace("72.5", "140");
        assert!(matches!(
            parse_insights(&bad),
            Err(ProviderError::Parse(_))
        ));
    }

    #[test]
    fn rejects_unknown_recommendation() {
        let bad = VALID.replace("\"buy\"", "\"yolo\"");
        assert!(parse_insights(&bad).is_err());
    }

    #[test]
    fn rejects_plain_prose() {
        assert!(parse_insights("I cannot analyze this position.").is_err());
    }

    #[test]
    fn optional_fields_default() {
        let minimal = r#"{"symbol": "ACME", "pmcc_score": 50, "recommendation": "hold"}"#;
        let insights = parse_insights(minimal).unwrap();
        assert!(insights.key_risks.is_empty());
        assert!(insights.management_strategy.is_none());
    }
}
