// crates/tracehub-providers/src/heuristic.rs
// ============================================================================
// Module: Heuristic Judge
// Description: A pure, synchronous pre-check judge over trace input/output
//              text and the faithfulness evaluation score.
// Purpose: Cheaply catch the common cases (PII, financial advice, low
//          faithfulness) before paying for an LLM judge call.
// Dependencies: async-trait, serde_json, tracehub_core::judge
// ============================================================================

use async_trait::async_trait;
use serde_json::json;
use tracehub_core::judge::JudgeContext;
use tracehub_core::judge::JudgeError;
use tracehub_core::judge::JudgeOutcome;
use tracehub_core::judge::JudgeProvider;

/// Substrings in `input_text` (case-insensitive) that trigger a PII escalation.
const PII_MARKERS: [&str; 3] = ["ssn", "credit card", "passport"];

/// Substring in `output_text` (case-insensitive) that raises financial risk.
const FINANCIAL_ADVICE_MARKER: &str = "investment advice";

/// The built-in heuristic judge. Holds no state; every call is pure.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicJudge;

#[async_trait]
impl JudgeProvider for HeuristicJudge {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn judge(&self, context: &JudgeContext) -> Result<JudgeOutcome, JudgeError> {
        let input_lower = context.input_text.as_deref().unwrap_or_default().to_lowercase();
        let output_lower = context.output_text.as_deref().unwrap_or_default().to_lowercase();

        let pii = PII_MARKERS.iter().any(|marker| input_lower.contains(marker));
        let financial_risk = if output_lower.contains(FINANCIAL_ADVICE_MARKER) {
            0.9
        } else {
            0.1
        };
        let hallucination_risk = 1.0 - context.faithfulness_score;

        let signals = json!({
            "pii": pii,
            "hallucination_risk": hallucination_risk,
            "financial_risk": financial_risk,
        });

        let (action, reason_code, confidence) = if pii {
            ("ESCALATE", "PII_DETECTED", 0.95)
        } else if financial_risk > 0.85 {
            ("ALLOW_WITH_WARNING", "FINANCIAL_RISK", 0.70)
        } else if hallucination_risk > 0.8 {
            ("NEED_CLARIFICATION", "HALLUCINATION_RISK", 0.70)
        } else {
            ("ALLOW_ANSWER", "HEURISTIC_OK", 0.70)
        };

        Ok(JudgeOutcome {
            action: action.to_string(),
            reason_code: reason_code.to_string(),
            confidence,
            rationale: "heuristic pre-check".to_string(),
            signals,
        })
    }
}

/// Whether a heuristic outcome is decisive enough to skip the LLM judge:
/// the action is `BLOCK` or `ESCALATE` and confidence is at least `0.9`.
#[must_use]
pub fn is_decisive(outcome: &JudgeOutcome) -> bool {
    matches!(outcome.action.as_str(), "BLOCK" | "ESCALATE") && outcome.confidence >= 0.9
}

#[cfg(test)]
mod tests {
    use super::HeuristicJudge;
    use super::is_decisive;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tracehub_core::judge::JudgeContext;
    use tracehub_core::judge::JudgeProvider;

    fn context(input: &str, output: &str, faithfulness: f64) -> JudgeContext {
        JudgeContext {
            input_text: Some(input.to_string()),
            output_text: Some(output.to_string()),
            request: json!({}),
            response: json!({}),
            evals: BTreeMap::new(),
            overall_score: 0.8,
            faithfulness_score: faithfulness,
        }
    }

    #[tokio::test]
    async fn pii_escalates_regardless_of_other_signals() {
        let outcome = HeuristicJudge
            .judge(&context("my SSN is 123-45-6789", "investment advice: buy X", 0.1))
            .await
            .unwrap();
        assert_eq!(outcome.action, "ESCALATE");
        assert_eq!(outcome.reason_code, "PII_DETECTED");
        assert!(is_decisive(&outcome));
    }

    #[tokio::test]
    async fn financial_advice_without_pii_warns() {
        let outcome = HeuristicJudge
            .judge(&context("what should I invest in", "here is some investment advice", 0.9))
            .await
            .unwrap();
        assert_eq!(outcome.action, "ALLOW_WITH_WARNING");
        assert_eq!(outcome.reason_code, "FINANCIAL_RISK");
        assert!(!is_decisive(&outcome));
    }

    #[tokio::test]
    async fn low_faithfulness_needs_clarification() {
        let outcome = HeuristicJudge
            .judge(&context("what is 2+2", "four", 0.1))
            .await
            .unwrap();
        assert_eq!(outcome.action, "NEED_CLARIFICATION");
        assert_eq!(outcome.reason_code, "HALLUCINATION_RISK");
    }

    #[tokio::test]
    async fn clean_input_allows() {
        let outcome = HeuristicJudge
            .judge(&context("what is 2+2", "four", 0.9))
            .await
            .unwrap();
        assert_eq!(outcome.action, "ALLOW_ANSWER");
        assert_eq!(outcome.reason_code, "HEURISTIC_OK");
    }
}
