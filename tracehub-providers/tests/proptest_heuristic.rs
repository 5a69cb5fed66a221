// crates/tracehub-providers/tests/proptest_heuristic.rs
// ============================================================================
// Module: Heuristic Judge Property-Based Tests
// Description: Property tests asserting the heuristic judge always returns
//              a well-formed outcome for arbitrary text/score inputs.
// Purpose: Back SPEC_FULL.md §4.5's heuristic signal thresholds with
//          coverage beyond the fixed example cases.
// ============================================================================

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "property-test assertions only")]

use std::collections::BTreeMap;

use proptest::prelude::*;
use serde_json::json;
use tracehub_core::judge::JudgeContext;
use tracehub_core::judge::JudgeProvider;
use tracehub_providers::heuristic::HeuristicJudge;

const KNOWN_ACTIONS: &[&str] =
    &["ESCALATE", "ALLOW_WITH_WARNING", "NEED_CLARIFICATION", "ALLOW_ANSWER"];

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

fn judge_sync(ctx: &JudgeContext) -> tracehub_core::judge::JudgeOutcome {
    tokio::runtime::Runtime::new()
        .expect("build runtime")
        .block_on(HeuristicJudge.judge(ctx))
        .expect("heuristic judge never fails")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Confidence is always a probability, and the action always comes
    /// from the four-member outcome set, for any text/score combination.
    #[test]
    fn outcome_is_always_well_formed(
        input in ".{0,120}",
        output in ".{0,120}",
        faithfulness in 0.0f64..1.0,
    ) {
        let outcome = judge_sync(&context(&input, &output, faithfulness));
        prop_assert!((0.0..=1.0).contains(&outcome.confidence));
        prop_assert!(KNOWN_ACTIONS.contains(&outcome.action.as_str()));
    }

    /// Any input text containing a PII marker (in any case) escalates,
    /// regardless of what the output text says.
    #[test]
    fn pii_marker_always_escalates(
        marker_index in 0usize..3,
        prefix in "[a-zA-Z ]{0,30}",
        suffix in "[a-zA-Z ]{0,30}",
        output in ".{0,60}",
        faithfulness in 0.0f64..1.0,
    ) {
        let marker = ["ssn", "credit card", "passport"][marker_index];
        let input = format!("{prefix}{marker}{suffix}");
        let outcome = judge_sync(&context(&input, &output, faithfulness));
        prop_assert_eq!(outcome.action, "ESCALATE");
        prop_assert_eq!(outcome.reason_code, "PII_DETECTED");
        prop_assert!(tracehub_providers::heuristic::is_decisive(&outcome));
    }

    /// Text with no PII marker, no financial-advice phrasing, and a
    /// faithfulness score above the 0.8 risk threshold always allows.
    #[test]
    fn clean_text_above_faithfulness_threshold_allows(
        input in "[a-zA-Z0-9 ?]{0,60}",
        faithfulness in 0.21f64..1.0,
    ) {
        prop_assume!(!input.to_lowercase().contains("ssn"));
        prop_assume!(!input.to_lowercase().contains("credit card"));
        prop_assume!(!input.to_lowercase().contains("passport"));
        let outcome = judge_sync(&context(&input, "a plain factual answer", faithfulness));
        prop_assert_eq!(outcome.action, "ALLOW_ANSWER");
        prop_assert_eq!(outcome.reason_code, "HEURISTIC_OK");
    }
}
