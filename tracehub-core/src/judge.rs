// crates/tracehub-core/src/judge.rs
// ============================================================================
// Module: TraceHub Judge Trait
// Description: The seam implemented by every judge provider (heuristic, LLM).
// Purpose: Give the decision pipeline a uniform async interface regardless of
//          whether a judge runs in-process or over HTTP.
// Dependencies: async-trait, serde_json, thiserror
// ============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// The context a judge evaluates, built by the decision pipeline from a
/// trace, its evaluations, and the caller's request/response payloads.
#[derive(Debug, Clone)]
pub struct JudgeContext {
    /// Trace input text.
    pub input_text: Option<String>,
    /// Trace output text.
    pub output_text: Option<String>,
    /// Caller-supplied request payload.
    pub request: Value,
    /// Caller-supplied response payload.
    pub response: Value,
    /// Per-evaluation rows keyed by `eval_name`.
    pub evals: BTreeMap<String, Value>,
    /// Mean of all evaluation scores, or `0.8` when none are present.
    pub overall_score: f64,
    /// `evals["faithfulness"].score`, or `0.8` when absent.
    pub faithfulness_score: f64,
}

/// A judge's recommendation.
#[derive(Debug, Clone)]
pub struct JudgeOutcome {
    /// Recommended action (e.g. `"ALLOW_ANSWER"`, `"ESCALATE"`).
    pub action: String,
    /// Reason code for the action.
    pub reason_code: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Free-text rationale.
    pub rationale: String,
    /// Named signals the judge computed (e.g. `pii`, `financial_risk`).
    pub signals: Value,
}

/// Errors a judge provider can raise.
#[derive(Debug, Error)]
pub enum JudgeError {
    /// The configured endpoint returned a non-success status or timed out.
    #[error("judge endpoint request failed: {0}")]
    Request(String),
    /// The endpoint's response did not match the expected output schema.
    #[error("judge output did not match the expected schema: {0}")]
    InvalidOutput(String),
}

/// A pluggable judge. The registry (`tracehub-providers`) holds a map of
/// `&str` name to `Box<dyn JudgeProvider>`.
#[async_trait]
pub trait JudgeProvider: Send + Sync {
    /// Provider name, as referenced by a `JudgeRun.provider` value.
    fn name(&self) -> &'static str;

    /// Evaluates `context` and returns a recommendation.
    ///
    /// # Errors
    /// Returns [`JudgeError`] if the provider cannot produce an outcome
    /// (network failure, timeout, or schema mismatch for HTTP-backed
    /// providers).
    async fn judge(&self, context: &JudgeContext) -> Result<JudgeOutcome, JudgeError>;
}
