// crates/tracehub-providers/src/llm.rs
// ============================================================================
// Module: LLM Judge
// Description: An HTTP-fronted judge, falling back to a deterministic stub
//              when no endpoint is configured.
// Purpose: Provide the second tier of the two-tier judge without hard-coding
//          a dependency on a specific model provider.
// Dependencies: async-trait, reqwest, serde, serde_json, tracehub_core::judge
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use tracehub_core::judge::JudgeContext;
use tracehub_core::judge::JudgeError;
use tracehub_core::judge::JudgeOutcome;
use tracehub_core::judge::JudgeProvider;

/// Configuration for the LLM judge. Constructed once at service startup
/// from `TraceHubConfig`, never read as a global.
#[derive(Debug, Clone)]
pub struct LlmJudgeConfig {
    /// Endpoint to POST `{model, payload}` to. `None` selects the stub.
    pub endpoint: Option<String>,
    /// Model identifier sent in the request and recorded as
    /// `TraceDecision.judge_model`.
    pub model: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for LlmJudgeConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: "gpt-judge".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// The schema an LLM judge endpoint's response must match.
#[derive(Debug, Deserialize)]
struct LlmJudgeOutput {
    action: String,
    confidence: f64,
    reason_code: String,
    rationale: String,
    signals: Value,
}

/// The LLM-backed judge, second tier of the two-tier pipeline.
pub struct LlmJudge {
    config: LlmJudgeConfig,
    client: reqwest::Client,
}

impl LlmJudge {
    /// Builds a judge from `config`, constructing its own HTTP client with
    /// the configured timeout baked in.
    #[must_use]
    pub fn new(config: LlmJudgeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    /// The model identifier this judge reports, used by the decision
    /// pipeline to populate `TraceDecision.judge_model`.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn call_endpoint(&self, endpoint: &str, context: &JudgeContext) -> Result<JudgeOutcome, JudgeError> {
        let payload = json!({
            "input_text": context.input_text,
            "output_text": context.output_text,
            "request": context.request,
            "response": context.response,
            "evals": context.evals,
            "overall_score": context.overall_score,
        });
        let body = json!({"model": self.config.model, "payload": payload});

        let response = self
            .client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| JudgeError::Request(err.to_string()))?;

        let response = response
            .error_for_status()
            .map_err(|err| JudgeError::Request(err.to_string()))?;

        let parsed: LlmJudgeOutput = response
            .json()
            .await
            .map_err(|err| JudgeError::InvalidOutput(err.to_string()))?;

        if !(0.0..=1.0).contains(&parsed.confidence) {
            return Err(JudgeError::InvalidOutput(format!(
                "confidence {} outside [0, 1]",
                parsed.confidence
            )));
        }

        Ok(JudgeOutcome {
            action: parsed.action,
            reason_code: parsed.reason_code,
            confidence: parsed.confidence,
            rationale: parsed.rationale,
            signals: parsed.signals,
        })
    }

    fn stub_outcome(context: &JudgeContext) -> JudgeOutcome {
        let action = if context.overall_score >= 0.5 {
            "ALLOW_ANSWER"
        } else {
            "NEED_CLARIFICATION"
        };
        JudgeOutcome {
            action: action.to_string(),
            reason_code: "LLM_JUDGE_STUB".to_string(),
            confidence: 0.65,
            rationale: "stubbed llm judge".to_string(),
            signals: json!({
                "pii": false,
                "hallucination_risk": (1.0 - context.overall_score).max(0.0),
                "financial_risk": 0.2,
            }),
        }
    }
}

#[async_trait]
impl JudgeProvider for LlmJudge {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn judge(&self, context: &JudgeContext) -> Result<JudgeOutcome, JudgeError> {
        match &self.config.endpoint {
            Some(endpoint) => self.call_endpoint(endpoint, context).await,
            None => Ok(Self::stub_outcome(context)),
        }
    }
}
