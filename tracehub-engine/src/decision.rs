// crates/tracehub-engine/src/decision.rs
// ============================================================================
// Module: Decision Pipeline
// Description: Orchestrates judge invocation, the judge cache, the policy
//              overlay, and persistence of a `TraceDecision`.
// Purpose: Back `POST /decide` (§4.6), the central operation of the system.
// Dependencies: tracehub_core::{judge, hashing, entities, store}, tracehub_policy,
//               tracehub_providers, tracehub_broker, uuid
// ============================================================================

//! ## Overview
//! [`DecisionService::decide`] is a single entry point implementing the
//! eleven numbered steps of the decision pipeline: idempotency
//! short-circuit, trace load, policy resolution, context construction,
//! judge-cache lookup, two-tier judge invocation, policy overlay, synthetic
//! judge span/event, persistence, and a post-commit case-emission side
//! effect that never invalidates an already-committed decision.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use serde_json::json;
use tracehub_broker::CaseEmitter;
use tracehub_core::TraceHubError;
use tracehub_core::entities::Evaluation;
use tracehub_core::entities::JudgeCache;
use tracehub_core::entities::JudgeRun;
use tracehub_core::entities::Span;
use tracehub_core::entities::SpanEvent;
use tracehub_core::entities::SpanEventType;
use tracehub_core::entities::TraceDecision;
use tracehub_core::hashing::stable_hash;
use tracehub_core::ids::JudgeCacheId;
use tracehub_core::ids::JudgeRunId;
use tracehub_core::ids::PolicyId;
use tracehub_core::ids::ProjectId;
use tracehub_core::ids::SpanEventId;
use tracehub_core::ids::SpanId;
use tracehub_core::ids::TraceDecisionId;
use tracehub_core::ids::TraceId;
use tracehub_core::judge::JudgeContext;
use tracehub_core::judge::JudgeOutcome;
use tracehub_core::store::Store;
use tracehub_core::time::Timestamp;
use tracehub_providers::heuristic;
use tracehub_providers::registry::JudgeRegistry;
use uuid::Uuid;

/// Default faithfulness/overall score used when a trace has no evaluations.
const DEFAULT_SCORE: f64 = 0.8;
/// How many of a trace's most recent judge runs are returned alongside an
/// idempotency-short-circuited decision. No foreign key links a `JudgeRun`
/// to the `TraceDecision` it contributed to, so this is a best-effort
/// recency window rather than an exact replay of the original call's runs.
const REPLAYED_JUDGE_RUN_LIMIT: u32 = 10;

/// A `POST /decide` request, per §4.6.
#[derive(Debug, Clone)]
pub struct DecideRequest {
    /// Trace to decide on.
    pub trace_id: TraceId,
    /// Caller-supplied idempotency key.
    pub idempotency_key: String,
    /// Explicit policy override. `None` resolves the project's active
    /// policy.
    pub policy_id: Option<PolicyId>,
    /// Explicit version override; only meaningful alongside `policy_id`.
    pub policy_version: Option<u32>,
    /// Caller-supplied request payload, merged into judge/policy context.
    pub request: Value,
    /// Caller-supplied response payload, merged into judge/policy context.
    pub response: Value,
}

/// The result of a `decide` call.
#[derive(Debug, Clone)]
pub struct DecideResponse {
    /// The persisted (or replayed) decision.
    pub decision: TraceDecision,
    /// Judge runs produced by this call, or the trace's most recent runs on
    /// an idempotent replay.
    pub judge_runs: Vec<JudgeRun>,
}

/// The judge outcome the pipeline settled on for one `decide` call, either
/// the heuristic's decisive verdict or the LLM's, whichever ran last.
struct SelectedJudge {
    /// The winning outcome: action, reason code, confidence, and signals.
    outcome: JudgeOutcome,
    /// Which provider produced `outcome` (`"heuristic"` or `"llm"`).
    provider: &'static str,
    /// The LLM model identifier, when `provider` is `"llm"`.
    model: Option<String>,
}

/// Backs `POST /decide`.
pub struct DecisionService {
    store: Arc<dyn Store>,
    judges: Arc<JudgeRegistry>,
    emitter: Arc<CaseEmitter>,
    webhook_url: Option<String>,
    llm_model: String,
}

impl DecisionService {
    /// Builds a decision service. `llm_model` is the configured LLM judge's
    /// model name, used both as the `JudgeRun.model` for an `"llm"`-tier
    /// invocation and as `TraceDecision.judge_model` when the LLM judge
    /// contributed to the final action.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        judges: Arc<JudgeRegistry>,
        emitter: Arc<CaseEmitter>,
        webhook_url: Option<String>,
        llm_model: String,
    ) -> Self {
        Self { store, judges, emitter, webhook_url, llm_model }
    }

    /// Runs the full decision pipeline for `request`.
    ///
    /// # Errors
    /// Returns [`TraceHubError::Validation`] if the idempotency key is out
    /// of bounds or no active policy resolves; [`TraceHubError::NotFound`]
    /// if the trace is absent; [`TraceHubError::Conflict`] on a racing
    /// duplicate idempotency key; [`TraceHubError::Provider`] if a judge
    /// invocation fails.
    pub async fn decide(
        &self,
        project_id: ProjectId,
        request: DecideRequest,
    ) -> Result<DecideResponse, TraceHubError> {
        crate::validate_idempotency_key(&request.idempotency_key)?;
        tracing::debug!(
            project_id = %project_id,
            trace_id = %request.trace_id,
            idempotency_key = %request.idempotency_key,
            "decision requested"
        );

        if let Some(existing) = self
            .store
            .get_decision_by_idempotency_key(project_id, &request.idempotency_key)
            .await?
        {
            let judge_runs = self
                .store
                .recent_judge_runs(project_id, request.trace_id, REPLAYED_JUDGE_RUN_LIMIT)
                .await?;
            return Ok(DecideResponse { decision: existing, judge_runs });
        }

        let trace = self
            .store
            .get_trace(project_id, request.trace_id)
            .await?
            .ok_or_else(|| TraceHubError::NotFound(format!("trace {}", request.trace_id)))?;

        let now = Timestamp::now();
        let (policy, policy_version) = self
            .store
            .resolve_active_policy_version(project_id, request.policy_id, request.policy_version, now)
            .await?
            .ok_or_else(|| TraceHubError::Validation("no active policy".to_string()))?;
        let policy_version_key = format!("{}:v{}", policy.id, policy_version.version);

        let evaluations = self.store.list_evaluations_for_trace(project_id, request.trace_id).await?;
        let evals_map = build_eval_map(&evaluations);
        let overall_score = mean_score(&evaluations);
        let faithfulness_score = evals_map
            .get("faithfulness")
            .and_then(|row| row.get("score"))
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_SCORE);

        let input_hash = stable_hash(&json!({
            "trace_id": trace.id.to_string(),
            "input_text": trace.input_text,
            "output_text": trace.output_text,
            "request": request.request,
            "response": request.response,
            "evals": evals_map,
        }))
        .map_err(|err| TraceHubError::Store(format!("failed to hash decision input: {err}")))?;

        let context = JudgeContext {
            input_text: trace.input_text.clone(),
            output_text: trace.output_text.clone(),
            request: request.request.clone(),
            response: request.response.clone(),
            evals: evals_map.clone(),
            overall_score,
            faithfulness_score,
        };

        let mut judge_runs = Vec::new();
        let selected = match self.store.get_judge_cache(project_id, &input_hash, &policy_version_key).await? {
            Some(cached) => selected_from_cache(&cached),
            None => {
                let selected = self.invoke_judges(project_id, request.trace_id, &context, &mut judge_runs).await?;
                let cache_row = JudgeCache {
                    id: JudgeCacheId::generate(),
                    project_id,
                    input_hash: input_hash.clone(),
                    policy_version: policy_version_key.clone(),
                    decision: selected_to_cache_value(&selected),
                    created_at: now,
                };
                self.store.put_judge_cache(cache_row).await?;
                selected
            }
        };

        let policy_context = json!({
            "request": request.request,
            "response": request.response,
            "evals": evals_map,
            "signals": selected.outcome.signals,
            "safety": request.request.get("safety").cloned().unwrap_or(Value::Null),
        });
        let policy_result = tracehub_policy::evaluate(&policy_version.definition, &policy_context)
            .map_err(|err| TraceHubError::Validation(err.to_string()))?;

        let (action, reason_code, severity) = if policy_result.matched {
            (policy_result.action.clone(), policy_result.reason_code.clone(), policy_result.severity.clone())
        } else {
            (selected.outcome.action.clone(), selected.outcome.reason_code.clone(), policy_result.severity.clone())
        };

        let judge_model = if selected.provider == "llm" {
            Some(selected.model.clone().unwrap_or_else(|| self.llm_model.clone()))
        } else {
            Some("heuristic".to_string())
        };

        let (judge_span, judge_event) =
            self.build_judge_artifacts(project_id, &request, &trace.id, &selected, &policy_result, now);

        let decision = TraceDecision {
            id: TraceDecisionId::generate(),
            project_id,
            trace_id: trace.id,
            action,
            reason_code: reason_code.clone(),
            severity,
            confidence: selected.outcome.confidence,
            policy_version: policy_version_key,
            judge_model,
            signals: selected.outcome.signals.clone(),
            rationale: Some(selected.outcome.rationale.clone()),
            idempotency_key: request.idempotency_key,
        };

        let persisted = self
            .store
            .persist_decision(project_id, trace.id, judge_runs.clone(), judge_span, judge_event, decision)
            .await?;

        if persisted.action == "ESCALATE" {
            if let Err(err) = self
                .emitter
                .emit(project_id, trace.id, reason_code, self.webhook_url.as_deref())
                .await
            {
                tracing::warn!(
                    project_id = %project_id,
                    trace_id = %trace.id,
                    error = %err,
                    "case emission failed after a committed decision"
                );
            }
        }

        tracing::info!(
            project_id = %project_id,
            trace_id = %trace.id,
            action = %persisted.action,
            reason_code = %persisted.reason_code,
            judge_provider = selected.provider,
            "decision committed"
        );

        Ok(DecideResponse { decision: persisted, judge_runs })
    }

    async fn invoke_judges(
        &self,
        project_id: ProjectId,
        trace_id: TraceId,
        context: &JudgeContext,
        judge_runs: &mut Vec<JudgeRun>,
    ) -> Result<SelectedJudge, TraceHubError> {
        let heuristic_provider = self
            .judges
            .get("heuristic")
            .map_err(|err| TraceHubError::Provider(err.to_string()))?;
        let heuristic_outcome = heuristic_provider
            .judge(context)
            .await
            .map_err(|err| TraceHubError::Provider(err.to_string()))?;
        judge_runs.push(build_judge_run(project_id, trace_id, "heuristic", None, &heuristic_outcome));

        if heuristic::is_decisive(&heuristic_outcome) {
            return Ok(SelectedJudge { outcome: heuristic_outcome, provider: "heuristic", model: None });
        }

        let llm_provider = self
            .judges
            .get("llm")
            .map_err(|err| TraceHubError::Provider(err.to_string()))?;
        let llm_outcome = llm_provider
            .judge(context)
            .await
            .map_err(|err| TraceHubError::Provider(err.to_string()))?;
        judge_runs.push(build_judge_run(
            project_id,
            trace_id,
            "llm",
            Some(self.llm_model.clone()),
            &llm_outcome,
        ));

        Ok(SelectedJudge { outcome: llm_outcome, provider: "llm", model: Some(self.llm_model.clone()) })
    }

    fn build_judge_artifacts(
        &self,
        project_id: ProjectId,
        request: &DecideRequest,
        trace_id: &TraceId,
        selected: &SelectedJudge,
        policy_result: &tracehub_policy::PolicyResult,
        now: Timestamp,
    ) -> (Span, SpanEvent) {
        let span_key = format!("judge-span:{}", request.idempotency_key);
        let event_key = format!("judge-event:{}", request.idempotency_key);

        let span = Span {
            id: derive_span_id(&span_key),
            project_id,
            trace_id: *trace_id,
            parent_span_id: None,
            name: "Decision Judge".to_string(),
            span_type: "judge".to_string(),
            status: "success".to_string(),
            start_time: now,
            end_time: Some(now),
            error: None,
            attributes: BTreeMap::new(),
            idempotency_key: span_key.clone(),
        };

        let event = SpanEvent {
            id: derive_span_event_id(&event_key),
            project_id,
            trace_id: *trace_id,
            span_id: Some(span.id),
            event_type: SpanEventType::Event,
            event_time: now,
            payload: json!({
                "judge": {
                    "provider": selected.provider,
                    "model": selected.model,
                    "action": selected.outcome.action,
                    "reason_code": selected.outcome.reason_code,
                    "confidence": selected.outcome.confidence,
                    "rationale": selected.outcome.rationale,
                    "signals": selected.outcome.signals,
                },
                "policy_result": {
                    "matched": policy_result.matched,
                    "action": policy_result.action,
                    "reason_code": policy_result.reason_code,
                    "severity": policy_result.severity,
                },
            }),
            idempotency_key: event_key,
        };

        (span, event)
    }
}

fn build_eval_map(evaluations: &[Evaluation]) -> BTreeMap<String, Value> {
    evaluations
        .iter()
        .map(|evaluation| {
            (
                evaluation.eval_name.clone(),
                json!({
                    "score": evaluation.score,
                    "passed": evaluation.passed,
                    "metadata": evaluation.metadata,
                }),
            )
        })
        .collect()
}

fn mean_score(evaluations: &[Evaluation]) -> f64 {
    if evaluations.is_empty() {
        return DEFAULT_SCORE;
    }
    #[allow(clippy::cast_precision_loss, reason = "evaluation counts never approach f64 precision limits")]
    let count = evaluations.len() as f64;
    evaluations.iter().map(|evaluation| evaluation.score).sum::<f64>() / count
}

fn build_judge_run(
    project_id: ProjectId,
    trace_id: TraceId,
    provider: &str,
    model: Option<String>,
    outcome: &JudgeOutcome,
) -> JudgeRun {
    JudgeRun {
        id: JudgeRunId::generate(),
        project_id,
        trace_id,
        span_id: None,
        provider: provider.to_string(),
        model,
        action: outcome.action.clone(),
        reason_code: outcome.reason_code.clone(),
        confidence: outcome.confidence,
        output: json!({"rationale": outcome.rationale, "signals": outcome.signals}),
        created_at: Timestamp::now(),
    }
}

fn selected_to_cache_value(selected: &SelectedJudge) -> Value {
    json!({
        "action": selected.outcome.action,
        "reason_code": selected.outcome.reason_code,
        "confidence": selected.outcome.confidence,
        "rationale": selected.outcome.rationale,
        "signals": selected.outcome.signals,
        "provider": selected.provider,
        "model": selected.model,
    })
}

fn selected_from_cache(cache: &JudgeCache) -> SelectedJudge {
    let decision = &cache.decision;
    let provider = if decision.get("provider").and_then(Value::as_str) == Some("llm") {
        "llm"
    } else {
        "heuristic"
    };
    let model = decision.get("model").and_then(Value::as_str).map(ToString::to_string);
    SelectedJudge {
        outcome: JudgeOutcome {
            action: decision.get("action").and_then(Value::as_str).unwrap_or("ALLOW_ANSWER").to_string(),
            reason_code: decision.get("reason_code").and_then(Value::as_str).unwrap_or_default().to_string(),
            confidence: decision.get("confidence").and_then(Value::as_f64).unwrap_or(DEFAULT_SCORE),
            rationale: decision.get("rationale").and_then(Value::as_str).unwrap_or_default().to_string(),
            signals: decision.get("signals").cloned().unwrap_or(Value::Null),
        },
        provider,
        model,
    }
}

fn derive_span_id(seed: &str) -> SpanId {
    SpanId::new(Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()))
}

fn derive_span_event_id(seed: &str) -> SpanEventId {
    SpanEventId::new(Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "test-only assertions")]

    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::Value;
    use serde_json::json;
    use tempfile::NamedTempFile;
    use tracehub_broker::CaseEmitter;
    use tracehub_core::entities::Project;
    use tracehub_core::entities::Span;
    use tracehub_core::entities::Trace;
    use tracehub_core::entities::TraceStatus;
    use tracehub_core::ids::PolicyId;
    use tracehub_core::ids::PolicyVersionId;
    use tracehub_core::ids::ProjectId;
    use tracehub_core::ids::SpanId;
    use tracehub_core::ids::TraceId;
    use tracehub_core::store::Store;
    use tracehub_core::time::Timestamp;
    use tracehub_providers::heuristic::HeuristicJudge;
    use tracehub_providers::llm::LlmJudge;
    use tracehub_providers::llm::LlmJudgeConfig;
    use tracehub_providers::registry::JudgeRegistry;
    use tracehub_store_sqlite::SqliteStore;
    use tracehub_store_sqlite::SqliteStoreConfig;

    use super::DecideRequest;
    use super::DecisionService;

    async fn harness() -> (NamedTempFile, Arc<dyn Store>, ProjectId, TraceId, DecisionService) {
        harness_with("what is 2+2", "four", json!({"rules": []})).await
    }

    async fn harness_with(
        input_text: &str,
        output_text: &str,
        policy_definition: Value,
    ) -> (NamedTempFile, Arc<dyn Store>, ProjectId, TraceId, DecisionService) {
        let file = NamedTempFile::new().expect("temp file");
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&SqliteStoreConfig::new(file.path())).unwrap());

        let project = store
            .create_project(Project {
                id: ProjectId::generate(),
                name: "acme".to_string(),
                api_key_hash: "hash".to_string(),
                current_api_key: None,
                is_active: true,
                key_activated: true,
                created_at: Timestamp::now(),
            })
            .await
            .unwrap();

        let trace_id = TraceId::generate();
        store
            .ingest_trace_batch(
                project.id,
                Trace {
                    id: trace_id,
                    project_id: project.id,
                    external_trace_id: None,
                    status: TraceStatus::Running,
                    start_time: Timestamp::now(),
                    end_time: Some(Timestamp::now()),
                    attributes: BTreeMap::new(),
                    model: Some("gpt-4".to_string()),
                    environment: Some("prod".to_string()),
                    user_id: None,
                    session_id: None,
                    input_text: Some(input_text.to_string()),
                    output_text: Some(output_text.to_string()),
                    has_open_spans: false,
                    total_spans: 0,
                    ended_spans: 0,
                    completion_rate: 1.0,
                    decision: None,
                    user_review_passed: None,
                },
                vec![Span {
                    id: SpanId::generate(),
                    project_id: project.id,
                    trace_id,
                    parent_span_id: None,
                    name: "llm_call".to_string(),
                    span_type: "llm_call".to_string(),
                    status: "success".to_string(),
                    start_time: Timestamp::now(),
                    end_time: Some(Timestamp::now()),
                    error: None,
                    attributes: BTreeMap::new(),
                    idempotency_key: "span-1".to_string(),
                }],
                false,
            )
            .await
            .unwrap();

        store
            .create_policy(
                tracehub_core::entities::Policy {
                    id: PolicyId::generate(),
                    project_id: project.id,
                    name: "default".to_string(),
                    description: None,
                },
                tracehub_core::entities::PolicyVersion {
                    id: PolicyVersionId::generate(),
                    policy_id: PolicyId::generate(),
                    version: 1,
                    effective_from: Timestamp::now(),
                    active: true,
                    definition: policy_definition,
                },
            )
            .await
            .unwrap();

        let mut registry = JudgeRegistry::new();
        registry.register(Arc::new(HeuristicJudge));
        registry.register(Arc::new(LlmJudge::new(LlmJudgeConfig::default())));

        let emitter = Arc::new(CaseEmitter::new(store.clone(), Duration::from_secs(1)));
        let service = DecisionService::new(
            store.clone(),
            Arc::new(registry),
            emitter,
            None,
            "gpt-judge".to_string(),
        );

        (file, store, project.id, trace_id, service)
    }

    #[tokio::test]
    async fn allows_clean_trace() {
        let (_file, _store, project_id, trace_id, service) = harness().await;
        let response = service
            .decide(
                project_id,
                DecideRequest {
                    trace_id,
                    idempotency_key: "decide-1".to_string(),
                    policy_id: None,
                    policy_version: None,
                    request: json!({}),
                    response: json!({}),
                },
            )
            .await
            .unwrap();
        assert_eq!(response.decision.action, "ALLOW_ANSWER");
        assert_eq!(response.decision.judge_model.as_deref(), Some("heuristic"));
        assert_eq!(response.decision.severity, "low");
    }

    #[tokio::test]
    async fn pii_in_input_escalates_and_opens_a_case() {
        let (_file, store, project_id, trace_id, service) =
            harness_with("my SSN is 123", "four", json!({"rules": []})).await;
        let response = service
            .decide(
                project_id,
                DecideRequest {
                    trace_id,
                    idempotency_key: "decide-pii".to_string(),
                    policy_id: None,
                    policy_version: None,
                    request: json!({}),
                    response: json!({}),
                },
            )
            .await
            .unwrap();
        assert_eq!(response.decision.action, "ESCALATE");
        assert_eq!(response.decision.reason_code, "PII_DETECTED");
        assert_eq!(response.decision.judge_model.as_deref(), Some("heuristic"));

        let cases = store.list_cases(project_id).await.unwrap();
        assert_eq!(cases.len(), 1, "an ESCALATE decision opens exactly one case");
        assert_eq!(cases[0].trace_id, trace_id);
        assert_eq!(cases[0].status, tracehub_core::entities::CaseStatus::Open);
    }

    /// The heuristic's own financial-risk signal only ever produces
    /// `ALLOW_WITH_WARNING` at confidence `0.70`, which is never decisive, so
    /// the LLM judge always runs too and its output (not the heuristic's) is
    /// `selected` — the stub's `financial_risk` is a fixed `0.2`. To exercise
    /// a policy rule actually overriding a financial-risk judge suggestion,
    /// this test stands up a loopback LLM endpoint returning a realistic
    /// elevated `financial_risk` signal, the way a real judge backend would.
    #[tokio::test]
    async fn policy_rule_overrides_the_judges_suggested_action() {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("bind loopback server");
        let addr = server.server_addr();
        let handle = std::thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let body = json!({
                    "action": "ALLOW_WITH_WARNING",
                    "confidence": 0.8,
                    "reason_code": "FINANCIAL_RISK",
                    "rationale": "output discusses investment advice",
                    "signals": {"pii": false, "hallucination_risk": 0.1, "financial_risk": 0.9},
                })
                .to_string();
                request.respond(tiny_http::Response::from_string(body)).expect("respond");
            }
        });

        let definition = json!({
            "rules": [
                {
                    "priority": 1,
                    "when": {
                        "all": [
                            {"field": "signals.financial_risk", "op": "gte", "value": 0.5},
                        ],
                    },
                    "then": {
                        "action": "BLOCK",
                        "reason_code": "FIN_BLOCK",
                        "severity": "high",
                    },
                },
            ],
        });
        let (_file, store, project_id, trace_id, _default_service) =
            harness_with("what should I invest in?", "investment advice: buy X", definition).await;

        let mut registry = JudgeRegistry::new();
        registry.register(Arc::new(HeuristicJudge));
        registry.register(Arc::new(LlmJudge::new(LlmJudgeConfig {
            endpoint: Some(format!("http://{addr}/judge")),
            model: "gpt-judge".to_string(),
            timeout: Duration::from_secs(5),
        })));
        let emitter = Arc::new(CaseEmitter::new(store.clone(), Duration::from_secs(1)));
        let service =
            DecisionService::new(store, Arc::new(registry), emitter, None, "gpt-judge".to_string());

        let response = service
            .decide(
                project_id,
                DecideRequest {
                    trace_id,
                    idempotency_key: "decide-policy-override".to_string(),
                    policy_id: None,
                    policy_version: None,
                    request: json!({}),
                    response: json!({}),
                },
            )
            .await
            .unwrap();
        assert_eq!(response.decision.action, "BLOCK");
        assert_eq!(response.decision.reason_code, "FIN_BLOCK");
        assert_eq!(response.decision.severity, "high");

        handle.join().expect("server thread");
    }

    #[tokio::test]
    async fn idempotency_key_short_circuits_second_call() {
        let (_file, _store, project_id, trace_id, service) = harness().await;
        let request = DecideRequest {
            trace_id,
            idempotency_key: "decide-2".to_string(),
            policy_id: None,
            policy_version: None,
            request: json!({}),
            response: json!({}),
        };
        let first = service.decide(project_id, request.clone()).await.unwrap();
        let second = service.decide(project_id, request).await.unwrap();
        assert_eq!(first.decision.id, second.decision.id);
    }

    #[tokio::test]
    async fn unknown_trace_is_not_found() {
        let (_file, _store, project_id, _trace_id, service) = harness().await;
        let err = service
            .decide(
                project_id,
                DecideRequest {
                    trace_id: TraceId::generate(),
                    idempotency_key: "decide-3".to_string(),
                    policy_id: None,
                    policy_version: None,
                    request: json!({}),
                    response: json!({}),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, tracehub_core::TraceHubError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_decides_with_same_key_yield_exactly_one_winner() {
        let (_file, _store, project_id, trace_id, service) = harness().await;
        let service = Arc::new(service);
        let barrier = Arc::new(tokio::sync::Barrier::new(2));

        let request = DecideRequest {
            trace_id,
            idempotency_key: "decide-race".to_string(),
            policy_id: None,
            policy_version: None,
            request: json!({}),
            response: json!({}),
        };

        let first_handle = {
            let service = service.clone();
            let barrier = barrier.clone();
            let request = request.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                service.decide(project_id, request).await
            })
        };
        let second_handle = {
            let service = service.clone();
            let barrier = barrier.clone();
            let request = request.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                service.decide(project_id, request).await
            })
        };

        let (first_result, second_result) = tokio::join!(first_handle, second_handle);
        let outcomes = vec![first_result.expect("task panicked"), second_result.expect("task panicked")];

        let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        let conflicts = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, Err(err) if err.is_conflict()))
            .count();
        assert_eq!(winners, 1, "exactly one concurrent decide should commit");
        assert_eq!(conflicts, 1, "the loser should observe a Conflict, not a different error");

        let winner_id = outcomes.iter().find_map(|outcome| outcome.as_ref().ok()).unwrap().decision.id;

        // A retry with the same idempotency key always returns the winner's decision.
        let retried = service.decide(project_id, request).await.unwrap();
        assert_eq!(retried.decision.id, winner_id);
    }
}
