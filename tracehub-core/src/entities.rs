// crates/tracehub-core/src/entities.rs
// ============================================================================
// Module: TraceHub Entity Model
// Description: The twelve persisted entity shapes that make up the data
//              model: Project, Trace, Span, SpanEvent, Evaluation, Policy,
//              PolicyVersion, TraceDecision, JudgeRun, JudgeCache, Case,
//              Notification.
// Purpose: Give every crate a single, store-agnostic definition of "what a
//          row looks like" so the SQLite store and the engine never disagree
//          about field shape.
// Dependencies: serde, serde_json, tracehub_core::{ids, time}
// ============================================================================

//! ## Overview
//! These types mirror the relational schema described in the design
//! document. They carry no persistence logic themselves; `tracehub-core`
//! never talks to a database.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::ids::CaseId;
use crate::ids::EvaluationId;
use crate::ids::JudgeCacheId;
use crate::ids::JudgeRunId;
use crate::ids::NotificationId;
use crate::ids::PolicyId;
use crate::ids::PolicyVersionId;
use crate::ids::ProjectId;
use crate::ids::SpanEventId;
use crate::ids::SpanId;
use crate::ids::TraceDecisionId;
use crate::ids::TraceId;
use crate::time::Timestamp;

/// A JSON attribute/payload bag. Shallow-merged on update (last write wins
/// per key); deep-merge is explicitly not required.
pub type AttributeMap = BTreeMap<String, Value>;

// ============================================================================
// SECTION: Project
// ============================================================================

/// A tenant. Authentication resolves to exactly one `Project`.
///
/// # Invariants
/// - `api_key_hash` is unique across all projects.
/// - `current_api_key` holds plaintext only so an admin can retrieve it once
///   after rotation; authentication never reads it, only `api_key_hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Opaque project identifier.
    pub id: ProjectId,
    /// Human-readable project name.
    pub name: String,
    /// Hex sha-256 digest of the currently active API key.
    pub api_key_hash: String,
    /// Plaintext of the currently active API key, retrievable once by an
    /// admin after rotation.
    pub current_api_key: Option<String>,
    /// Whether the project accepts any authenticated traffic.
    pub is_active: bool,
    /// Whether the API key has been activated for ingestion.
    pub key_activated: bool,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Trace
// ============================================================================

/// Lifecycle status of a `Trace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    /// At least one span remains open.
    Running,
    /// Completed with no errors.
    Success,
    /// Completed with an error.
    Error,
}

/// A single correlated execution (one agent/LLM request), the root of a
/// span tree.
///
/// # Invariants
/// - `total_spans >= ended_spans >= 0`.
/// - `completion_rate = ended_spans / total_spans` when `total_spans > 0`,
///   else `1.0`.
/// - `has_open_spans` is true iff `total_spans > ended_spans`.
/// - `status` transitions `Running -> {Success, Error}`; `Success` requires
///   `end_time` set and `has_open_spans = false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// Caller-supplied stable trace identifier.
    pub id: TraceId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Optional external correlation id (e.g. from an upstream system).
    pub external_trace_id: Option<String>,
    /// Current lifecycle status.
    pub status: TraceStatus,
    /// When the trace began.
    pub start_time: Timestamp,
    /// When the trace ended, if it has.
    pub end_time: Option<Timestamp>,
    /// Free-form attributes, shallow-merged on update.
    pub attributes: AttributeMap,
    /// Model identifier, if known.
    pub model: Option<String>,
    /// Deployment environment label.
    pub environment: Option<String>,
    /// End-user identifier.
    pub user_id: Option<String>,
    /// Session identifier grouping related traces.
    pub session_id: Option<String>,
    /// Root input text, used for judge context and free-text search.
    pub input_text: Option<String>,
    /// Root output text, used for judge context and free-text search.
    pub output_text: Option<String>,
    /// Whether any span under this trace is still open.
    pub has_open_spans: bool,
    /// Total number of spans recorded for this trace.
    pub total_spans: u32,
    /// Number of spans with an `end_time` set.
    pub ended_spans: u32,
    /// `ended_spans / total_spans`, or `1.0` when `total_spans == 0`.
    pub completion_rate: f64,
    /// Snapshot of the most recent `TraceDecision`, if any.
    pub decision: Option<Value>,
    /// Human-review outcome, set only when explicitly provided.
    pub user_review_passed: Option<bool>,
}

impl Trace {
    /// Recomputes the projection fields (`total_spans`, `ended_spans`,
    /// `has_open_spans`, `completion_rate`, and a `Running -> Success`
    /// promotion when appropriate) from a fresh span count.
    pub fn recalculate_metrics(&mut self, total_spans: u32, ended_spans: u32) {
        self.total_spans = total_spans;
        self.ended_spans = ended_spans;
        self.has_open_spans = total_spans > ended_spans;
        self.completion_rate = if total_spans == 0 {
            1.0
        } else {
            f64::from(ended_spans) / f64::from(total_spans)
        };
        if self.status == TraceStatus::Running
            && self.end_time.is_some()
            && !self.has_open_spans
        {
            self.status = TraceStatus::Success;
        }
    }
}

// ============================================================================
// SECTION: Span
// ============================================================================

/// A bounded unit of work within a trace; may have a parent span.
///
/// # Invariants
/// - `(project_id, idempotency_key)` is unique.
/// - `trace_id` and `project_id` match the parent span's, when a parent is
///   set (advisory only — not enforced acyclic at write time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    /// Caller-supplied stable span identifier.
    pub id: SpanId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Owning trace.
    pub trace_id: TraceId,
    /// Parent span, if any.
    pub parent_span_id: Option<SpanId>,
    /// Human-readable span name.
    pub name: String,
    /// Category of work this span represents (e.g. "llm_call", "tool_call").
    pub span_type: String,
    /// Lifecycle status, mirroring `Trace::status`'s vocabulary.
    pub status: String,
    /// When the span began.
    pub start_time: Timestamp,
    /// When the span ended, if it has.
    pub end_time: Option<Timestamp>,
    /// Error description, if the span ended in error.
    pub error: Option<String>,
    /// Free-form attributes, shallow-merged on amendment.
    pub attributes: AttributeMap,
    /// Caller-supplied idempotency key, unique per project.
    pub idempotency_key: String,
}

// ============================================================================
// SECTION: SpanEvent
// ============================================================================

/// The kind of an immutable `SpanEvent` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanEventType {
    /// Synthesized or explicit span start.
    SpanStarted,
    /// Synthesized or explicit span end.
    SpanEnded,
    /// A free-form log line attached to a span or trace.
    Log,
    /// A generic application event (used for synthetic judge events).
    Event,
    /// A correction to a previously recorded span, applied as a patch.
    Amendment,
}

/// An immutable log record attached to a trace/span; drives the `Span`
/// projection but is never itself rewritten.
///
/// # Invariants
/// - `(project_id, idempotency_key)` is unique.
/// - Rows are append-only: no update path exists for an existing `SpanEvent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanEvent {
    /// Store-generated event identifier.
    pub id: SpanEventId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Owning trace.
    pub trace_id: TraceId,
    /// Referenced span, if any (absent for trace-level events).
    pub span_id: Option<SpanId>,
    /// Event kind.
    pub event_type: SpanEventType,
    /// When the event occurred (drives timeline ordering).
    pub event_time: Timestamp,
    /// Event-specific payload.
    pub payload: Value,
    /// Caller-supplied idempotency key, unique per project.
    pub idempotency_key: String,
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// A scored evaluation of a trace or span, supplied by an external evaluator
/// (not one of the built-in judges).
///
/// # Invariants
/// - At least one of `trace_id`/`span_id` is set.
/// - `(project_id, idempotency_key)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    /// Store-generated evaluation identifier.
    pub id: EvaluationId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Referenced trace, if scored at the trace level.
    pub trace_id: Option<TraceId>,
    /// Referenced span, if scored at the span level.
    pub span_id: Option<SpanId>,
    /// Name of the evaluation (e.g. "faithfulness"); used as a context key
    /// when building decision input.
    pub eval_name: String,
    /// Model or rubric that produced this score.
    pub eval_model: String,
    /// Numeric score in `[0, 1]`.
    pub score: f64,
    /// Whether this evaluation passed its own threshold.
    pub passed: bool,
    /// Evaluator-specific metadata.
    pub metadata: Value,
    /// Human-review outcome, set only when explicitly provided.
    pub user_review_passed: Option<bool>,
    /// Caller-supplied idempotency key, unique per project.
    pub idempotency_key: String,
}

// ============================================================================
// SECTION: Policy / PolicyVersion
// ============================================================================

/// A named, versioned collection of rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Store-generated policy identifier.
    pub id: PolicyId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Human-readable policy name.
    pub name: String,
    /// Optional free-text description.
    pub description: Option<String>,
}

/// One versioned definition of a `Policy`.
///
/// # Invariants
/// - `(policy_id, version)` is unique.
/// - At most one version per policy has `active = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyVersion {
    /// Store-generated version identifier.
    pub id: PolicyVersionId,
    /// Owning policy.
    pub policy_id: PolicyId,
    /// 1-based version number, unique within the policy.
    pub version: u32,
    /// When this version becomes eligible for active-version resolution.
    pub effective_from: Timestamp,
    /// Whether this is the currently active version.
    pub active: bool,
    /// The rule definition, shaped as `{ "rules": [ ... ] }` (see
    /// `tracehub-policy` for the exact rule schema).
    pub definition: Value,
}

// ============================================================================
// SECTION: TraceDecision
// ============================================================================

/// The persisted outcome of one `decide` call.
///
/// # Invariants
/// - `(project_id, idempotency_key)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceDecision {
    /// Store-generated decision identifier.
    pub id: TraceDecisionId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Trace this decision was made for.
    pub trace_id: TraceId,
    /// Final action (possibly overridden by the matching policy rule).
    pub action: String,
    /// Final reason code.
    pub reason_code: String,
    /// Final severity.
    pub severity: String,
    /// Confidence of the judge that produced the underlying signals.
    pub confidence: f64,
    /// Opaque `"{policy_id}:v{version}"` reference to the policy version
    /// that was evaluated.
    pub policy_version: String,
    /// `"heuristic"` if only the heuristic judge ran, otherwise the LLM
    /// judge's configured model name.
    pub judge_model: Option<String>,
    /// Signals produced by the selected judge.
    pub signals: Value,
    /// Selected judge's rationale text.
    pub rationale: Option<String>,
    /// Caller-supplied idempotency key, unique per project.
    pub idempotency_key: String,
}

// ============================================================================
// SECTION: JudgeRun / JudgeCache
// ============================================================================

/// An append-only audit row recording one judge provider invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeRun {
    /// Store-generated run identifier.
    pub id: JudgeRunId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Trace this judge run was made for.
    pub trace_id: TraceId,
    /// Span this judge run was made for, if span-scoped.
    pub span_id: Option<SpanId>,
    /// Provider name (`"heuristic"` or `"llm"`).
    pub provider: String,
    /// Model identifier, for LLM-backed providers.
    pub model: Option<String>,
    /// Action the provider recommended.
    pub action: String,
    /// Reason code the provider recommended.
    pub reason_code: String,
    /// Provider confidence in `[0, 1]`.
    pub confidence: f64,
    /// Full raw provider output.
    pub output: Value,
    /// When this run was recorded.
    pub created_at: Timestamp,
}

/// A content-addressed cache of judge decisions, keyed by `input_hash`.
///
/// # Invariants
/// - `(project_id, input_hash, policy_version)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeCache {
    /// Store-generated cache row identifier.
    pub id: JudgeCacheId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Hex sha-256 digest of the canonicalized decision input.
    pub input_hash: String,
    /// Opaque `"{policy_id}:v{version}"` reference.
    pub policy_version: String,
    /// The cached judge decision (pre-policy-overlay).
    pub decision: Value,
    /// When this cache row was written.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Case / Notification
// ============================================================================

/// Lifecycle status of a `Case`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    /// Newly created, unseen by a human.
    Open,
    /// A human has seen it.
    Acknowledged,
    /// A human has closed it.
    Resolved,
}

/// A human-tracked incident created on an `ESCALATE` decision.
///
/// # Invariants
/// - For a resolved case: `resolved_at >= acknowledged_at >= created_at`.
/// - `acknowledged_at` is set on first acknowledgement only; resolving an
///   unacknowledged case back-fills it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    /// Store-generated case identifier.
    pub id: CaseId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Trace the case was raised against.
    pub trace_id: TraceId,
    /// Reason code copied from the triggering decision.
    pub reason_code: String,
    /// Current lifecycle status.
    pub status: CaseStatus,
    /// Assigned human, if any.
    pub assignee: Option<String>,
    /// When the case was first acknowledged.
    pub acknowledged_at: Option<Timestamp>,
    /// When the case was resolved.
    pub resolved_at: Option<Timestamp>,
    /// When the case was created.
    pub created_at: Timestamp,
}

/// An outbound webhook delivery attempt for a `Case`.
///
/// # Invariants
/// - Terminal: `status` never transitions again after the first write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Store-generated notification identifier.
    pub id: NotificationId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Case this notification was raised for.
    pub case_id: CaseId,
    /// Delivery channel (currently always `"webhook"`).
    pub channel: String,
    /// Destination URL.
    pub target_url: String,
    /// Delivery outcome.
    pub status: NotificationStatus,
    /// The payload that was (or would have been) sent.
    pub payload: Value,
    /// First 500 characters of the response body, or a truncated error
    /// string, recorded regardless of outcome.
    pub response_snippet: Option<String>,
    /// When this notification was created.
    pub created_at: Timestamp,
}

/// Delivery outcome of a `Notification`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Written but not yet attempted.
    Pending,
    /// Delivered with a 2xx response.
    Sent,
    /// Delivery failed (non-2xx response, network error, or timeout).
    Failed,
}
