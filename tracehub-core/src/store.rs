// crates/tracehub-core/src/store.rs
// ============================================================================
// Module: TraceHub Store Trait
// Description: The persistence seam every engine component depends on.
// Purpose: Let `tracehub-engine` be written once against a trait object and
//          tested against an in-memory or file-backed SQLite implementation
//          interchangeably.
// Dependencies: async-trait, serde_json, tracehub_core::{entities, error, ids}
// ============================================================================

//! ## Overview
//! `Store` is the single persistence seam. Every method is scoped by
//! `ProjectId` explicitly; there is no ambient tenant context. All mutating
//! methods that touch more than one row commit atomically, mapping
//! unique-constraint violations to `TraceHubError::Conflict`.

use async_trait::async_trait;
use serde_json::Value;

use crate::entities::Case;
use crate::entities::Evaluation;
use crate::entities::JudgeCache;
use crate::entities::JudgeRun;
use crate::entities::Notification;
use crate::entities::Policy;
use crate::entities::PolicyVersion;
use crate::entities::Project;
use crate::entities::Span;
use crate::entities::SpanEvent;
use crate::entities::Trace;
use crate::entities::TraceDecision;
use crate::error::TraceHubError;
use crate::ids::CaseId;
use crate::ids::JudgeCacheId;
use crate::ids::PolicyId;
use crate::ids::ProjectId;
use crate::ids::SpanId;
use crate::ids::TraceId;
use crate::time::Timestamp;

/// A page of results plus whatever is needed to request the next one.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// The items in this page, in the store's natural order.
    pub items: Vec<T>,
    /// Total number of items matching the query, ignoring pagination.
    pub total: u64,
}

/// Filters accepted by [`Store::list_traces`].
#[derive(Debug, Clone, Default)]
pub struct TraceFilter {
    /// Only traces with `start_time >= start_after`.
    pub start_after: Option<Timestamp>,
    /// Only traces with `start_time <= start_before`.
    pub start_before: Option<Timestamp>,
    /// Only traces with this status.
    pub status: Option<String>,
    /// Only traces with this model.
    pub model: Option<String>,
    /// Only traces with this environment.
    pub environment: Option<String>,
    /// Only traces with this user id.
    pub user_id: Option<String>,
    /// Only traces with this session id.
    pub session_id: Option<String>,
    /// Only traces whose attributes contain this key.
    pub tag: Option<String>,
    /// Case-insensitive substring match over input/output text and
    /// indexed span-event payloads.
    pub search: Option<String>,
    /// 1-based page number.
    pub page: u32,
    /// Page size, in `[1, 100]`.
    pub page_size: u32,
}

/// The persistence seam implemented by `tracehub-store-sqlite`.
///
/// All methods scope their effect to the given `ProjectId`; callers are
/// responsible for having already authorized access to that project.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetches a project by id, admin path only.
    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>, TraceHubError>;

    /// Fetches a project by the hex sha-256 of its API key, requiring
    /// `is_active = true`.
    async fn get_active_project_by_key_hash(
        &self,
        api_key_hash: &str,
    ) -> Result<Option<Project>, TraceHubError>;

    /// Creates a new project.
    async fn create_project(&self, project: Project) -> Result<Project, TraceHubError>;

    /// Persists a rotated/activated/deactivated project record.
    async fn update_project(&self, project: Project) -> Result<Project, TraceHubError>;

    /// Lists every project, admin path only, oldest first.
    async fn list_projects(&self) -> Result<Vec<Project>, TraceHubError>;

    /// Deletes a project and all of its data. Admin path only.
    async fn delete_project(&self, id: ProjectId) -> Result<(), TraceHubError>;

    /// Applies a trace batch (trace upsert-or-merge plus span inserts) and
    /// the derived `SpanEvent`s atomically, per §4.3.
    async fn ingest_trace_batch(
        &self,
        project_id: ProjectId,
        trace: Trace,
        spans: Vec<Span>,
        allow_missing_parent: bool,
    ) -> Result<Trace, TraceHubError>;

    /// Applies a span-event batch atomically, per §4.3, returning the
    /// primary trace's recalculated projection together with the number of
    /// events actually applied (excluding any skipped as already-present by
    /// idempotency key).
    async fn ingest_span_events(
        &self,
        project_id: ProjectId,
        events: Vec<SpanEvent>,
        allow_missing_parent: bool,
    ) -> Result<(Trace, u32), TraceHubError>;

    /// Fetches a trace by id within a project.
    async fn get_trace(
        &self,
        project_id: ProjectId,
        trace_id: TraceId,
    ) -> Result<Option<Trace>, TraceHubError>;

    /// Lists spans for a trace, ordered by `start_time`.
    async fn list_spans(
        &self,
        project_id: ProjectId,
        trace_id: TraceId,
    ) -> Result<Vec<Span>, TraceHubError>;

    /// Lists span events for a trace, ordered by `event_time`.
    async fn list_span_events(
        &self,
        project_id: ProjectId,
        trace_id: TraceId,
    ) -> Result<Vec<SpanEvent>, TraceHubError>;

    /// Lists evaluations for a trace (trace-scoped and span-scoped).
    async fn list_evaluations_for_trace(
        &self,
        project_id: ProjectId,
        trace_id: TraceId,
    ) -> Result<Vec<Evaluation>, TraceHubError>;

    /// Inserts an evaluation, enforcing idempotency-key uniqueness.
    async fn create_evaluation(&self, evaluation: Evaluation) -> Result<Evaluation, TraceHubError>;

    /// Lists traces matching `filter`, newest-first.
    async fn list_traces(
        &self,
        project_id: ProjectId,
        filter: TraceFilter,
    ) -> Result<Page<Trace>, TraceHubError>;

    /// Returns trace counts grouped by status since `since`.
    async fn trace_status_counts(
        &self,
        project_id: ProjectId,
        since: Timestamp,
    ) -> Result<Vec<(String, u64)>, TraceHubError>;

    /// Looks up an existing decision by idempotency key.
    async fn get_decision_by_idempotency_key(
        &self,
        project_id: ProjectId,
        idempotency_key: &str,
    ) -> Result<Option<TraceDecision>, TraceHubError>;

    /// Lists every `TraceDecision` recorded for a trace, most recent first.
    async fn list_decisions_for_trace(
        &self,
        project_id: ProjectId,
        trace_id: TraceId,
    ) -> Result<Vec<TraceDecision>, TraceHubError>;

    /// Resolves the active `PolicyVersion` for a policy reference, per
    /// §4.6 step 3.
    async fn resolve_active_policy_version(
        &self,
        project_id: ProjectId,
        policy_id: Option<PolicyId>,
        version: Option<u32>,
        now: Timestamp,
    ) -> Result<Option<(Policy, PolicyVersion)>, TraceHubError>;

    /// Looks up a cached judge decision.
    async fn get_judge_cache(
        &self,
        project_id: ProjectId,
        input_hash: &str,
        policy_version: &str,
    ) -> Result<Option<JudgeCache>, TraceHubError>;

    /// Inserts a judge-cache row, tolerating a losing race on the unique
    /// key (the winner's row is returned instead of erroring).
    async fn put_judge_cache(&self, cache: JudgeCache) -> Result<JudgeCache, TraceHubError>;

    /// Persists the full outcome of a `decide` call atomically: the
    /// `JudgeRun`s, the synthetic judge span/event, the `TraceDecision`,
    /// and the `Trace.decision` snapshot update.
    #[allow(clippy::too_many_arguments, reason = "mirrors one atomic transaction")]
    async fn persist_decision(
        &self,
        project_id: ProjectId,
        trace_id: TraceId,
        judge_runs: Vec<JudgeRun>,
        judge_span: Span,
        judge_event: SpanEvent,
        decision: TraceDecision,
    ) -> Result<TraceDecision, TraceHubError>;

    /// Returns the most recent `JudgeRun`s for a trace, newest first.
    async fn recent_judge_runs(
        &self,
        project_id: ProjectId,
        trace_id: TraceId,
        limit: u32,
    ) -> Result<Vec<JudgeRun>, TraceHubError>;

    /// Creates a policy and its first version.
    async fn create_policy(
        &self,
        policy: Policy,
        version: PolicyVersion,
    ) -> Result<(Policy, PolicyVersion), TraceHubError>;

    /// Lists policies for a project.
    async fn list_policies(&self, project_id: ProjectId) -> Result<Vec<Policy>, TraceHubError>;

    /// Lists versions of a policy, ordered by version ascending.
    async fn list_policy_versions(
        &self,
        project_id: ProjectId,
        policy_id: PolicyId,
    ) -> Result<Vec<PolicyVersion>, TraceHubError>;

    /// Marks exactly one version of a policy active, deactivating the rest.
    async fn activate_policy_version(
        &self,
        project_id: ProjectId,
        policy_id: PolicyId,
        version: u32,
    ) -> Result<PolicyVersion, TraceHubError>;

    /// Creates a case and its pending notification row atomically, per
    /// §4.7. Returns the created case and, if a webhook target was
    /// configured, the pending notification awaiting delivery.
    async fn create_case(
        &self,
        project_id: ProjectId,
        trace_id: TraceId,
        reason_code: String,
        notification_target: Option<(String, Value)>,
    ) -> Result<(Case, Option<Notification>), TraceHubError>;

    /// Records the terminal delivery outcome for a pending notification.
    async fn record_notification_outcome(
        &self,
        notification_id: crate::ids::NotificationId,
        status: crate::entities::NotificationStatus,
        response_snippet: Option<String>,
    ) -> Result<Notification, TraceHubError>;

    /// Fetches a case by id.
    async fn get_case(&self, project_id: ProjectId, case_id: CaseId) -> Result<Option<Case>, TraceHubError>;

    /// Lists cases for a project.
    async fn list_cases(&self, project_id: ProjectId) -> Result<Vec<Case>, TraceHubError>;

    /// Acknowledges a case (first ack only sets `acknowledged_at`).
    async fn ack_case(&self, project_id: ProjectId, case_id: CaseId, now: Timestamp) -> Result<Case, TraceHubError>;

    /// Resolves a case, back-filling `acknowledged_at` if unset.
    async fn resolve_case(&self, project_id: ProjectId, case_id: CaseId, now: Timestamp) -> Result<Case, TraceHubError>;

    /// Looks up a judge-cache row by its store-generated id (used by the
    /// emitter/test harness, not the decision hot path).
    async fn get_judge_cache_by_id(
        &self,
        id: JudgeCacheId,
    ) -> Result<Option<JudgeCache>, TraceHubError>;

    /// Looks up a span by id within a project.
    async fn get_span(&self, project_id: ProjectId, span_id: SpanId) -> Result<Option<Span>, TraceHubError>;
}
