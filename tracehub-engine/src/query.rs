// crates/tracehub-engine/src/query.rs
// ============================================================================
// Module: Query / Read Models
// Description: Paginated trace listing, trace-detail timeline assembly, and
//              status-count statistics.
// Purpose: Back `GET /traces`, `GET /traces/{id}`, and
//          `GET /traces/stats/overview` (§4.8, §6).
// Dependencies: tracehub_core::{entities, store, time}
// ============================================================================

//! ## Overview
//! `QueryService` never mutates state. Trace listing delegates filtering and
//! pagination straight to the store; trace detail additionally assembles a
//! unified timeline from `TRACE_STARTED`, every `SpanEvent` in `event_time`
//! order, and `TRACE_ENDED` if the trace has ended, all sorted stably by
//! timestamp.

use std::sync::Arc;

use serde::Serialize;
use tracehub_core::TraceHubError;
use tracehub_core::entities::Evaluation;
use tracehub_core::entities::JudgeRun;
use tracehub_core::entities::Span;
use tracehub_core::entities::Trace;
use tracehub_core::entities::TraceDecision;
use tracehub_core::ids::ProjectId;
use tracehub_core::ids::TraceId;
use tracehub_core::store::Page;
use tracehub_core::store::Store;
use tracehub_core::store::TraceFilter;
use tracehub_core::time::Timestamp;

/// How many recent judge runs accompany a trace detail view.
const DETAIL_JUDGE_RUN_LIMIT: u32 = 50;

/// One row of a paginated trace listing, per `GET /traces`.
#[derive(Debug, Clone, Serialize)]
pub struct TraceListItem {
    /// The trace row itself.
    pub trace: Trace,
}

/// One entry of a trace's assembled timeline.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimelineEntry {
    /// The trace began.
    TraceStarted {
        /// When the trace began.
        at: Timestamp,
    },
    /// A recorded `SpanEvent`.
    Event {
        /// The underlying event.
        #[serde(flatten)]
        event: Box<tracehub_core::entities::SpanEvent>,
    },
    /// The trace ended.
    TraceEnded {
        /// When the trace ended.
        at: Timestamp,
    },
}

impl TimelineEntry {
    fn timestamp(&self) -> Timestamp {
        match self {
            Self::TraceStarted { at } | Self::TraceEnded { at } => *at,
            Self::Event { event } => event.event_time,
        }
    }
}

/// The full assembled view backing `GET /traces/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct TraceDetail {
    /// The trace row.
    pub trace: Trace,
    /// Every span recorded under the trace.
    pub spans: Vec<Span>,
    /// The unified, stably-sorted timeline.
    pub timeline: Vec<TimelineEntry>,
    /// Evaluations scored against the trace or any of its spans.
    pub evaluations: Vec<Evaluation>,
    /// Every `TraceDecision` recorded for the trace, most recent first.
    pub decision_history: Vec<TraceDecision>,
    /// The most recent judge runs recorded for the trace.
    pub judge_runs: Vec<JudgeRun>,
}

/// Trace counts grouped by status within a trailing window.
#[derive(Debug, Clone, Serialize)]
pub struct StatsOverview {
    /// `(status, count)` pairs, one per status observed.
    pub counts: Vec<(String, u64)>,
}

/// Backs `GET /traces`, `GET /traces/{id}`, and `GET /traces/stats/overview`.
pub struct QueryService {
    store: Arc<dyn Store>,
}

impl QueryService {
    /// Builds a query service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Lists traces matching `filter`, newest-first, per §4.8.
    ///
    /// # Errors
    /// Propagates any [`TraceHubError`] raised by the store.
    pub async fn list_traces(
        &self,
        project_id: ProjectId,
        filter: TraceFilter,
    ) -> Result<Page<TraceListItem>, TraceHubError> {
        let page = self.store.list_traces(project_id, filter).await?;
        Ok(Page {
            items: page.items.into_iter().map(|trace| TraceListItem { trace }).collect(),
            total: page.total,
        })
    }

    /// Assembles the full detail view for one trace.
    ///
    /// # Errors
    /// Returns [`TraceHubError::NotFound`] if the trace does not exist
    /// within `project_id`.
    pub async fn trace_detail(
        &self,
        project_id: ProjectId,
        trace_id: TraceId,
    ) -> Result<TraceDetail, TraceHubError> {
        let trace = self
            .store
            .get_trace(project_id, trace_id)
            .await?
            .ok_or_else(|| TraceHubError::NotFound(format!("trace {trace_id}")))?;

        let spans = self.store.list_spans(project_id, trace_id).await?;
        let events = self.store.list_span_events(project_id, trace_id).await?;
        let evaluations = self.store.list_evaluations_for_trace(project_id, trace_id).await?;
        let decision_history = self.store.list_decisions_for_trace(project_id, trace_id).await?;
        let judge_runs = self
            .store
            .recent_judge_runs(project_id, trace_id, DETAIL_JUDGE_RUN_LIMIT)
            .await?;

        let mut timeline = Vec::with_capacity(events.len() + 2);
        timeline.push(TimelineEntry::TraceStarted { at: trace.start_time });
        timeline.extend(events.into_iter().map(|event| TimelineEntry::Event { event: Box::new(event) }));
        if let Some(end_time) = trace.end_time {
            timeline.push(TimelineEntry::TraceEnded { at: end_time });
        }
        timeline.sort_by_key(TimelineEntry::timestamp);

        Ok(TraceDetail { trace, spans, timeline, evaluations, decision_history, judge_runs })
    }

    /// Returns trace counts by status over the trailing `last_hours` window.
    ///
    /// # Errors
    /// Returns [`TraceHubError::Validation`] if `last_hours` is outside
    /// `[1, 168]`; otherwise propagates store errors.
    pub async fn stats_overview(
        &self,
        project_id: ProjectId,
        last_hours: u32,
    ) -> Result<StatsOverview, TraceHubError> {
        if !(1..=168).contains(&last_hours) {
            return Err(TraceHubError::Validation(format!(
                "last_hours must be in [1, 168], got {last_hours}"
            )));
        }
        let since = Timestamp::new(
            Timestamp::now().as_offset_date_time() - time::Duration::hours(i64::from(last_hours)),
        );
        let counts = self.store.trace_status_counts(project_id, since).await?;
        Ok(StatsOverview { counts })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "test-only assertions")]

    use std::collections::BTreeMap;
    use std::sync::Arc;

    use tempfile::NamedTempFile;
    use tracehub_core::entities::Project;
    use tracehub_core::entities::Span;
    use tracehub_core::entities::Trace;
    use tracehub_core::entities::TraceStatus;
    use tracehub_core::ids::ProjectId;
    use tracehub_core::ids::SpanId;
    use tracehub_core::ids::TraceId;
    use tracehub_core::store::Store;
    use tracehub_core::store::TraceFilter;
    use tracehub_core::time::Timestamp;
    use tracehub_store_sqlite::SqliteStore;
    use tracehub_store_sqlite::SqliteStoreConfig;

    use super::QueryService;

    async fn harness() -> (NamedTempFile, Arc<dyn Store>, ProjectId, TraceId) {
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
                    model: None,
                    environment: None,
                    user_id: None,
                    session_id: None,
                    input_text: Some("hello".to_string()),
                    output_text: None,
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
        (file, store, project.id, trace_id)
    }

    #[tokio::test]
    async fn lists_traces_newest_first() {
        let (_file, store, project_id, _trace_id) = harness().await;
        let service = QueryService::new(store);
        let page = service
            .list_traces(project_id, TraceFilter { page: 1, page_size: 10, ..TraceFilter::default() })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn trace_detail_includes_start_and_end_markers() {
        let (_file, store, project_id, trace_id) = harness().await;
        let service = QueryService::new(store);
        let detail = service.trace_detail(project_id, trace_id).await.unwrap();
        assert!(matches!(detail.timeline.first(), Some(super::TimelineEntry::TraceStarted { .. })));
        assert!(matches!(detail.timeline.last(), Some(super::TimelineEntry::TraceEnded { .. })));
        assert_eq!(detail.spans.len(), 1);
    }

    #[tokio::test]
    async fn trace_detail_rejects_unknown_trace() {
        let (_file, store, project_id, _trace_id) = harness().await;
        let service = QueryService::new(store);
        let err = service.trace_detail(project_id, TraceId::generate()).await.unwrap_err();
        assert!(matches!(err, tracehub_core::TraceHubError::NotFound(_)));
    }

    #[tokio::test]
    async fn stats_overview_rejects_out_of_range_window() {
        let (_file, store, project_id, _trace_id) = harness().await;
        let service = QueryService::new(store);
        let err = service.stats_overview(project_id, 0).await.unwrap_err();
        assert!(matches!(err, tracehub_core::TraceHubError::Validation(_)));
        let err = service.stats_overview(project_id, 200).await.unwrap_err();
        assert!(matches!(err, tracehub_core::TraceHubError::Validation(_)));
    }

    #[tokio::test]
    async fn stats_overview_counts_by_status() {
        let (_file, store, project_id, _trace_id) = harness().await;
        let service = QueryService::new(store);
        let overview = service.stats_overview(project_id, 24).await.unwrap();
        assert!(overview.counts.iter().any(|(status, count)| status == "success" && *count == 1));
    }
}
