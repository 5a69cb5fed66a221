// crates/tracehub-engine/src/ingest.rs
// ============================================================================
// Module: Ingest Service
// Description: Wraps the trace-batch and span-event-batch entry points with
//              idempotency-key validation ahead of the store's own
//              idempotency-skip behavior.
// Purpose: Back `POST /ingest/traces` and `POST /ingest/spans` (§6).
// Dependencies: tracehub_core::{entities, store}
// ============================================================================

//! ## Overview
//! `IngestService` does not itself implement the merge/projection logic —
//! that lives in the store, per §4.3 — it only validates shape (idempotency
//! key length, non-empty event batch) before delegating.

use std::sync::Arc;

use tracehub_core::TraceHubError;
use tracehub_core::entities::Span;
use tracehub_core::entities::SpanEvent;
use tracehub_core::entities::Trace;
use tracehub_core::ids::ProjectId;
use tracehub_core::ids::TraceId;
use tracehub_core::store::Store;

use crate::validate_idempotency_key;

/// A trace upsert plus its span upserts, per §4.3.A.
#[derive(Debug, Clone)]
pub struct TraceBatch {
    /// The trace to insert or merge.
    pub trace: Trace,
    /// Spans to insert, skipping any already present by idempotency key.
    pub spans: Vec<Span>,
    /// Whether a span may reference a parent span id this batch cannot
    /// resolve.
    pub allow_missing_parent: bool,
}

/// A batch of span events, per §4.3.B.
#[derive(Debug, Clone)]
pub struct EventBatch {
    /// Events to apply in request order.
    pub events: Vec<SpanEvent>,
    /// Whether a `SPAN_STARTED` event may reference a parent span id this
    /// batch cannot resolve.
    pub allow_missing_parent: bool,
}

/// Backs `POST /ingest/traces` and `POST /ingest/spans`.
pub struct IngestService {
    store: Arc<dyn Store>,
}

impl IngestService {
    /// Builds an ingest service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Applies a trace batch, returning the resulting trace id and the
    /// number of spans this call attempted to ingest (not the trace's
    /// cumulative span count across every batch it has ever received).
    ///
    /// # Errors
    /// Returns [`TraceHubError::Validation`] if any span's idempotency key
    /// is out of bounds or references an unresolvable parent while
    /// `allow_missing_parent` is false; [`TraceHubError::Conflict`] on a
    /// racing unique-constraint violation.
    pub async fn ingest_traces(
        &self,
        project_id: ProjectId,
        batch: TraceBatch,
    ) -> Result<(TraceId, u32), TraceHubError> {
        for span in &batch.spans {
            validate_idempotency_key(&span.idempotency_key)?;
        }
        let attempted = u32::try_from(batch.spans.len()).unwrap_or(u32::MAX);
        let trace_id = batch.trace.id;
        let trace = self
            .store
            .ingest_trace_batch(project_id, batch.trace, batch.spans, batch.allow_missing_parent)
            .await?;
        tracing::debug!(
            project_id = %project_id,
            trace_id = %trace_id,
            spans_attempted = attempted,
            "ingested trace batch"
        );
        Ok((trace.id, attempted))
    }

    /// Applies a span-event batch, returning the number of events actually
    /// applied (excluding any skipped as already-present by idempotency
    /// key).
    ///
    /// # Errors
    /// Returns [`TraceHubError::Validation`] if the batch is empty, if any
    /// event's idempotency key is out of bounds, or if a `SPAN_STARTED`
    /// event references an unresolvable parent while `allow_missing_parent`
    /// is false.
    pub async fn ingest_events(
        &self,
        project_id: ProjectId,
        batch: EventBatch,
    ) -> Result<u32, TraceHubError> {
        if batch.events.is_empty() {
            return Err(TraceHubError::Validation("empty span event batch".to_string()));
        }
        for event in &batch.events {
            validate_idempotency_key(&event.idempotency_key)?;
        }
        let attempted = batch.events.len();
        let (_trace, applied) =
            self.store.ingest_span_events(project_id, batch.events, batch.allow_missing_parent).await?;
        tracing::debug!(
            project_id = %project_id,
            events_attempted = attempted,
            events_applied = applied,
            "ingested span event batch"
        );
        Ok(applied)
    }
}
