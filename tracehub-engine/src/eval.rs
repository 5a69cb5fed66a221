// crates/tracehub-engine/src/eval.rs
// ============================================================================
// Module: Eval Service
// Description: Validates and persists externally-supplied evaluation rows.
// Purpose: Back `POST /evals` (§6).
// Dependencies: tracehub_core::{entities, store}
// ============================================================================

//! ## Overview
//! An `Evaluation` must reference at least one of `trace_id`/`span_id`;
//! beyond that single shape rule, persistence is a straight insert relying
//! on the store's `(project_id, idempotency_key)` uniqueness for conflict
//! detection.

use std::sync::Arc;

use serde_json::Value;
use tracehub_core::TraceHubError;
use tracehub_core::entities::Evaluation;
use tracehub_core::ids::EvaluationId;
use tracehub_core::ids::ProjectId;
use tracehub_core::ids::SpanId;
use tracehub_core::ids::TraceId;
use tracehub_core::store::Store;

use crate::validate_idempotency_key;

/// Caller-supplied fields of a new `Evaluation`, per §6.
#[derive(Debug, Clone)]
pub struct EvalCreate {
    /// Referenced trace, if scored at the trace level.
    pub trace_id: Option<TraceId>,
    /// Referenced span, if scored at the span level.
    pub span_id: Option<SpanId>,
    /// Name of the evaluation (e.g. `"faithfulness"`).
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

/// Backs `POST /evals`.
pub struct EvalService {
    store: Arc<dyn Store>,
}

impl EvalService {
    /// Builds an eval service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Persists a new evaluation.
    ///
    /// # Errors
    /// Returns [`TraceHubError::Validation`] if neither `trace_id` nor
    /// `span_id` is set, or if the idempotency key is out of bounds;
    /// [`TraceHubError::Conflict`] on a duplicate idempotency key.
    pub async fn create(
        &self,
        project_id: ProjectId,
        create: EvalCreate,
    ) -> Result<Evaluation, TraceHubError> {
        if create.trace_id.is_none() && create.span_id.is_none() {
            return Err(TraceHubError::Validation(
                "evaluation must reference a trace_id or span_id".to_string(),
            ));
        }
        validate_idempotency_key(&create.idempotency_key)?;

        let evaluation = Evaluation {
            id: EvaluationId::generate(),
            project_id,
            trace_id: create.trace_id,
            span_id: create.span_id,
            eval_name: create.eval_name,
            eval_model: create.eval_model,
            score: create.score,
            passed: create.passed,
            metadata: create.metadata,
            user_review_passed: create.user_review_passed,
            idempotency_key: create.idempotency_key,
        };
        self.store.create_evaluation(evaluation).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "test-only assertions")]

    use std::sync::Arc;

    use tempfile::NamedTempFile;
    use tracehub_core::TraceHubError;
    use tracehub_core::entities::Project;
    use tracehub_core::ids::ProjectId;
    use tracehub_core::ids::TraceId;
    use tracehub_core::store::Store;
    use tracehub_core::time::Timestamp;
    use tracehub_store_sqlite::SqliteStore;
    use tracehub_store_sqlite::SqliteStoreConfig;

    use super::EvalCreate;
    use super::EvalService;

    async fn store_with_project() -> (NamedTempFile, Arc<dyn Store>, ProjectId) {
        let file = NamedTempFile::new().expect("temp file");
        let config = SqliteStoreConfig::new(file.path());
        let store = SqliteStore::open(&config).expect("open store");
        let store: Arc<dyn Store> = Arc::new(store);
        let project = Project {
            id: ProjectId::generate(),
            name: "acme".to_string(),
            api_key_hash: "hash".to_string(),
            current_api_key: None,
            is_active: true,
            key_activated: true,
            created_at: Timestamp::now(),
        };
        let project = store.create_project(project).await.unwrap();
        (file, store, project.id)
    }

    fn eval_create(trace_id: Option<TraceId>, idempotency_key: &str) -> EvalCreate {
        EvalCreate {
            trace_id,
            span_id: None,
            eval_name: "faithfulness".to_string(),
            eval_model: "rubric-v1".to_string(),
            score: 0.9,
            passed: true,
            metadata: serde_json::json!({}),
            user_review_passed: None,
            idempotency_key: idempotency_key.to_string(),
        }
    }

    #[tokio::test]
    async fn rejects_evaluation_with_neither_target() {
        let (_file, store, project_id) = store_with_project().await;
        let service = EvalService::new(store);
        let err = service
            .create(project_id, eval_create(None, "eval-key-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, TraceHubError::Validation(_)));
    }

    #[tokio::test]
    async fn persists_trace_scoped_evaluation() {
        let (_file, store, project_id) = store_with_project().await;
        let service = EvalService::new(store);
        let trace_id = TraceId::generate();
        let evaluation = service
            .create(project_id, eval_create(Some(trace_id), "eval-key-2"))
            .await
            .unwrap();
        assert_eq!(evaluation.trace_id, Some(trace_id));
    }

    #[tokio::test]
    async fn rejects_duplicate_idempotency_key() {
        let (_file, store, project_id) = store_with_project().await;
        let service = EvalService::new(store);
        let trace_id = TraceId::generate();
        service
            .create(project_id, eval_create(Some(trace_id), "eval-key-3"))
            .await
            .unwrap();
        let err = service
            .create(project_id, eval_create(Some(trace_id), "eval-key-3"))
            .await
            .unwrap_err();
        assert!(matches!(err, TraceHubError::Conflict(_)));
    }
}
