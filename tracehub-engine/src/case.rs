// crates/tracehub-engine/src/case.rs
// ============================================================================
// Module: Case Service
// Description: Read and lifecycle-transition operations over `Case` rows.
// Purpose: Back `GET /cases`, `GET /cases/{id}`, `POST /cases/{id}/ack`, and
//          `POST /cases/{id}/resolve` (§4.7, §6).
// Dependencies: tracehub_core::{entities, store, time}
// ============================================================================

//! ## Overview
//! Case creation itself lives in `tracehub-broker::CaseEmitter`, invoked
//! only by the decision pipeline on an `ESCALATE` action. `CaseService`
//! covers everything a human operator does afterward: listing, fetching,
//! and the two monotonic lifecycle transitions (acknowledge, resolve). Both
//! transitions are idempotent by construction — the store only ever sets
//! `acknowledged_at`/`resolved_at` the first time, per §4.7.

use std::sync::Arc;

use tracehub_core::TraceHubError;
use tracehub_core::entities::Case;
use tracehub_core::ids::CaseId;
use tracehub_core::ids::ProjectId;
use tracehub_core::store::Store;
use tracehub_core::time::Timestamp;

/// Backs `GET /cases`, `GET /cases/{id}`, `POST /cases/{id}/ack`, and
/// `POST /cases/{id}/resolve`.
pub struct CaseService {
    store: Arc<dyn Store>,
}

impl CaseService {
    /// Builds a case service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Fetches a single case.
    ///
    /// # Errors
    /// Returns [`TraceHubError::NotFound`] if no case with `case_id` exists
    /// within `project_id`.
    pub async fn get(&self, project_id: ProjectId, case_id: CaseId) -> Result<Case, TraceHubError> {
        self.store
            .get_case(project_id, case_id)
            .await?
            .ok_or_else(|| TraceHubError::NotFound(format!("case {case_id}")))
    }

    /// Lists every case recorded for a project.
    ///
    /// # Errors
    /// Propagates any [`TraceHubError`] raised by the store.
    pub async fn list(&self, project_id: ProjectId) -> Result<Vec<Case>, TraceHubError> {
        self.store.list_cases(project_id).await
    }

    /// Acknowledges a case. A second acknowledgement is a no-op that
    /// returns the case unchanged (`acknowledged_at` is set once, per
    /// §4.7).
    ///
    /// # Errors
    /// Returns [`TraceHubError::NotFound`] if no case with `case_id` exists
    /// within `project_id`.
    pub async fn ack(&self, project_id: ProjectId, case_id: CaseId) -> Result<Case, TraceHubError> {
        self.store.ack_case(project_id, case_id, Timestamp::now()).await
    }

    /// Resolves a case, back-filling `acknowledged_at` if the case was
    /// never explicitly acknowledged.
    ///
    /// # Errors
    /// Returns [`TraceHubError::NotFound`] if no case with `case_id` exists
    /// within `project_id`.
    pub async fn resolve(&self, project_id: ProjectId, case_id: CaseId) -> Result<Case, TraceHubError> {
        self.store.resolve_case(project_id, case_id, Timestamp::now()).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "test-only assertions")]

    use std::sync::Arc;

    use tempfile::NamedTempFile;
    use tracehub_core::entities::CaseStatus;
    use tracehub_core::entities::Project;
    use tracehub_core::ids::ProjectId;
    use tracehub_core::ids::TraceId;
    use tracehub_core::store::Store;
    use tracehub_core::time::Timestamp;
    use tracehub_store_sqlite::SqliteStore;
    use tracehub_store_sqlite::SqliteStoreConfig;

    use super::CaseService;

    async fn harness() -> (NamedTempFile, Arc<dyn Store>, ProjectId) {
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
        (file, store, project.id)
    }

    #[tokio::test]
    async fn ack_then_resolve_backfills_acknowledged_at() {
        let (_file, store, project_id) = harness().await;
        let (case, _notification) = store
            .create_case(project_id, TraceId::generate(), "PII_DETECTED".to_string(), None)
            .await
            .unwrap();
        let service = CaseService::new(store);

        let resolved = service.resolve(project_id, case.id).await.unwrap();
        assert_eq!(resolved.status, CaseStatus::Resolved);
        assert!(resolved.acknowledged_at.is_some());
        assert!(resolved.resolved_at.unwrap() >= resolved.acknowledged_at.unwrap());
    }

    #[tokio::test]
    async fn second_ack_is_a_no_op() {
        let (_file, store, project_id) = harness().await;
        let (case, _notification) = store
            .create_case(project_id, TraceId::generate(), "PII_DETECTED".to_string(), None)
            .await
            .unwrap();
        let service = CaseService::new(store);

        let first = service.ack(project_id, case.id).await.unwrap();
        let second = service.ack(project_id, case.id).await.unwrap();
        assert_eq!(first.acknowledged_at, second.acknowledged_at);
    }

    #[tokio::test]
    async fn unknown_case_is_not_found() {
        let (_file, store, project_id) = harness().await;
        let service = CaseService::new(store);
        let err = service.get(project_id, tracehub_core::ids::CaseId::generate()).await.unwrap_err();
        assert!(matches!(err, tracehub_core::TraceHubError::NotFound(_)));
    }
}
