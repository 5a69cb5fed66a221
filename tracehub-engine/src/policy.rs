// crates/tracehub-engine/src/policy.rs
// ============================================================================
// Module: Policy Service
// Description: Creates policies (with their first version), lists policies
//              and versions, and activates a specific version.
// Purpose: Back `POST /policies`, `GET /policies`,
//          `GET /policies/{id}/versions`, and
//          `POST /policies/{id}/activate?version=N` (§4.4, §6).
// Dependencies: tracehub_core::{entities, store, time}
// ============================================================================

//! ## Overview
//! A policy is created together with its version `1`, active by default so
//! a freshly-created policy is immediately eligible for
//! `resolve_active_policy_version` — the "at most one active version"
//! invariant holds trivially for a single-version policy. Subsequent
//! version activation is a store-level atomic swap (§4.4 rule resolution
//! itself lives in `tracehub-policy`; this service only manages the
//! version rows it evaluates against).

use std::sync::Arc;

use serde_json::Value;
use tracehub_core::TraceHubError;
use tracehub_core::entities::Policy;
use tracehub_core::entities::PolicyVersion;
use tracehub_core::ids::PolicyId;
use tracehub_core::ids::PolicyVersionId;
use tracehub_core::ids::ProjectId;
use tracehub_core::store::Store;
use tracehub_core::time::Timestamp;

/// Caller-supplied fields of a new `Policy`, per §6.
#[derive(Debug, Clone)]
pub struct PolicyCreate {
    /// Human-readable policy name.
    pub name: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// The rule definition for the policy's first version, shaped as
    /// `{ "rules": [ ... ] }` (see `tracehub-policy`).
    pub definition: Value,
    /// When the first version becomes eligible for active-version
    /// resolution. Defaults to now.
    pub effective_from: Option<Timestamp>,
}

/// Backs `POST /policies`, `GET /policies`, `GET /policies/{id}/versions`,
/// and `POST /policies/{id}/activate?version=N`.
pub struct PolicyService {
    store: Arc<dyn Store>,
}

impl PolicyService {
    /// Builds a policy service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Creates a new policy together with its first (active) version.
    ///
    /// # Errors
    /// Propagates any [`TraceHubError`] raised by the store.
    pub async fn create(
        &self,
        project_id: ProjectId,
        create: PolicyCreate,
    ) -> Result<(Policy, PolicyVersion), TraceHubError> {
        let policy_id = PolicyId::generate();
        let policy = Policy {
            id: policy_id,
            project_id,
            name: create.name,
            description: create.description,
        };
        let version = PolicyVersion {
            id: PolicyVersionId::generate(),
            policy_id,
            version: 1,
            effective_from: create.effective_from.unwrap_or_else(Timestamp::now),
            active: true,
            definition: create.definition,
        };
        self.store.create_policy(policy, version).await
    }

    /// Lists every policy in a project.
    ///
    /// # Errors
    /// Propagates any [`TraceHubError`] raised by the store.
    pub async fn list(&self, project_id: ProjectId) -> Result<Vec<Policy>, TraceHubError> {
        self.store.list_policies(project_id).await
    }

    /// Lists the versions of one policy, ascending by version number.
    ///
    /// # Errors
    /// Returns [`TraceHubError::NotFound`] if `policy_id` does not exist
    /// within `project_id`.
    pub async fn list_versions(
        &self,
        project_id: ProjectId,
        policy_id: PolicyId,
    ) -> Result<Vec<PolicyVersion>, TraceHubError> {
        self.store.list_policy_versions(project_id, policy_id).await
    }

    /// Activates `version` of `policy_id`, deactivating every other
    /// version of that policy atomically.
    ///
    /// # Errors
    /// Returns [`TraceHubError::NotFound`] if `policy_id` or `version` does
    /// not exist within `project_id`.
    pub async fn activate(
        &self,
        project_id: ProjectId,
        policy_id: PolicyId,
        version: u32,
    ) -> Result<PolicyVersion, TraceHubError> {
        self.store.activate_policy_version(project_id, policy_id, version).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "test-only assertions")]

    use std::sync::Arc;

    use serde_json::json;
    use tempfile::NamedTempFile;
    use tracehub_core::entities::Project;
    use tracehub_core::ids::ProjectId;
    use tracehub_core::store::Store;
    use tracehub_core::time::Timestamp;
    use tracehub_store_sqlite::SqliteStore;
    use tracehub_store_sqlite::SqliteStoreConfig;

    use super::PolicyCreate;
    use super::PolicyService;

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
    async fn create_installs_an_active_first_version() {
        let (_file, store, project_id) = harness().await;
        let service = PolicyService::new(store);
        let (policy, version) = service
            .create(
                project_id,
                PolicyCreate {
                    name: "default".to_string(),
                    description: None,
                    definition: json!({"rules": []}),
                    effective_from: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(version.policy_id, policy.id);
        assert_eq!(version.version, 1);
        assert!(version.active);
    }

    #[tokio::test]
    async fn list_versions_rejects_unknown_policy() {
        let (_file, store, project_id) = harness().await;
        let service = PolicyService::new(store);
        let err = service
            .list_versions(project_id, tracehub_core::ids::PolicyId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, tracehub_core::TraceHubError::NotFound(_)));
    }
}
