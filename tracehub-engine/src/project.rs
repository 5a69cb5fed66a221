// crates/tracehub-engine/src/project.rs
// ============================================================================
// Module: Project Service
// Description: Admin-only project lifecycle: creation, listing, key
//              rotation, activation/deactivation, deletion, and one-time
//              plaintext key retrieval.
// Purpose: Back `POST /projects`, `GET /projects`,
//          `POST /projects/{id}/rotate-key`,
//          `POST /projects/{id}/activate` / `/deactivate`,
//          `DELETE /projects/{id}`, and `GET /projects/{id}/current-key`
//          (§6).
// Dependencies: tracehub_core::{entities, hashing, ids, store}, uuid
// ============================================================================

//! ## Overview
//! Every operation here is admin-scoped; enforcing that the caller
//! presented an admin credential is [`crate::AuthResolver::require_admin`]'s
//! job, performed before any `ProjectService` method is invoked. A freshly
//! created project starts with `key_activated = false` — it is only
//! provisioned for ingestion once an admin rotates its key for the first
//! time, handing the generated plaintext to the tenant. `current_api_key`
//! holds that plaintext until the next rotation or an explicit read via
//! [`ProjectService::current_key`]; it is never consulted for
//! authentication, which always hashes the inbound key and matches against
//! `api_key_hash`.

use std::sync::Arc;

use tracehub_core::TraceHubError;
use tracehub_core::entities::Project;
use tracehub_core::hashing::hex_sha256;
use tracehub_core::ids::ProjectId;
use tracehub_core::store::Store;
use tracehub_core::time::Timestamp;
use uuid::Uuid;

/// Backs the admin-only `/projects` surface.
pub struct ProjectService {
    store: Arc<dyn Store>,
}

impl ProjectService {
    /// Builds a project service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Creates a new project with a freshly generated API key. The key is
    /// not yet activated for ingestion; an admin must rotate it at least
    /// once (§4.2) to provision it.
    ///
    /// # Errors
    /// Propagates any [`TraceHubError`] raised by the store, including a
    /// [`TraceHubError::Conflict`] on the vanishingly unlikely event of an
    /// `api_key_hash` collision.
    pub async fn create(&self, name: String) -> Result<Project, TraceHubError> {
        let api_key = generate_api_key();
        let project = Project {
            id: ProjectId::generate(),
            name,
            api_key_hash: hex_sha256(api_key.as_bytes()),
            current_api_key: Some(api_key),
            is_active: true,
            key_activated: false,
            created_at: Timestamp::now(),
        };
        self.store.create_project(project).await
    }

    /// Fetches a project by id.
    ///
    /// # Errors
    /// Returns [`TraceHubError::NotFound`] if `project_id` does not exist.
    pub async fn get(&self, project_id: ProjectId) -> Result<Project, TraceHubError> {
        self.store
            .get_project(project_id)
            .await?
            .ok_or_else(|| TraceHubError::NotFound(format!("project {project_id}")))
    }

    /// Lists every project, oldest first.
    ///
    /// # Errors
    /// Propagates any [`TraceHubError`] raised by the store.
    pub async fn list(&self) -> Result<Vec<Project>, TraceHubError> {
        self.store.list_projects().await
    }

    /// Rotates `project_id`'s API key, generating a fresh plaintext and
    /// marking the key activated for ingestion.
    ///
    /// # Errors
    /// Returns [`TraceHubError::NotFound`] if `project_id` does not exist.
    pub async fn rotate_key(&self, project_id: ProjectId) -> Result<Project, TraceHubError> {
        let mut project = self.get(project_id).await?;
        let api_key = generate_api_key();
        project.api_key_hash = hex_sha256(api_key.as_bytes());
        project.current_api_key = Some(api_key);
        project.key_activated = true;
        self.store.update_project(project).await
    }

    /// Marks `project_id` active, allowing authenticated traffic.
    ///
    /// # Errors
    /// Returns [`TraceHubError::NotFound`] if `project_id` does not exist.
    pub async fn activate(&self, project_id: ProjectId) -> Result<Project, TraceHubError> {
        let mut project = self.get(project_id).await?;
        project.is_active = true;
        self.store.update_project(project).await
    }

    /// Marks `project_id` inactive, rejecting any further authentication.
    ///
    /// # Errors
    /// Returns [`TraceHubError::NotFound`] if `project_id` does not exist.
    pub async fn deactivate(&self, project_id: ProjectId) -> Result<Project, TraceHubError> {
        let mut project = self.get(project_id).await?;
        project.is_active = false;
        self.store.update_project(project).await
    }

    /// Permanently deletes a project and all of its data.
    ///
    /// # Errors
    /// Returns [`TraceHubError::NotFound`] if `project_id` does not exist.
    pub async fn delete(&self, project_id: ProjectId) -> Result<(), TraceHubError> {
        self.get(project_id).await?;
        self.store.delete_project(project_id).await
    }

    /// Returns the current plaintext API key, if one is on file (set at
    /// creation or the most recent rotation, and never cleared).
    ///
    /// # Errors
    /// Returns [`TraceHubError::NotFound`] if `project_id` does not exist.
    pub async fn current_key(&self, project_id: ProjectId) -> Result<Option<String>, TraceHubError> {
        Ok(self.get(project_id).await?.current_api_key)
    }
}

fn generate_api_key() -> String {
    format!("sk-{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "test-only assertions")]

    use std::sync::Arc;

    use tempfile::NamedTempFile;
    use tracehub_core::ids::ProjectId;
    use tracehub_core::store::Store;
    use tracehub_store_sqlite::SqliteStore;
    use tracehub_store_sqlite::SqliteStoreConfig;

    use super::ProjectService;

    async fn service() -> (NamedTempFile, ProjectService) {
        let file = NamedTempFile::new().expect("temp file");
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&SqliteStoreConfig::new(file.path())).unwrap());
        (file, ProjectService::new(store))
    }

    #[tokio::test]
    async fn create_starts_unactivated_but_active() {
        let (_file, service) = service().await;
        let project = service.create("acme".to_string()).await.unwrap();
        assert!(project.is_active);
        assert!(!project.key_activated);
        assert!(project.current_api_key.is_some());
    }

    #[tokio::test]
    async fn rotate_key_activates_and_changes_the_hash() {
        let (_file, service) = service().await;
        let project = service.create("acme".to_string()).await.unwrap();
        let rotated = service.rotate_key(project.id).await.unwrap();
        assert!(rotated.key_activated);
        assert_ne!(rotated.api_key_hash, project.api_key_hash);
    }

    #[tokio::test]
    async fn deactivate_then_activate_round_trips() {
        let (_file, service) = service().await;
        let project = service.create("acme".to_string()).await.unwrap();
        let deactivated = service.deactivate(project.id).await.unwrap();
        assert!(!deactivated.is_active);
        let reactivated = service.activate(project.id).await.unwrap();
        assert!(reactivated.is_active);
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let (_file, service) = service().await;
        let project = service.create("acme".to_string()).await.unwrap();
        service.delete(project.id).await.unwrap();
        let err = service.get(project.id).await.unwrap_err();
        assert!(matches!(err, tracehub_core::TraceHubError::NotFound(_)));
    }

    #[tokio::test]
    async fn get_unknown_project_is_not_found() {
        let (_file, service) = service().await;
        let err = service.get(ProjectId::generate()).await.unwrap_err();
        assert!(matches!(err, tracehub_core::TraceHubError::NotFound(_)));
    }
}
