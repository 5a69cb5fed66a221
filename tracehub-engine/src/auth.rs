// crates/tracehub-engine/src/auth.rs
// ============================================================================
// Module: Auth Resolver
// Description: Maps an inbound `x-api-key` (plus optional `x-project-id`)
//              to a `Project`, enforcing admin override and activation
//              rules.
// Purpose: Back the credential-resolution step every other engine service
//          performs before touching project-scoped data (§4.2).
// Dependencies: tracehub_core::{hashing, store}, tracehub_config
// ============================================================================

//! ## Overview
//! [`AuthResolver`] is a plain struct holding a store handle and a config
//! snapshot, with no internal mutable state — matching the "no process-wide
//! mutable singleton" design note. Resolution order: an admin credential
//! with an explicit project override looks that project up directly;
//! otherwise the key is hashed and matched against `Project.api_key_hash`.

use std::sync::Arc;

use tracehub_config::TraceHubConfig;
use tracehub_core::TraceHubError;
use tracehub_core::entities::Project;
use tracehub_core::hashing::hex_sha256;
use tracehub_core::ids::ProjectId;
use tracehub_core::store::Store;

/// Resolves inbound credentials to a `Project`, per §4.2.
pub struct AuthResolver {
    store: Arc<dyn Store>,
    config: Arc<TraceHubConfig>,
}

impl AuthResolver {
    /// Builds a resolver over `store`, using `config` for the admin seed
    /// and dev-mode shortcut.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: Arc<TraceHubConfig>) -> Self {
        Self { store, config }
    }

    /// Resolves `api_key` (and, if supplied, `project_id_header`) to a
    /// `Project`.
    ///
    /// # Errors
    /// Returns [`TraceHubError::Auth`] for a missing/invalid key, an
    /// inactive project, or a project-scope mismatch; [`TraceHubError::
    /// Validation`] for a malformed `x-project-id` on the admin path;
    /// [`TraceHubError::NotFound`] if an admin-overridden project id does
    /// not exist.
    pub async fn resolve(
        &self,
        api_key: &str,
        project_id_header: Option<&str>,
    ) -> Result<Project, TraceHubError> {
        if api_key.is_empty() {
            return Err(TraceHubError::Auth("missing api key".to_string()));
        }

        if let Some(header) = project_id_header
            && self.config.is_admin_key(api_key)
        {
            let project_id: ProjectId = header
                .parse()
                .map_err(|_err| TraceHubError::Validation("invalid x-project-id".to_string()))?;
            let project = self
                .store
                .get_project(project_id)
                .await?
                .ok_or_else(|| TraceHubError::NotFound("project not found".to_string()))?;
            if !project.is_active {
                return Err(TraceHubError::Auth("project is inactive".to_string()));
            }
            return Ok(project);
        }

        let key_hash = hex_sha256(api_key.as_bytes());
        let project = self.store.get_active_project_by_key_hash(&key_hash).await?.ok_or_else(|| {
            tracing::warn!(key_hash = %key_hash, "rejected request with an unrecognized api key");
            TraceHubError::Auth("invalid api key".to_string())
        })?;

        if let Some(header) = project_id_header
            && project.id.to_string() != header
        {
            tracing::warn!(
                project_id = %project.id,
                "rejected request: x-project-id does not match the resolved key's project"
            );
            return Err(TraceHubError::Auth("project scope mismatch".to_string()));
        }
        Ok(project)
    }

    /// Resolves as [`Self::resolve`], additionally requiring
    /// `key_activated = true`.
    ///
    /// # Errors
    /// Returns [`TraceHubError::Auth`] under the same conditions as
    /// [`Self::resolve`], plus when the resolved project's key has not been
    /// activated for ingestion.
    pub async fn resolve_for_ingest(
        &self,
        api_key: &str,
        project_id_header: Option<&str>,
    ) -> Result<Project, TraceHubError> {
        let project = self.resolve(api_key, project_id_header).await?;
        if !project.key_activated {
            return Err(TraceHubError::Auth(
                "key not provisioned: rotate key first".to_string(),
            ));
        }
        Ok(project)
    }

    /// Requires `api_key` to be an admin credential, without resolving a
    /// project.
    ///
    /// # Errors
    /// Returns [`TraceHubError::Auth`] if `api_key` is empty or not an
    /// admin credential.
    pub fn require_admin(&self, api_key: &str) -> Result<(), TraceHubError> {
        if api_key.is_empty() {
            return Err(TraceHubError::Auth("missing api key".to_string()));
        }
        if !self.config.is_admin_key(api_key) {
            return Err(TraceHubError::Auth("admin key required".to_string()));
        }
        Ok(())
    }
}
