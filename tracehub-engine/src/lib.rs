// crates/tracehub-engine/src/lib.rs
// ============================================================================
// Module: TraceHub Engine
// Description: Orchestration layer binding auth, projection, decision, and
//              query/read models atop the Store/JudgeProvider/CaseEmitter
//              seams.
// Purpose: Give the rest of the workspace a single place where the wire
//          contract's operations (§6) live as plain async methods, with no
//          HTTP framework wired in.
// Dependencies: tracehub-{core,config,policy,providers,broker}, async-trait,
//               serde_json, thiserror, tokio, tracing, uuid
// ============================================================================

//! ## Overview
//! `tracehub-engine` is the only crate that depends on every other TraceHub
//! crate. It has no process entrypoint of its own: each service type
//! (`AuthResolver`, `IngestService`, `EvalService`, `DecisionService`,
//! `QueryService`, `PolicyService`, `CaseService`, `ProjectService`) exposes
//! the operations the wire contract names, constructed once at service
//! startup from a `Store`, a `JudgeRegistry`, a `CaseEmitter`, and a
//! `TraceHubConfig` — never from a process-wide singleton.

mod auth;
mod case;
mod decision;
mod eval;
mod ingest;
mod policy;
mod project;
mod query;

pub use auth::AuthResolver;
pub use case::CaseService;
pub use decision::DecideRequest;
pub use decision::DecideResponse;
pub use decision::DecisionService;
pub use eval::EvalCreate;
pub use eval::EvalService;
pub use ingest::EventBatch;
pub use ingest::IngestService;
pub use ingest::TraceBatch;
pub use policy::PolicyCreate;
pub use policy::PolicyService;
pub use project::ProjectService;
pub use query::QueryService;
pub use query::TraceDetail;
pub use query::TraceListItem;

/// Minimum accepted length of a caller-supplied idempotency key (§6).
pub const IDEMPOTENCY_KEY_MIN_LEN: usize = 3;
/// Maximum accepted length of a caller-supplied idempotency key (§6).
pub const IDEMPOTENCY_KEY_MAX_LEN: usize = 255;

/// Validates an idempotency key against the `3..=255` character bound every
/// ingest/eval/decide entry point enforces.
///
/// # Errors
/// Returns [`tracehub_core::TraceHubError::Validation`] if `key` is outside
/// the accepted length range.
pub(crate) fn validate_idempotency_key(key: &str) -> Result<(), tracehub_core::TraceHubError> {
    let len = key.chars().count();
    if (IDEMPOTENCY_KEY_MIN_LEN..=IDEMPOTENCY_KEY_MAX_LEN).contains(&len) {
        Ok(())
    } else {
        Err(tracehub_core::TraceHubError::Validation(format!(
            "idempotency_key must be {IDEMPOTENCY_KEY_MIN_LEN}-{IDEMPOTENCY_KEY_MAX_LEN} characters, got {len}"
        )))
    }
}
