// crates/tracehub-core/src/error.rs
// ============================================================================
// Module: TraceHub Error Taxonomy
// Description: The error kinds surfaced to callers of the engine layer.
// Purpose: Give every component a single, flat error type to convert into,
//          each variant mapping to the HTTP status the transport layer would
//          use (not implemented here — routing is out of scope).
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// Top-level error surfaced by `tracehub-engine` operations.
///
/// # Invariants
/// - `Conflict` is only raised for idempotency/unique-constraint races, never
///   for ordinary validation failures.
#[derive(Debug, Error)]
pub enum TraceHubError {
    /// Missing or invalid credential, or a scope/activation rule violation.
    #[error("auth error: {0}")]
    Auth(String),

    /// The referenced entity does not exist within the caller's project.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request failed a structural or semantic validation rule.
    #[error("validation error: {0}")]
    Validation(String),

    /// A unique-constraint or idempotency-key race was lost.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A judge provider failed to produce an output.
    #[error("provider error: {0}")]
    Provider(String),

    /// The underlying store failed for a reason not covered above.
    #[error("store error: {0}")]
    Store(String),
}

impl TraceHubError {
    /// True if this error represents a lost idempotency/uniqueness race.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
