// crates/tracehub-core/src/ids.rs
// ============================================================================
// Module: TraceHub Identifiers
// Description: Opaque 128-bit identifiers for every entity in the data model.
// Purpose: Give each entity kind a distinct, non-interchangeable ID type with
//          a stable wire form.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! Every entity identifier is a newtype around [`uuid::Uuid`], serializing
//! transparently as the UUID's string form. Trace and Span IDs are
//! caller-supplied (the wire contract requires stable identifiers from the
//! SDK side for idempotent re-ingestion); every other ID is store-generated
//! via [`Uuid::new_v4`].

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

macro_rules! opaque_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        ///
        /// # Invariants
        /// - Opaque 128-bit value; no internal structure is assumed by callers.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Wraps an existing UUID (used for caller-supplied or parsed IDs).
            #[must_use]
            pub const fn new(id: Uuid) -> Self {
                Self(id)
            }

            /// Generates a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

opaque_id!(ProjectId, "Identifies a tenant `Project`.");
opaque_id!(TraceId, "Identifies a `Trace`; caller-supplied on ingest.");
opaque_id!(SpanId, "Identifies a `Span`; caller-supplied on ingest.");
opaque_id!(SpanEventId, "Identifies an immutable `SpanEvent` row.");
opaque_id!(EvaluationId, "Identifies an `Evaluation` row.");
opaque_id!(PolicyId, "Identifies a `Policy` (the versioned container).");
opaque_id!(PolicyVersionId, "Identifies one `PolicyVersion`.");
opaque_id!(TraceDecisionId, "Identifies a `TraceDecision` row.");
opaque_id!(JudgeRunId, "Identifies a `JudgeRun` audit row.");
opaque_id!(JudgeCacheId, "Identifies a `JudgeCache` row.");
opaque_id!(CaseId, "Identifies a `Case`.");
opaque_id!(NotificationId, "Identifies a `Notification`.");
