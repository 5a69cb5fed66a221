// crates/tracehub-core/src/lib.rs
// ============================================================================
// Module: TraceHub Core
// Description: Shared data model, identifiers, hashing, and trait seams.
// Purpose: Give every other TraceHub crate a single source of truth for the
//          entities, IDs, and errors that flow through ingestion and decision.
// Dependencies: serde, serde_json, sha2, thiserror, time, uuid, ret-logic
// ============================================================================

//! ## Overview
//! `tracehub-core` is the leaf crate of the workspace: it owns the entity
//! model (§3 of the design), opaque identifiers, the canonical hashing used
//! for idempotency caching, the shared error taxonomy, and the trait seams
//! (`Store`, `JudgeProvider`) that the engine and providers crates implement
//! against. Nothing in this crate talks to a database or the network.

pub mod entities;
pub mod error;
pub mod hashing;
pub mod ids;
pub mod json;
pub mod judge;
pub mod store;
pub mod time;

pub use entities::*;
pub use error::TraceHubError;
pub use ids::*;
pub use judge::{JudgeContext, JudgeError, JudgeOutcome, JudgeProvider};
pub use store::Store;
pub use time::Timestamp;
