// crates/tracehub-broker/src/lib.rs
// ============================================================================
// Module: TraceHub Broker
// Description: Case creation and at-most-once webhook delivery for
//              ESCALATE decisions.
// Purpose: Isolate outbound-network concerns (SSRF hardening, delivery
//          bookkeeping) from the decision pipeline in `tracehub-engine`.
// Dependencies: reqwest, tracehub_core::store, url
// ============================================================================

//! ## Overview
//! `tracehub-broker` owns the one piece of this system that talks to an
//! operator-configured destination on the open network: case/notification
//! webhooks (§4.7). [`host_policy::HostPolicy`] keeps that surface from
//! becoming an SSRF pivot, and [`emitter::CaseEmitter`] keeps delivery
//! failures from ever surfacing as pipeline errors.

mod emitter;
mod host_policy;

pub use emitter::CaseEmitter;
pub use emitter::webhook_payload;
pub use host_policy::HostPolicy;
pub use host_policy::HostPolicyError;
