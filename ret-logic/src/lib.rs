// crates/ret-logic/src/lib.rs
// ============================================================================
// Module: RET Logic
// Description: Generic boolean requirement algebra.
// Purpose: Provide a small, reusable requirement tree usable by any consumer
//          that needs to combine named predicates with and/or/not/at-least.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! `ret-logic` is a standalone crate with a single job: represent "when does
//! this thing apply" as a tree of boolean combinators over an opaque
//! predicate type `P`, and evaluate it. Consumers supply their own predicate
//! type and their own function for resolving a predicate to `true`/`false`;
//! this crate only owns the tree shape and the short-circuit evaluation.

mod requirement;

pub use requirement::Requirement;
