// crates/tracehub-providers/src/lib.rs
// ============================================================================
// Module: TraceHub Providers
// Description: The judge registry and the built-in heuristic/LLM judges.
// Purpose: Give the decision pipeline a uniform, pluggable set of judges.
// Dependencies: async-trait, reqwest, serde_json, tracehub_core::judge
// ============================================================================

//! ## Overview
//! Two built-in judges ship here: [`heuristic::HeuristicJudge`] (a pure,
//! synchronous function over the decision context) and
//! [`llm::LlmJudge`] (an HTTP-fronted judge that falls back to a
//! deterministic stub when no endpoint is configured). [`registry::JudgeRegistry`]
//! holds them keyed by name, mirroring the `ProviderRegistry` pattern used
//! elsewhere in the workspace for pluggable named backends.

pub mod heuristic;
pub mod llm;
pub mod registry;

pub use heuristic::HeuristicJudge;
pub use llm::LlmJudge;
pub use registry::JudgeRegistry;
pub use registry::RegistryError;
