// crates/tracehub-store-sqlite/src/lib.rs
// ============================================================================
// Module: TraceHub SQLite Store
// Description: The `Store` trait implementation over rusqlite.
// Purpose: Give `tracehub-engine` a durable, transactional backend without
//          depending on a running database server.
// Dependencies: rusqlite, tracehub_core::store
// ============================================================================

//! ## Overview
//! `SqliteStore` owns a single `rusqlite::Connection` behind a mutex,
//! bootstraps its own schema on construction (no external migration tool:
//! schema migrations remain out of scope), and maps unique-constraint
//! violations to `TraceHubError::Conflict`.

mod store;

pub use store::SCHEMA_VERSION;
pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
