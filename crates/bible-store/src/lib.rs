//! bible-store - Local object store on SQLite
//!
//! This crate provides the on-device mirror of the remote dataset. Each
//! collection is a table of JSON documents keyed by primary identity, with
//! secondary indexes declared as key paths into the document, and a
//! monotonic schema version upgraded through additive migrations.

mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

// Re-export schema for testing/migrations
pub use schema::{index_def, migrate, IndexDef, INDEXES, SCHEMA_VERSION};
