//! bible-remote - Remote query layer
//!
//! Parameterized queries against the canonical relational store, the system
//! of record for verses, themes and commentaries.
//!
//! # Sources
//!
//! - [`SqliteRemote`]: the relational database itself.
//! - [`MockRemote`]: scripted in-memory source with failure injection,
//!   call counting and response gating, for exercising sync and fallback.

mod mock;
mod relational;

pub use mock::{MockRemote, RemoteCall};
pub use relational::SqliteRemote;

// Re-export the trait for convenience
pub use bible_core::RemoteSource;
