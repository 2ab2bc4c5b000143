//! bible-query - Read facade for the offline reader
//!
//! Answers every UI read from the local store once it is synced and from the
//! remote source otherwise, with the same record shapes and ordering either
//! way. Failures come back as typed outcomes instead of errors.
//!
//! # Features
//!
//! - Local reads with remote fallback when the local store faults
//! - Bounded, early-terminating substring search
//! - Per-request remote timeouts reported as a retryable state
//! - Chapter loader that discards superseded responses
//! - Validated commentary submission
//!
//! # Example
//!
//! ```rust,ignore
//! use bible_query::{QueryConfig, QueryOutcome, ReaderData};
//! use std::sync::Arc;
//!
//! let data = ReaderData::new(Arc::new(store), Arc::new(remote), QueryConfig::default());
//! match data.get_verses_for("მათეს სახარება", 1).await {
//!     QueryOutcome::Found(verses) => println!("{} verses", verses.len()),
//!     other => println!("{:?}", other),
//! }
//! ```

mod facade;
mod loader;
mod outcome;

pub use facade::{QueryConfig, ReaderData};
pub use loader::{ChapterLoader, ChapterState, ChapterView, LoadStatus};
pub use outcome::{QueryOutcome, SubmitOutcome};
