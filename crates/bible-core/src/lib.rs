//! bible-core - Core types and traits for the offline bible reader
//!
//! This crate provides the record types, the book catalog, the storage and
//! remote-source traits, error handling and configuration shared by the
//! store, sync and query crates.

pub mod books;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use books::{Book, BOOKS};
pub use config::*;
pub use error::{BibleError, FieldError, Result};
pub use traits::*;
pub use types::*;
