//! Core traits defining the interfaces between components.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::types::{
    Commentary, IndexName, NewCommentary, RecordKey, ScanOutcome, StoreName, Theme, Verse,
};

/// A typed record that lives in one local store collection.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection holding records of this type.
    const STORE: StoreName;

    /// Primary identity.
    fn key(&self) -> RecordKey;

    /// Field checks beyond what decoding already guarantees.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Local on-device store.
///
/// Every write is an upsert by primary key inside one transaction.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Insert or overwrite a batch of records atomically.
    async fn bulk_write<R: Record>(&self, records: &[R]) -> Result<()>;

    /// Point lookup by primary key.
    async fn get_by_key<R: Record>(&self, key: &RecordKey) -> Result<Option<R>>;

    /// Every record of a collection, in primary key order.
    async fn get_all<R: Record>(&self) -> Result<Vec<R>>;

    /// Records whose indexed fields exactly match `key`, in primary key order.
    async fn query_by_index<R: Record>(
        &self,
        index: IndexName,
        key: &[RecordKey],
    ) -> Result<Vec<R>>;

    /// Walk the collection in primary key order and stop once `limit`
    /// records satisfied `predicate`.
    async fn full_scan<R, F>(&self, predicate: F, limit: usize) -> Result<ScanOutcome<R>>
    where
        R: Record,
        F: Fn(&R) -> bool + Send + Sync + 'static;
}

/// The canonical relational store behind the network.
///
/// Per-request methods return their errors instead of swallowing them;
/// the query facade turns them into typed outcomes.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    // Bulk export for sync
    async fn fetch_all_verses(&self) -> Result<Vec<Verse>>;
    async fn fetch_all_commentaries(&self) -> Result<Vec<Commentary>>;
    async fn fetch_all_themes(&self) -> Result<Vec<Theme>>;

    // Per-request reads
    async fn get_verses(&self, book: &str, chapter: u32) -> Result<Vec<Verse>>;
    async fn get_themes(&self, book: &str) -> Result<Vec<Theme>>;
    async fn get_chapters(&self, book: &str) -> Result<Vec<u32>>;
    async fn search(&self, text: &str, limit: usize) -> Result<Vec<Verse>>;
    async fn get_commentaries(&self, verse_id: i64) -> Result<Vec<Commentary>>;

    // Write path

    /// Insert a validated commentary and return its new id.
    async fn add_commentary(&self, commentary: &NewCommentary) -> Result<i64>;
}
