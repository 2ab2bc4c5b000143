//! Local-or-remote read routing.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use bible_core::{
    BibleError, Commentary, IndexName, LocalStore, NewCommentary, ReaderConfig, RecordKey,
    RemoteSource, Result, Theme, Verse,
};

use crate::outcome::{QueryOutcome, SubmitOutcome};

/// Configuration for facade reads.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Maximum number of search results.
    pub search_limit: usize,

    /// Queries shorter than this (in characters, after trimming) return nothing.
    pub min_search_chars: usize,

    /// Upper bound on any single remote request.
    pub remote_timeout: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            search_limit: 50,
            min_search_chars: 2,
            remote_timeout: Duration::from_secs(15),
        }
    }
}

impl From<&ReaderConfig> for QueryConfig {
    fn from(config: &ReaderConfig) -> Self {
        Self {
            search_limit: config.search.limit,
            min_search_chars: config.search.min_query_chars,
            remote_timeout: config.remote.timeout(),
        }
    }
}

/// Single read API over the local store and the remote source.
///
/// Once the local store is marked synced every read is answered locally; a
/// local fault falls back to the remote path. Before that, every read goes
/// to the remote source and the local read path is never touched.
pub struct ReaderData<S, R> {
    store: Arc<S>,
    remote: Arc<R>,
    config: QueryConfig,
}

impl<S, R> ReaderData<S, R>
where
    S: LocalStore,
    R: RemoteSource,
{
    pub fn new(store: Arc<S>, remote: Arc<R>, config: QueryConfig) -> Self {
        Self {
            store,
            remote,
            config,
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub async fn is_synced(&self) -> bool {
        bible_sync::is_synced(&*self.store).await
    }

    /// Verses of one chapter, ordered by verse number.
    pub async fn get_verses_for(&self, book: &str, chapter: u32) -> QueryOutcome<Verse> {
        if self.is_synced().await {
            let key = [RecordKey::from(book), RecordKey::from(chapter)];
            match self
                .store
                .query_by_index::<Verse>(IndexName::BookChapter, &key)
                .await
            {
                Ok(mut verses) => {
                    verses.sort_by_key(|v| v.verse);
                    return QueryOutcome::from_records(verses);
                }
                Err(e) => warn!("Local verse lookup failed, using remote: {}", e),
            }
        }

        self.bounded("verses", self.remote.get_verses(book, chapter))
            .await
            .into()
    }

    /// Themes of one book, ordered by id.
    pub async fn get_themes_for(&self, book: &str) -> QueryOutcome<Theme> {
        if self.is_synced().await {
            match self
                .store
                .query_by_index::<Theme>(IndexName::Book, &[RecordKey::from(book)])
                .await
            {
                Ok(mut themes) => {
                    themes.sort_by_key(|t| t.id);
                    return QueryOutcome::from_records(themes);
                }
                Err(e) => warn!("Local theme lookup failed, using remote: {}", e),
            }
        }

        self.bounded("themes", self.remote.get_themes(book))
            .await
            .into()
    }

    /// Case-insensitive substring search over verse text.
    ///
    /// Returns at most `search_limit` verses in id order. The local scan stops
    /// as soon as the limit is reached.
    pub async fn search(&self, text: &str) -> QueryOutcome<Verse> {
        let query = text.trim();
        if query.chars().count() < self.config.min_search_chars {
            debug!("Search query {:?} too short", query);
            return QueryOutcome::Empty;
        }

        let limit = self.config.search_limit;

        if self.is_synced().await {
            let needle = query.to_lowercase();
            match self
                .store
                .full_scan::<Verse, _>(move |v| v.text.to_lowercase().contains(&needle), limit)
                .await
            {
                Ok(outcome) => {
                    debug!(
                        "Local search for {:?} matched {} after visiting {}",
                        query,
                        outcome.records.len(),
                        outcome.visited
                    );
                    return QueryOutcome::from_records(outcome.records);
                }
                Err(e) => warn!("Local search failed, using remote: {}", e),
            }
        }

        self.bounded("search", self.remote.search(query, limit))
            .await
            .into()
    }

    /// Distinct chapter numbers of a book, ascending.
    pub async fn chapters_for(&self, book: &str) -> QueryOutcome<u32> {
        if self.is_synced().await {
            match self
                .store
                .query_by_index::<Verse>(IndexName::Book, &[RecordKey::from(book)])
                .await
            {
                Ok(verses) => return QueryOutcome::from_records(distinct_chapters(&verses)),
                Err(e) => warn!("Local chapter lookup failed, using remote: {}", e),
            }
        }

        self.bounded("chapters", self.remote.get_chapters(book))
            .await
            .into()
    }

    /// The verse at `book chapter:number`, if it exists.
    pub async fn find_verse(&self, book: &str, chapter: u32, number: u32) -> QueryOutcome<Verse> {
        self.get_verses_for(book, chapter)
            .await
            .map(|verses| verses.into_iter().filter(|v| v.verse == number).collect())
    }

    /// Commentaries on one verse, ordered by id.
    ///
    /// Before sync these are fetched per verse from the remote source.
    pub async fn commentaries_for(&self, verse_id: i64) -> QueryOutcome<Commentary> {
        if self.is_synced().await {
            match self
                .store
                .query_by_index::<Commentary>(IndexName::VerseId, &[RecordKey::from(verse_id)])
                .await
            {
                Ok(mut found) => {
                    found.sort_by_key(|c| c.id);
                    return QueryOutcome::from_records(found);
                }
                Err(e) => warn!("Local commentary lookup failed, using remote: {}", e),
            }
        }

        self.bounded("commentaries", self.remote.get_commentaries(verse_id))
            .await
            .into()
    }

    /// Validate and store a new commentary.
    ///
    /// Validation runs before any I/O. When the local store is synced the
    /// saved record is mirrored into it so local reads see it immediately.
    pub async fn submit_commentary(&self, commentary: NewCommentary) -> SubmitOutcome {
        if let Err(errors) = commentary.validate() {
            debug!("Rejected commentary with {} field errors", errors.len());
            return SubmitOutcome::Invalid(errors);
        }

        let id = match self
            .bounded("add commentary", self.remote.add_commentary(&commentary))
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!("Commentary submission failed: {}", e);
                return SubmitOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        info!("Saved commentary {} on verse {}", id, commentary.verse_id);

        if self.is_synced().await {
            let saved = commentary.into_commentary(id);
            if let Err(e) = self.store.bulk_write(std::slice::from_ref(&saved)).await {
                warn!("Could not mirror commentary {} locally: {}", id, e);
            }
        }

        SubmitOutcome::Saved { id }
    }

    /// Run a remote request under the configured timeout.
    async fn bounded<T, F>(&self, what: &str, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let limit = self.config.remote_timeout;
        match tokio::time::timeout(limit, request).await {
            Ok(result) => {
                if let Err(e) = &result {
                    warn!("Remote {} request failed: {}", what, e);
                }
                result
            }
            Err(_) => {
                warn!("Remote {} request timed out after {:?}", what, limit);
                Err(BibleError::Timeout {
                    millis: limit.as_millis() as u64,
                })
            }
        }
    }
}

fn distinct_chapters(verses: &[Verse]) -> Vec<u32> {
    let mut chapters: Vec<u32> = verses.iter().map(|v| v.chapter).collect();
    chapters.sort_unstable();
    chapters.dedup();
    chapters
}
