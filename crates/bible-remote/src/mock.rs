//! Scripted in-memory remote source.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use bible_core::{
    BibleError, Commentary, NewCommentary, RemoteSource, Result, SyncSnapshot, Theme, Verse,
};

/// Every operation the mock can fail, stall or count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteCall {
    FetchAllVerses,
    FetchAllCommentaries,
    FetchAllThemes,
    Verses,
    Themes,
    Chapters,
    Search,
    Commentaries,
    AddCommentary,
}

/// In-memory remote source answering from a snapshot.
///
/// Queries mirror the relational implementation: verses ordered by verse
/// number, themes and commentaries by id, case-insensitive search by id.
pub struct MockRemote {
    data: Mutex<SyncSnapshot>,
    failing: Mutex<HashSet<RemoteCall>>,
    stalled: Mutex<HashSet<RemoteCall>>,
    calls: Mutex<HashMap<RemoteCall, usize>>,
    chapter_gates: Mutex<HashMap<u32, Arc<Notify>>>,
    next_id: AtomicI64,
}

impl MockRemote {
    pub fn new(data: SyncSnapshot) -> Self {
        let next_id = data.commentaries.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        Self {
            data: Mutex::new(data),
            failing: Mutex::new(HashSet::new()),
            stalled: Mutex::new(HashSet::new()),
            calls: Mutex::new(HashMap::new()),
            chapter_gates: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(next_id),
        }
    }

    /// Make `call` fail until [`MockRemote::recover`] is called.
    pub fn fail(&self, call: RemoteCall) {
        self.failing.lock().unwrap().insert(call);
    }

    pub fn recover(&self, call: RemoteCall) {
        self.failing.lock().unwrap().remove(&call);
    }

    /// Make `call` never complete.
    pub fn stall(&self, call: RemoteCall) {
        self.stalled.lock().unwrap().insert(call);
    }

    /// Hold `get_verses` for `chapter` until the returned handle is notified.
    pub fn gate_chapter(&self, chapter: u32) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.chapter_gates
            .lock()
            .unwrap()
            .insert(chapter, Arc::clone(&gate));
        gate
    }

    /// How many times `call` was made.
    pub fn calls(&self, call: RemoteCall) -> usize {
        self.calls.lock().unwrap().get(&call).copied().unwrap_or(0)
    }

    /// Total calls across every operation.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Copy of the current dataset.
    pub fn snapshot(&self) -> SyncSnapshot {
        self.data.lock().unwrap().clone()
    }

    /// Record the call, then stall or fail it if scripted to.
    async fn enter(&self, call: RemoteCall) -> Result<()> {
        *self.calls.lock().unwrap().entry(call).or_insert(0) += 1;

        let stalled = self.stalled.lock().unwrap().contains(&call);
        if stalled {
            std::future::pending::<()>().await;
        }

        if self.failing.lock().unwrap().contains(&call) {
            return Err(BibleError::remote(format!("{:?} failed", call)));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteSource for MockRemote {
    async fn fetch_all_verses(&self) -> Result<Vec<Verse>> {
        self.enter(RemoteCall::FetchAllVerses).await?;
        Ok(self.snapshot().verses)
    }

    async fn fetch_all_commentaries(&self) -> Result<Vec<Commentary>> {
        self.enter(RemoteCall::FetchAllCommentaries).await?;
        Ok(self.snapshot().commentaries)
    }

    async fn fetch_all_themes(&self) -> Result<Vec<Theme>> {
        self.enter(RemoteCall::FetchAllThemes).await?;
        Ok(self.snapshot().themes)
    }

    async fn get_verses(&self, book: &str, chapter: u32) -> Result<Vec<Verse>> {
        let gate = self.chapter_gates.lock().unwrap().get(&chapter).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.enter(RemoteCall::Verses).await?;
        let mut verses: Vec<Verse> = self
            .snapshot()
            .verses
            .into_iter()
            .filter(|v| v.book == book && v.chapter == chapter)
            .collect();
        verses.sort_by_key(|v| v.verse);
        Ok(verses)
    }

    async fn get_themes(&self, book: &str) -> Result<Vec<Theme>> {
        self.enter(RemoteCall::Themes).await?;
        let mut themes: Vec<Theme> = self
            .snapshot()
            .themes
            .into_iter()
            .filter(|t| t.book == book)
            .collect();
        themes.sort_by_key(|t| t.id);
        Ok(themes)
    }

    async fn get_chapters(&self, book: &str) -> Result<Vec<u32>> {
        self.enter(RemoteCall::Chapters).await?;
        let mut chapters: Vec<u32> = self
            .snapshot()
            .verses
            .iter()
            .filter(|v| v.book == book)
            .map(|v| v.chapter)
            .collect();
        chapters.sort_unstable();
        chapters.dedup();
        Ok(chapters)
    }

    async fn search(&self, text: &str, limit: usize) -> Result<Vec<Verse>> {
        self.enter(RemoteCall::Search).await?;
        let needle = text.to_lowercase();
        let mut verses = self.snapshot().verses;
        verses.sort_by_key(|v| v.id);
        Ok(verses
            .into_iter()
            .filter(|v| v.text.to_lowercase().contains(&needle))
            .take(limit)
            .collect())
    }

    async fn get_commentaries(&self, verse_id: i64) -> Result<Vec<Commentary>> {
        self.enter(RemoteCall::Commentaries).await?;
        let mut found: Vec<Commentary> = self
            .snapshot()
            .commentaries
            .into_iter()
            .filter(|c| c.verse_id == verse_id)
            .collect();
        found.sort_by_key(|c| c.id);
        Ok(found)
    }

    async fn add_commentary(&self, commentary: &NewCommentary) -> Result<i64> {
        self.enter(RemoteCall::AddCommentary).await?;

        let mut data = self.data.lock().unwrap();
        if !data.verses.iter().any(|v| v.id == commentary.verse_id) {
            return Err(BibleError::remote(format!(
                "verse {} does not exist",
                commentary.verse_id
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        data.commentaries.push(commentary.clone().into_commentary(id));
        Ok(id)
    }
}
