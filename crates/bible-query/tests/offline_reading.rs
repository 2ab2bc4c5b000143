//! End-to-end reads against a real local store and a scripted remote.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use bible_core::{
    BibleError, IndexName, LocalStore, NewCommentary, Record, RecordKey, RemoteSource, Result,
    ScanOutcome, StoreName, SyncSnapshot, Theme, Verse,
};
use bible_query::{
    ChapterLoader, ChapterState, LoadStatus, QueryConfig, QueryOutcome, ReaderData, SubmitOutcome,
};
use bible_remote::{MockRemote, RemoteCall};
use bible_store::SqliteStore;
use bible_sync::SyncController;

const MATTHEW: &str = "Matthew";

/// Local store wrapper that counts collection reads and can fail commentary writes.
#[derive(Default)]
struct InstrumentedStore {
    inner: Option<SqliteStore>,
    collection_reads: AtomicUsize,
    last_visited: AtomicUsize,
    fail_commentary_writes: AtomicBool,
}

impl InstrumentedStore {
    fn new() -> Self {
        Self {
            inner: Some(SqliteStore::open_memory().unwrap()),
            ..Default::default()
        }
    }

    fn inner(&self) -> &SqliteStore {
        self.inner.as_ref().unwrap()
    }

    fn collection_reads(&self) -> usize {
        self.collection_reads.load(Ordering::SeqCst)
    }

    fn count_read<R: Record>(&self) {
        if R::STORE != StoreName::Metadata {
            self.collection_reads.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl LocalStore for InstrumentedStore {
    async fn bulk_write<R: Record>(&self, records: &[R]) -> Result<()> {
        if R::STORE == StoreName::Commentaries && self.fail_commentary_writes.load(Ordering::SeqCst) {
            return Err(BibleError::database("transaction aborted"));
        }
        self.inner().bulk_write(records).await
    }

    async fn get_by_key<R: Record>(&self, key: &RecordKey) -> Result<Option<R>> {
        self.count_read::<R>();
        self.inner().get_by_key(key).await
    }

    async fn get_all<R: Record>(&self) -> Result<Vec<R>> {
        self.count_read::<R>();
        self.inner().get_all().await
    }

    async fn query_by_index<R: Record>(&self, index: IndexName, key: &[RecordKey]) -> Result<Vec<R>> {
        self.count_read::<R>();
        self.inner().query_by_index(index, key).await
    }

    async fn full_scan<R, F>(&self, predicate: F, limit: usize) -> Result<ScanOutcome<R>>
    where
        R: Record,
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        self.count_read::<R>();
        let outcome = self.inner().full_scan(predicate, limit).await?;
        self.last_visited.store(outcome.visited, Ordering::SeqCst);
        Ok(outcome)
    }
}

/// Local store wrapper whose reads can be made to fail.
struct BrokenReads {
    inner: SqliteStore,
    fail_index_reads: AtomicBool,
    fail_status_reads: AtomicBool,
}

impl BrokenReads {
    fn new() -> Self {
        Self {
            inner: SqliteStore::open_memory().unwrap(),
            fail_index_reads: AtomicBool::new(false),
            fail_status_reads: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl LocalStore for BrokenReads {
    async fn bulk_write<R: Record>(&self, records: &[R]) -> Result<()> {
        self.inner.bulk_write(records).await
    }

    async fn get_by_key<R: Record>(&self, key: &RecordKey) -> Result<Option<R>> {
        if self.fail_status_reads.load(Ordering::SeqCst) {
            return Err(BibleError::database("disk I/O error"));
        }
        self.inner.get_by_key(key).await
    }

    async fn get_all<R: Record>(&self) -> Result<Vec<R>> {
        self.inner.get_all().await
    }

    async fn query_by_index<R: Record>(&self, index: IndexName, key: &[RecordKey]) -> Result<Vec<R>> {
        if self.fail_index_reads.load(Ordering::SeqCst) {
            return Err(BibleError::database("database disk image is malformed"));
        }
        self.inner.query_by_index(index, key).await
    }

    async fn full_scan<R, F>(&self, predicate: F, limit: usize) -> Result<ScanOutcome<R>>
    where
        R: Record,
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        if self.fail_index_reads.load(Ordering::SeqCst) {
            return Err(BibleError::database("database disk image is malformed"));
        }
        self.inner.full_scan(predicate, limit).await
    }
}

/// A synced `BrokenReads` store over the Matthew snapshot.
async fn synced_broken_reads() -> (Arc<BrokenReads>, Arc<MockRemote>, ReaderData<BrokenReads, MockRemote>) {
    let store = Arc::new(BrokenReads::new());
    let remote = Arc::new(MockRemote::new(matthew()));
    SyncController::new(Arc::clone(&store), Arc::clone(&remote))
        .run_sync(|_| {})
        .await
        .unwrap();
    let data = ReaderData::new(Arc::clone(&store), Arc::clone(&remote), QueryConfig::default());
    (store, remote, data)
}

fn matthew() -> SyncSnapshot {
    SyncSnapshot {
        verses: vec![
            Verse::new(3, MATTHEW, 1, 3, "Judah begat Phares and Zara of Thamar"),
            Verse::new(1, MATTHEW, 1, 1, "The book of the generation of Jesus Christ"),
            Verse::new(2, MATTHEW, 1, 2, "Abraham begat Isaac"),
        ],
        commentaries: Vec::new(),
        themes: vec![
            Theme::new(1, MATTHEW, 1, "Genealogy"),
            Theme::new(2, MATTHEW, 1, "Birth"),
        ],
    }
}

fn setup(
    remote: MockRemote,
    config: QueryConfig,
) -> (
    Arc<InstrumentedStore>,
    Arc<MockRemote>,
    SyncController<InstrumentedStore, MockRemote>,
    Arc<ReaderData<InstrumentedStore, MockRemote>>,
) {
    let store = Arc::new(InstrumentedStore::new());
    let remote = Arc::new(remote);
    let controller = SyncController::new(Arc::clone(&store), Arc::clone(&remote));
    let data = Arc::new(ReaderData::new(Arc::clone(&store), Arc::clone(&remote), config));
    (store, remote, controller, data)
}

#[tokio::test]
async fn unsynced_reads_never_touch_local_collections() {
    let (store, remote, _, data) = setup(MockRemote::new(matthew()), QueryConfig::default());

    let expected = remote.get_verses(MATTHEW, 1).await.unwrap();
    let outcome = data.get_verses_for(MATTHEW, 1).await;

    assert_eq!(outcome, QueryOutcome::Found(expected));
    assert_eq!(data.get_themes_for(MATTHEW).await.records().len(), 2);
    assert_eq!(data.search("begat").await.records().len(), 2);
    assert_eq!(store.collection_reads(), 0);
}

#[tokio::test]
async fn sync_then_read_matthew_locally() {
    let (_, remote, controller, data) = setup(MockRemote::new(matthew()), QueryConfig::default());

    let report = controller.run_sync(|_| {}).await.unwrap();
    assert_eq!((report.verses, report.commentaries, report.themes), (3, 0, 2));
    assert!(data.is_synced().await);

    let verses = data.get_verses_for(MATTHEW, 1).await.into_records();
    assert_eq!(verses.iter().map(|v| v.verse).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(verses, {
        let mut expected = matthew().verses;
        expected.sort_by_key(|v| v.verse);
        expected
    });

    let themes = data.get_themes_for(MATTHEW).await.into_records();
    assert_eq!(themes, matthew().themes);

    assert_eq!(remote.calls(RemoteCall::Verses), 0);
    assert_eq!(remote.calls(RemoteCall::Themes), 0);
}

#[tokio::test]
async fn local_and_remote_answers_match() {
    let (_, _, controller, data) = setup(MockRemote::new(matthew()), QueryConfig::default());
    let remote_verses = data.get_verses_for(MATTHEW, 1).await;
    let remote_chapters = data.chapters_for(MATTHEW).await;

    controller.run_sync(|_| {}).await.unwrap();

    assert_eq!(data.get_verses_for(MATTHEW, 1).await, remote_verses);
    assert_eq!(data.chapters_for(MATTHEW).await, remote_chapters);
}

#[tokio::test]
async fn search_stops_at_fifty_matches() {
    let (store, remote, _, data) = setup(MockRemote::new(SyncSnapshot::default()), QueryConfig::default());

    let verses: Vec<Verse> = (1..=10_000u32)
        .map(|n| {
            let text = if n % 50 == 0 {
                format!("verse {} mentions the Mustard seed", n)
            } else {
                format!("verse {}", n)
            };
            Verse::new(n as i64, MATTHEW, n / 100 + 1, n % 100 + 1, &text)
        })
        .collect();
    store.inner().bulk_write(&verses).await.unwrap();
    bible_sync::mark_synced(store.inner()).await.unwrap();

    let found = data.search("mustard SEED").await.into_records();

    assert_eq!(found.len(), 50);
    assert_eq!(found.last().map(|v| v.id), Some(2_500));
    assert!(store.last_visited.load(Ordering::SeqCst) < 10_000);
    assert_eq!(remote.total_calls(), 0);
}

#[tokio::test]
async fn slower_earlier_chapter_does_not_overwrite_later_one() {
    let mut snapshot = matthew();
    snapshot.verses.push(Verse::new(30, MATTHEW, 3, 1, "In those days came John the Baptist"));
    snapshot.verses.push(Verse::new(50, MATTHEW, 5, 1, "And seeing the multitudes"));
    let remote = MockRemote::new(snapshot);
    let chapter_three = remote.gate_chapter(3);

    let (_, _, _, data) = setup(remote, QueryConfig::default());
    let loader = ChapterLoader::new(data);

    let (three, five) = tokio::join!(loader.load(MATTHEW, 3), async {
        // Issue chapter 5 only after chapter 3 has its id.
        while loader.view().request_id == 0 {
            tokio::task::yield_now().await;
        }
        let status = loader.load(MATTHEW, 5).await;
        chapter_three.notify_one();
        status
    });

    assert_eq!(three, LoadStatus::Superseded(1));
    assert_eq!(five, LoadStatus::Applied(2));

    let view = loader.view();
    assert_eq!(view.request_id, 2);
    assert_eq!(view.chapter, 5);
    match view.state {
        ChapterState::Ready(verses) => assert_eq!(verses[0].id, 50),
        other => panic!("expected chapter 5, got {:?}", other),
    }
}

#[tokio::test]
async fn timed_out_chapter_is_retryable_not_empty() {
    let remote = MockRemote::new(matthew());
    remote.stall(RemoteCall::Verses);
    let config = QueryConfig {
        remote_timeout: Duration::from_millis(50),
        ..QueryConfig::default()
    };
    let (_, _, _, data) = setup(remote, config);
    let loader = ChapterLoader::new(data);

    assert_eq!(loader.load(MATTHEW, 1).await, LoadStatus::Applied(1));
    assert!(matches!(
        loader.view().state,
        ChapterState::LoadFailed { retryable: true, .. }
    ));
}

#[tokio::test]
async fn failed_commentary_stage_leaves_reads_remote() {
    let (store, remote, controller, data) = setup(MockRemote::new(matthew()), QueryConfig::default());
    store.fail_commentary_writes.store(true, Ordering::SeqCst);

    assert!(controller.run_sync(|_| {}).await.is_err());
    assert!(!data.is_synced().await);

    // Verses written before the failing stage stay in the store.
    let stored: Option<Verse> = store.inner().get_by_key(&RecordKey::from(1i64)).await.unwrap();
    assert!(stored.is_some());
    assert_eq!(store.inner().count(StoreName::Verses).await.unwrap(), 3);

    let reads_before = store.collection_reads();
    assert_eq!(data.get_verses_for(MATTHEW, 1).await.records().len(), 3);
    assert_eq!(remote.calls(RemoteCall::Verses), 1);
    assert_eq!(store.collection_reads(), reads_before);

    store.fail_commentary_writes.store(false, Ordering::SeqCst);
    controller.run_sync(|_| {}).await.unwrap();
    assert!(data.is_synced().await);
    assert_eq!(store.inner().count(StoreName::Verses).await.unwrap(), 3);
}

#[tokio::test]
async fn invalid_commentary_is_rejected_before_io() {
    let (_, remote, _, data) = setup(MockRemote::new(matthew()), QueryConfig::default());

    let outcome = data
        .submit_commentary(NewCommentary::new(1, "   ", &"x".repeat(5001)))
        .await;

    let SubmitOutcome::Invalid(errors) = outcome else {
        panic!("expected validation errors, got {:?}", outcome);
    };
    let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, vec!["author", "text"]);
    assert_eq!(remote.total_calls(), 0);

    let saved = data
        .submit_commentary(NewCommentary::new(1, "Reader", "A note"))
        .await;
    assert!(saved.is_saved());
    assert_eq!(data.commentaries_for(1).await.records().len(), 1);
}

#[tokio::test]
async fn failed_forced_resync_sends_reads_remote() {
    let (store, remote, controller, data) = setup(MockRemote::new(matthew()), QueryConfig::default());
    controller.run_sync(|_| {}).await.unwrap();
    assert!(data.is_synced().await);

    store.fail_commentary_writes.store(true, Ordering::SeqCst);
    assert!(controller.run_sync(|_| {}).await.is_err());

    assert!(!controller.state().is_synced());
    assert!(!data.is_synced().await);

    let reads_before = store.collection_reads();
    assert_eq!(data.get_verses_for(MATTHEW, 1).await.records().len(), 3);
    assert_eq!(remote.calls(RemoteCall::Verses), 1);
    assert_eq!(store.collection_reads(), reads_before);
}

#[tokio::test]
async fn local_read_faults_fall_back_to_remote() {
    let (store, remote, data) = synced_broken_reads().await;
    assert!(data.is_synced().await);
    store.fail_index_reads.store(true, Ordering::SeqCst);

    let expected = MockRemote::new(matthew());

    let verses = data.get_verses_for(MATTHEW, 1).await;
    assert_eq!(verses, QueryOutcome::Found(expected.get_verses(MATTHEW, 1).await.unwrap()));
    assert_eq!(remote.calls(RemoteCall::Verses), 1);

    let themes = data.get_themes_for(MATTHEW).await;
    assert_eq!(themes, QueryOutcome::Found(expected.get_themes(MATTHEW).await.unwrap()));
    assert_eq!(remote.calls(RemoteCall::Themes), 1);

    let found = data.search("begat").await;
    assert_eq!(found, QueryOutcome::Found(expected.search("begat", 50).await.unwrap()));
    assert_eq!(found.records().len(), 2);
    assert_eq!(remote.calls(RemoteCall::Search), 1);
}

#[tokio::test]
async fn unreadable_status_counts_as_unsynced() {
    let (store, remote, data) = synced_broken_reads().await;
    store.fail_status_reads.store(true, Ordering::SeqCst);

    assert!(!data.is_synced().await);
    assert!(!bible_sync::is_synced(&*store).await);

    // Reads route remote without consulting the local indexes.
    assert_eq!(data.get_verses_for(MATTHEW, 1).await.records().len(), 3);
    assert_eq!(remote.calls(RemoteCall::Verses), 1);

    store.fail_status_reads.store(false, Ordering::SeqCst);
    assert!(data.is_synced().await);
}
