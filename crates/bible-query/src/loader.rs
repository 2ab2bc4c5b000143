//! Chapter loading with stale-response suppression.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use bible_core::{LocalStore, RemoteSource, Verse};

use crate::facade::ReaderData;
use crate::outcome::QueryOutcome;

/// What the chapter view should render.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChapterState {
    #[default]
    Idle,
    Loading,
    Ready(Vec<Verse>),
    /// The chapter has no verses.
    Empty,
    LoadFailed { reason: String, retryable: bool },
}

impl From<QueryOutcome<Verse>> for ChapterState {
    fn from(outcome: QueryOutcome<Verse>) -> Self {
        match outcome {
            QueryOutcome::Found(verses) => Self::Ready(verses),
            QueryOutcome::Empty => Self::Empty,
            QueryOutcome::Failed { reason } => Self::LoadFailed {
                reason,
                retryable: true,
            },
            QueryOutcome::TimedOut { after } => Self::LoadFailed {
                reason: format!("request timed out after {}s", after.as_secs()),
                retryable: true,
            },
        }
    }
}

/// The chapter currently on screen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChapterView {
    /// Request that produced this view; 0 before the first load.
    pub request_id: u64,
    pub book: String,
    pub chapter: u32,
    pub state: ChapterState,
}

/// Whether a finished load reached the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Applied(u64),
    /// A newer load was issued while this one was in flight.
    Superseded(u64),
}

/// Loads chapters into a watched view.
///
/// Every load gets a larger request id than the one before. A response is
/// applied only if its id is still the newest, so a slow earlier response can
/// never overwrite a later one.
pub struct ChapterLoader<S, R> {
    data: Arc<ReaderData<S, R>>,
    latest: AtomicU64,
    view: watch::Sender<ChapterView>,
}

impl<S, R> ChapterLoader<S, R>
where
    S: LocalStore,
    R: RemoteSource,
{
    pub fn new(data: Arc<ReaderData<S, R>>) -> Self {
        let (view, _) = watch::channel(ChapterView::default());
        Self {
            data,
            latest: AtomicU64::new(0),
            view,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ChapterView> {
        self.view.subscribe()
    }

    /// Snapshot of the current view.
    pub fn view(&self) -> ChapterView {
        self.view.borrow().clone()
    }

    /// Load `book chapter` into the view.
    pub async fn load(&self, book: &str, chapter: u32) -> LoadStatus {
        let id = self.latest.fetch_add(1, Ordering::SeqCst) + 1;

        self.apply(id, |view| {
            view.book = book.to_string();
            view.chapter = chapter;
            view.state = ChapterState::Loading;
        });

        let state = ChapterState::from(self.data.get_verses_for(book, chapter).await);

        if self.apply(id, |view| view.state = state) {
            LoadStatus::Applied(id)
        } else {
            debug!("Discarded superseded load {} of {} {}", id, book, chapter);
            LoadStatus::Superseded(id)
        }
    }

    /// Update the view only if `id` is the newest request.
    fn apply<F>(&self, id: u64, update: F) -> bool
    where
        F: FnOnce(&mut ChapterView),
    {
        self.view.send_if_modified(|view| {
            if self.latest.load(Ordering::SeqCst) != id || view.request_id > id {
                return false;
            }
            view.request_id = id;
            update(view);
            true
        })
    }
}
