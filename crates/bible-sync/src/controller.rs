//! The sync controller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use bible_core::{BibleError, LocalStore, RemoteSource, Result};

use crate::progress::{SyncStage, SyncState};
use crate::status;

/// Summary of a completed sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub verses: usize,
    pub commentaries: usize,
    pub themes: usize,

    /// Timestamp written to the status singleton (Unix millis).
    pub completed_at: u64,

    pub elapsed: Duration,
}

/// Transfers the remote dataset into the local store.
///
/// At most one transfer runs at a time per controller.
pub struct SyncController<S, R> {
    store: Arc<S>,
    remote: Arc<R>,

    /// Single-flight guard.
    in_flight: Mutex<()>,

    state: watch::Sender<SyncState>,
}

impl<S, R> SyncController<S, R>
where
    S: LocalStore,
    R: RemoteSource,
{
    pub fn new(store: Arc<S>, remote: Arc<R>) -> Self {
        let (state, _) = watch::channel(SyncState::Unsynced);
        Self {
            store,
            remote,
            in_flight: Mutex::new(()),
            state,
        }
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Read the persisted completion flag.
    ///
    /// Promotes an idle `Unsynced` state to `Synced` when a previous run
    /// completed; never touches a run in progress.
    pub async fn is_synced(&self) -> bool {
        match status::read_status(&*self.store).await {
            Ok(Some(s)) if s.completed => {
                self.state.send_if_modified(|state| {
                    if *state == SyncState::Unsynced {
                        *state = SyncState::Synced { at: s.timestamp };
                        true
                    } else {
                        false
                    }
                });
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!("Could not read sync status, treating as unsynced: {}", e);
                false
            }
        }
    }

    /// Sync unless a previous run already completed.
    ///
    /// Waits for any run in flight, then re-checks the completion flag while
    /// holding the lock, so concurrent callers transfer at most once.
    /// Returns the report if this call did the transfer.
    pub async fn ensure_synced<F>(&self, on_progress: F) -> Result<Option<SyncReport>>
    where
        F: Fn(SyncStage) + Send + Sync,
    {
        let guard = self.in_flight.lock().await;

        if self.is_synced().await {
            debug!("Local store already synced");
            return Ok(None);
        }

        self.transfer_locked(guard, &on_progress).await.map(Some)
    }

    /// Run a full transfer regardless of the completion flag.
    ///
    /// Fails with [`BibleError::SyncInProgress`] if another run holds the lock.
    pub async fn run_sync<F>(&self, on_progress: F) -> Result<SyncReport>
    where
        F: Fn(SyncStage) + Send + Sync,
    {
        let guard = self
            .in_flight
            .try_lock()
            .map_err(|_| BibleError::SyncInProgress)?;

        self.transfer_locked(guard, &on_progress).await
    }

    async fn transfer_locked<F>(&self, _guard: MutexGuard<'_, ()>, on_progress: &F) -> Result<SyncReport>
    where
        F: Fn(SyncStage) + Send + Sync,
    {
        let started = Instant::now();
        info!("Starting offline sync");
        self.advance(SyncStage::Started, on_progress);

        match self.transfer(on_progress).await {
            Ok(mut report) => {
                report.elapsed = started.elapsed();
                self.state.send_replace(SyncState::Synced {
                    at: report.completed_at,
                });
                info!(
                    "Offline sync completed in {}ms: {} verses, {} commentaries, {} themes",
                    report.elapsed.as_millis(),
                    report.verses,
                    report.commentaries,
                    report.themes
                );
                Ok(report)
            }
            Err(e) => {
                warn!("Offline sync failed: {}", e);
                self.state.send_replace(self.settled_state().await);
                Err(e)
            }
        }
    }

    /// Fetch everything, then write stage by stage.
    ///
    /// Nothing is written unless the whole fetch succeeded. The completion
    /// flag is cleared before the first collection write and set again last;
    /// each stage commits before the next begins.
    async fn transfer<F>(&self, on_progress: &F) -> Result<SyncReport>
    where
        F: Fn(SyncStage) + Send + Sync,
    {
        let (verses, commentaries, themes) = tokio::try_join!(
            self.remote.fetch_all_verses(),
            self.remote.fetch_all_commentaries(),
            self.remote.fetch_all_themes(),
        )
        .map_err(|e| BibleError::sync(format!("Fetching sync data failed: {}", e)))?;

        debug!(
            "Fetched {} verses, {} commentaries, {} themes",
            verses.len(),
            commentaries.len(),
            themes.len()
        );
        self.advance(SyncStage::Fetched, on_progress);

        status::clear_synced(&*self.store)
            .await
            .map_err(|e| stage_failed(SyncStage::VersesWritten, e))?;

        self.store
            .bulk_write(&verses)
            .await
            .map_err(|e| stage_failed(SyncStage::VersesWritten, e))?;
        self.advance(SyncStage::VersesWritten, on_progress);

        self.store
            .bulk_write(&commentaries)
            .await
            .map_err(|e| stage_failed(SyncStage::CommentariesWritten, e))?;
        self.advance(SyncStage::CommentariesWritten, on_progress);

        self.store
            .bulk_write(&themes)
            .await
            .map_err(|e| stage_failed(SyncStage::ThemesWritten, e))?;
        self.advance(SyncStage::ThemesWritten, on_progress);

        let status = status::mark_synced(&*self.store)
            .await
            .map_err(|e| stage_failed(SyncStage::Completed, e))?;
        self.advance(SyncStage::Completed, on_progress);

        Ok(SyncReport {
            verses: verses.len(),
            commentaries: commentaries.len(),
            themes: themes.len(),
            completed_at: status.timestamp,
            elapsed: Duration::ZERO,
        })
    }

    /// State matching the persisted flag after a failed run.
    ///
    /// A run that failed before writing leaves an earlier completion intact.
    async fn settled_state(&self) -> SyncState {
        match status::read_status(&*self.store).await {
            Ok(Some(s)) if s.completed => SyncState::Synced { at: s.timestamp },
            Ok(_) => SyncState::Unsynced,
            Err(e) => {
                warn!("Could not read sync status, treating as unsynced: {}", e);
                SyncState::Unsynced
            }
        }
    }

    fn advance<F>(&self, stage: SyncStage, on_progress: &F)
    where
        F: Fn(SyncStage),
    {
        debug!("Sync {} ({}%)", stage, stage.percent());
        self.state.send_replace(SyncState::Syncing { stage });
        on_progress(stage);
    }
}

fn stage_failed(stage: SyncStage, e: BibleError) -> BibleError {
    BibleError::sync(format!("Stage '{}' failed: {}", stage, e))
}
