//! Reading and writing the sync metadata singleton.

use tracing::warn;

use bible_core::{now_millis, LocalStore, RecordKey, Result, SyncStatus, SYNC_STATUS_KEY};

/// Read the status singleton, if present.
pub async fn read_status<S: LocalStore>(store: &S) -> Result<Option<SyncStatus>> {
    store
        .get_by_key::<SyncStatus>(&RecordKey::from(SYNC_STATUS_KEY))
        .await
}

/// Whether a previous sync explicitly completed.
///
/// A missing record or an unreadable store both count as not synced.
pub async fn is_synced<S: LocalStore>(store: &S) -> bool {
    match read_status(store).await {
        Ok(Some(status)) => status.completed,
        Ok(None) => false,
        Err(e) => {
            warn!("Could not read sync status, treating as unsynced: {}", e);
            false
        }
    }
}

/// Overwrite the singleton with a completed status.
pub async fn mark_synced<S: LocalStore>(store: &S) -> Result<SyncStatus> {
    let status = SyncStatus::completed_now();
    store.bulk_write(std::slice::from_ref(&status)).await?;
    Ok(status)
}

/// Overwrite the singleton with an incomplete status.
///
/// Called before a run rewrites the collections, so a run that dies halfway
/// leaves the store unsynced.
pub async fn clear_synced<S: LocalStore>(store: &S) -> Result<()> {
    let status = SyncStatus {
        id: SYNC_STATUS_KEY.to_string(),
        completed: false,
        timestamp: now_millis(),
    };
    store.bulk_write(std::slice::from_ref(&status)).await
}
