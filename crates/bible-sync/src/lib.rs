//! bible-sync - Offline sync controller
//!
//! Pulls the full dataset from the remote source once and mirrors it into
//! the local store, reporting progress as it goes.
//!
//! # State machine
//!
//! `Unsynced -> Syncing -> Synced` on success. A run clears the persisted
//! completion flag (the metadata singleton) before its first collection
//! write and sets it again last, so a failure leaves whatever the flag says:
//! `Synced` if the run failed while fetching, `Unsynced` otherwise. A reload
//! after an interrupted run starts from `Unsynced` unless a run completed.
//!
//! # Example
//!
//! ```rust,ignore
//! use bible_sync::SyncController;
//! use std::sync::Arc;
//!
//! let controller = SyncController::new(Arc::new(store), Arc::new(remote));
//! if let Some(report) = controller.ensure_synced(|stage| println!("{}%", stage.percent())).await? {
//!     println!("synced {} verses", report.verses);
//! }
//! ```

mod controller;
mod progress;
mod status;

pub use controller::{SyncController, SyncReport};
pub use progress::{SyncStage, SyncState};
pub use status::{is_synced, mark_synced, read_status};
