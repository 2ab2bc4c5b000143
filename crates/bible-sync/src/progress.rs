//! Sync stages and observable state.

use serde::{Deserialize, Serialize};

/// Checkpoints of a sync run, in the order they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SyncStage {
    Started,
    Fetched,
    VersesWritten,
    CommentariesWritten,
    ThemesWritten,
    Completed,
}

impl SyncStage {
    /// Progress percentage reported once this stage is reached.
    pub fn percent(&self) -> u8 {
        match self {
            Self::Started => 10,
            Self::Fetched => 50,
            Self::VersesWritten => 75,
            Self::CommentariesWritten => 85,
            Self::ThemesWritten => 95,
            Self::Completed => 100,
        }
    }
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Started => "started",
            Self::Fetched => "fetched",
            Self::VersesWritten => "verses written",
            Self::CommentariesWritten => "commentaries written",
            Self::ThemesWritten => "themes written",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Sync state as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncState {
    #[default]
    Unsynced,
    Syncing { stage: SyncStage },
    /// Completed at this Unix millis timestamp.
    Synced { at: u64 },
}

impl SyncState {
    /// Progress bar value.
    pub fn percent(&self) -> u8 {
        match self {
            Self::Unsynced => 0,
            Self::Syncing { stage } => stage.percent(),
            Self::Synced { .. } => 100,
        }
    }

    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced { .. })
    }
}
