//! Core domain types for the bible reader.

use serde::{Deserialize, Serialize};

use crate::error::{BibleError, FieldError, Result};
use crate::traits::Record;

/// Fixed key of the sync metadata singleton.
pub const SYNC_STATUS_KEY: &str = "sync-status";

/// Maximum author length accepted on the commentary write path.
pub const MAX_AUTHOR_CHARS: usize = 100;

/// Maximum commentary length accepted on the write path.
pub const MAX_COMMENTARY_CHARS: usize = 5000;

/// Named record collections held by the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreName {
    Verses,
    Commentaries,
    Themes,
    Metadata,
}

impl StoreName {
    /// Every collection, in creation order.
    pub const ALL: [StoreName; 4] = [
        StoreName::Verses,
        StoreName::Commentaries,
        StoreName::Themes,
        StoreName::Metadata,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verses => "verses",
            Self::Commentaries => "commentaries",
            Self::Themes => "themes",
            Self::Metadata => "metadata",
        }
    }
}

impl std::fmt::Display for StoreName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secondary lookup indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexName {
    /// (book, chapter)
    BookChapter,
    /// (book)
    Book,
    /// (verse_id)
    VerseId,
}

impl IndexName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BookChapter => "by_book_chapter",
            Self::Book => "by_book",
            Self::VerseId => "by_verse",
        }
    }
}

impl std::fmt::Display for IndexName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A primary key or a component of an index key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKey {
    Int(i64),
    Text(String),
}

impl From<i64> for RecordKey {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for RecordKey {
    fn from(v: u32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<&str> for RecordKey {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for RecordKey {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// A single verse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verse {
    /// Unique identifier.
    pub id: i64,

    /// Full book title.
    pub book: String,

    /// Chapter number (1-based).
    pub chapter: u32,

    /// Verse number within the chapter (1-based).
    pub verse: u32,

    /// Primary text.
    pub text: String,

    /// Legacy orthography variant of the text.
    #[serde(default)]
    pub old_text: Option<String>,

    /// Topic heading that starts at this verse.
    #[serde(default)]
    pub topic: Option<String>,
}

impl Verse {
    pub fn new(id: i64, book: &str, chapter: u32, verse: u32, text: &str) -> Self {
        Self {
            id,
            book: book.to_string(),
            chapter,
            verse,
            text: text.to_string(),
            old_text: None,
            topic: None,
        }
    }
}

impl Record for Verse {
    const STORE: StoreName = StoreName::Verses;

    fn key(&self) -> RecordKey {
        RecordKey::Int(self.id)
    }

    fn validate(&self) -> Result<()> {
        if self.book.trim().is_empty() {
            return Err(BibleError::invalid_record(Self::STORE, format!("verse {} has no book", self.id)));
        }
        if self.chapter == 0 || self.verse == 0 {
            return Err(BibleError::invalid_record(
                Self::STORE,
                format!("verse {} has a zero chapter or verse number", self.id),
            ));
        }
        Ok(())
    }
}

/// A topical heading inside a chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub id: i64,
    pub book: String,
    pub chapter: u32,
    pub topic: String,
}

impl Theme {
    pub fn new(id: i64, book: &str, chapter: u32, topic: &str) -> Self {
        Self {
            id,
            book: book.to_string(),
            chapter,
            topic: topic.to_string(),
        }
    }
}

impl Record for Theme {
    const STORE: StoreName = StoreName::Themes;

    fn key(&self) -> RecordKey {
        RecordKey::Int(self.id)
    }

    fn validate(&self) -> Result<()> {
        if self.book.trim().is_empty() || self.topic.trim().is_empty() {
            return Err(BibleError::invalid_record(
                Self::STORE,
                format!("theme {} is missing book or topic", self.id),
            ));
        }
        Ok(())
    }
}

/// An annotation attached to one verse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commentary {
    pub id: i64,

    /// Owning verse.
    pub verse_id: i64,

    pub author: String,
    pub text: String,
}

impl Record for Commentary {
    const STORE: StoreName = StoreName::Commentaries;

    fn key(&self) -> RecordKey {
        RecordKey::Int(self.id)
    }

    fn validate(&self) -> Result<()> {
        if self.author.trim().is_empty() {
            return Err(BibleError::invalid_record(
                Self::STORE,
                format!("commentary {} has no author", self.id),
            ));
        }
        Ok(())
    }
}

/// Sync metadata singleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Always [`SYNC_STATUS_KEY`].
    pub id: String,

    pub completed: bool,

    /// Unix millis of the last write.
    pub timestamp: u64,
}

impl SyncStatus {
    /// A completed status stamped with the current time.
    pub fn completed_now() -> Self {
        Self {
            id: SYNC_STATUS_KEY.to_string(),
            completed: true,
            timestamp: now_millis(),
        }
    }
}

impl Record for SyncStatus {
    const STORE: StoreName = StoreName::Metadata;

    fn key(&self) -> RecordKey {
        RecordKey::Text(self.id.clone())
    }
}

/// A commentary submitted by a reader, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCommentary {
    pub verse_id: i64,
    pub author: String,
    pub text: String,
}

impl NewCommentary {
    pub fn new(verse_id: i64, author: &str, text: &str) -> Self {
        Self {
            verse_id,
            author: author.to_string(),
            text: text.to_string(),
        }
    }

    /// Check every field and collect all failures.
    pub fn validate(&self) -> std::result::Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        if self.verse_id <= 0 {
            errors.push(FieldError::new("verse_id", "a verse must be selected"));
        }

        let author = self.author.trim();
        if author.is_empty() {
            errors.push(FieldError::new("author", "author is required"));
        } else if author.chars().count() > MAX_AUTHOR_CHARS {
            errors.push(FieldError::new(
                "author",
                format!("author must be at most {} characters", MAX_AUTHOR_CHARS),
            ));
        }

        let text = self.text.trim();
        if text.is_empty() {
            errors.push(FieldError::new("text", "text is required"));
        } else if text.chars().count() > MAX_COMMENTARY_CHARS {
            errors.push(FieldError::new(
                "text",
                format!("text must be at most {} characters", MAX_COMMENTARY_CHARS),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Attach the id assigned by the remote store.
    pub fn into_commentary(self, id: i64) -> Commentary {
        Commentary {
            id,
            verse_id: self.verse_id,
            author: self.author.trim().to_string(),
            text: self.text.trim().to_string(),
        }
    }
}

/// Full dataset exported by the remote store for a sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    #[serde(default)]
    pub verses: Vec<Verse>,

    #[serde(default)]
    pub commentaries: Vec<Commentary>,

    #[serde(default)]
    pub themes: Vec<Theme>,
}

/// Result of a bounded full scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome<R> {
    /// Matching records, at most the requested limit.
    pub records: Vec<R>,

    /// Number of records the scan looked at before stopping.
    pub visited: usize,
}

/// Current time in Unix millis.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
