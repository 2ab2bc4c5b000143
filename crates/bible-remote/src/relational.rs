//! Relational SQLite implementation of the remote query layer.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use tracing::{debug, info};

use bible_core::{
    BibleError, Commentary, NewCommentary, RemoteSource, Result, SyncSnapshot, Theme, Verse,
};

/// Relational schema of the canonical store.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS verses (
    id INTEGER PRIMARY KEY,
    book TEXT NOT NULL,
    chapter INTEGER NOT NULL,
    verse INTEGER NOT NULL,
    text TEXT NOT NULL,
    old_text TEXT,
    topic TEXT,
    UNIQUE (book, chapter, verse)
);

CREATE TABLE IF NOT EXISTS themes (
    id INTEGER PRIMARY KEY,
    book TEXT NOT NULL,
    chapter INTEGER NOT NULL,
    topic TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_themes_book ON themes(book, chapter);

CREATE TABLE IF NOT EXISTS commentaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    verse_id INTEGER NOT NULL REFERENCES verses(id),
    author TEXT NOT NULL,
    text TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_commentaries_verse ON commentaries(verse_id);
"#;

const VERSE_COLUMNS: &str = "id, book, chapter, verse, text, old_text, topic";

/// Remote source backed by the relational database.
#[derive(Clone)]
pub struct SqliteRemote {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRemote {
    /// Open or create the canonical database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| BibleError::remote(format!("Failed to open database: {}", e)))?;
        info!("Remote database opened at {:?}", path);
        Self::init(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BibleError::remote(format!("Failed to open database: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| BibleError::remote(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| BibleError::remote(format!("Failed to initialize schema: {}", e)))?;

        // SQLite's own case folding only covers ASCII.
        conn.create_scalar_function(
            "fold_case",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let text: Option<String> = ctx.get(0)?;
                Ok(text.map(|t| t.to_lowercase()))
            },
        )
        .map_err(|e| BibleError::remote(format!("Failed to register fold_case: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Seed the database from a snapshot in one transaction.
    ///
    /// Existing rows with the same ids are updated in place.
    pub async fn import_snapshot(&self, snapshot: SyncSnapshot) -> Result<()> {
        self.run(move |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| BibleError::remote(e.to_string()))?;

            {
                let mut stmt = tx
                    .prepare(
                        r#"
                        INSERT INTO verses (id, book, chapter, verse, text, old_text, topic)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                        ON CONFLICT(id) DO UPDATE SET
                            book = excluded.book, chapter = excluded.chapter,
                            verse = excluded.verse, text = excluded.text,
                            old_text = excluded.old_text, topic = excluded.topic
                        "#,
                    )
                    .map_err(|e| BibleError::remote(e.to_string()))?;
                for v in &snapshot.verses {
                    stmt.execute(params![
                        v.id, v.book, v.chapter, v.verse, v.text, v.old_text, v.topic
                    ])
                    .map_err(|e| BibleError::remote(format!("Failed to import verse {}: {}", v.id, e)))?;
                }

                let mut stmt = tx
                    .prepare(
                        r#"
                        INSERT INTO themes (id, book, chapter, topic) VALUES (?1, ?2, ?3, ?4)
                        ON CONFLICT(id) DO UPDATE SET
                            book = excluded.book, chapter = excluded.chapter, topic = excluded.topic
                        "#,
                    )
                    .map_err(|e| BibleError::remote(e.to_string()))?;
                for t in &snapshot.themes {
                    stmt.execute(params![t.id, t.book, t.chapter, t.topic])
                        .map_err(|e| BibleError::remote(format!("Failed to import theme {}: {}", t.id, e)))?;
                }

                let mut stmt = tx
                    .prepare(
                        r#"
                        INSERT INTO commentaries (id, verse_id, author, text) VALUES (?1, ?2, ?3, ?4)
                        ON CONFLICT(id) DO UPDATE SET
                            verse_id = excluded.verse_id, author = excluded.author, text = excluded.text
                        "#,
                    )
                    .map_err(|e| BibleError::remote(e.to_string()))?;
                for c in &snapshot.commentaries {
                    stmt.execute(params![c.id, c.verse_id, c.author, c.text])
                        .map_err(|e| {
                            BibleError::remote(format!("Failed to import commentary {}: {}", c.id, e))
                        })?;
                }
            }

            tx.commit().map_err(|e| BibleError::remote(e.to_string()))?;

            info!(
                "Imported {} verses, {} themes, {} commentaries",
                snapshot.verses.len(),
                snapshot.themes.len(),
                snapshot.commentaries.len()
            );
            Ok(())
        })
        .await
    }

    /// Run a query on the blocking pool.
    async fn run<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| BibleError::remote(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| BibleError::internal(format!("Remote task failed: {}", e)))?
    }

    /// Run a SELECT and map every row.
    async fn select<T>(
        &self,
        sql: String,
        params: Vec<Value>,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>>
    where
        T: Send + 'static,
    {
        self.run(move |conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| BibleError::remote(e.to_string()))?;
            let rows = stmt
                .query_map(params_from_iter(params.iter()), map)
                .map_err(|e| BibleError::remote(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| BibleError::remote(e.to_string()))?;
            Ok(rows)
        })
        .await
    }

    fn row_to_verse(row: &Row<'_>) -> rusqlite::Result<Verse> {
        Ok(Verse {
            id: row.get(0)?,
            book: row.get(1)?,
            chapter: row.get(2)?,
            verse: row.get(3)?,
            text: row.get(4)?,
            old_text: row.get(5)?,
            topic: row.get(6)?,
        })
    }

    fn row_to_theme(row: &Row<'_>) -> rusqlite::Result<Theme> {
        Ok(Theme {
            id: row.get(0)?,
            book: row.get(1)?,
            chapter: row.get(2)?,
            topic: row.get(3)?,
        })
    }

    fn row_to_commentary(row: &Row<'_>) -> rusqlite::Result<Commentary> {
        Ok(Commentary {
            id: row.get(0)?,
            verse_id: row.get(1)?,
            author: row.get(2)?,
            text: row.get(3)?,
        })
    }
}

#[async_trait]
impl RemoteSource for SqliteRemote {
    async fn fetch_all_verses(&self) -> Result<Vec<Verse>> {
        self.select(
            format!("SELECT {} FROM verses ORDER BY id", VERSE_COLUMNS),
            Vec::new(),
            Self::row_to_verse,
        )
        .await
    }

    async fn fetch_all_commentaries(&self) -> Result<Vec<Commentary>> {
        self.select(
            "SELECT id, verse_id, author, text FROM commentaries ORDER BY id".to_string(),
            Vec::new(),
            Self::row_to_commentary,
        )
        .await
    }

    async fn fetch_all_themes(&self) -> Result<Vec<Theme>> {
        self.select(
            "SELECT id, book, chapter, topic FROM themes ORDER BY id".to_string(),
            Vec::new(),
            Self::row_to_theme,
        )
        .await
    }

    async fn get_verses(&self, book: &str, chapter: u32) -> Result<Vec<Verse>> {
        self.select(
            format!(
                "SELECT {} FROM verses WHERE book = ?1 AND chapter = ?2 ORDER BY verse",
                VERSE_COLUMNS
            ),
            vec![Value::Text(book.to_string()), Value::Integer(chapter.into())],
            Self::row_to_verse,
        )
        .await
    }

    async fn get_themes(&self, book: &str) -> Result<Vec<Theme>> {
        self.select(
            "SELECT id, book, chapter, topic FROM themes WHERE book = ?1 ORDER BY id".to_string(),
            vec![Value::Text(book.to_string())],
            Self::row_to_theme,
        )
        .await
    }

    async fn get_chapters(&self, book: &str) -> Result<Vec<u32>> {
        self.select(
            "SELECT DISTINCT chapter FROM verses WHERE book = ?1 ORDER BY chapter".to_string(),
            vec![Value::Text(book.to_string())],
            |row| row.get(0),
        )
        .await
    }

    async fn search(&self, text: &str, limit: usize) -> Result<Vec<Verse>> {
        debug!("Remote search for {:?}", text);
        self.select(
            format!(
                "SELECT {} FROM verses WHERE instr(fold_case(text), fold_case(?1)) > 0 ORDER BY id LIMIT ?2",
                VERSE_COLUMNS
            ),
            vec![Value::Text(text.to_string()), Value::Integer(limit as i64)],
            Self::row_to_verse,
        )
        .await
    }

    async fn get_commentaries(&self, verse_id: i64) -> Result<Vec<Commentary>> {
        self.select(
            "SELECT id, verse_id, author, text FROM commentaries WHERE verse_id = ?1 ORDER BY id"
                .to_string(),
            vec![Value::Integer(verse_id)],
            Self::row_to_commentary,
        )
        .await
    }

    async fn add_commentary(&self, commentary: &NewCommentary) -> Result<i64> {
        let commentary = commentary.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO commentaries (verse_id, author, text) VALUES (?1, ?2, ?3)",
                params![
                    commentary.verse_id,
                    commentary.author.trim(),
                    commentary.text.trim()
                ],
            )
            .map_err(|e| BibleError::remote(format!("Failed to insert commentary: {}", e)))?;

            let id = conn.last_insert_rowid();
            debug!("Inserted commentary {} for verse {}", id, commentary.verse_id);
            Ok(id)
        })
        .await
    }
}
