//! SQLite-based local store implementation.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use bible_core::{
    BibleError, IndexName, LocalStore, Record, RecordKey, Result, ScanOutcome, StoreConfig,
    StoreName,
};

use crate::schema::{index_def, migrate, stored_version, SCHEMA_VERSION};

/// SQLite-backed object store.
///
/// Collections are tables of JSON documents. Cloning yields another handle
/// to the same connection. Store operations run on the blocking thread pool
/// via `spawn_blocking`.
#[derive(Clone)]
pub struct SqliteStore {
    /// Connection wrapped in blocking Mutex.
    conn: Arc<Mutex<Connection>>,

    /// Location of the database file.
    path: PathBuf,
}

impl SqliteStore {
    /// Open or create a store at the given path with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let config = StoreConfig {
            path: path.as_ref().to_path_buf(),
            ..StoreConfig::default()
        };
        Self::open_with_config(&config)
    }

    /// Open or create a store, upgrading its schema if needed.
    pub fn open_with_config(config: &StoreConfig) -> Result<Self> {
        let path = config.path.as_path();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| BibleError::database(format!("Failed to open database: {}", e)))?;

        Self::configure_connection(&conn, config)?;
        Self::init(conn, path)
    }

    /// Open an in-memory store (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            BibleError::database(format!("Failed to open in-memory database: {}", e))
        })?;

        Self::init(conn, Path::new(":memory:"))
    }

    fn init(mut conn: Connection, path: &Path) -> Result<Self> {
        let previous = migrate(&mut conn, SCHEMA_VERSION)?;
        if previous < SCHEMA_VERSION {
            debug!("Store schema at version {} (was {})", SCHEMA_VERSION, previous);
        }

        info!("Local store opened at {:?}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_path_buf(),
        })
    }

    fn configure_connection(conn: &Connection, config: &StoreConfig) -> Result<()> {
        let journal = if config.wal_mode { "WAL" } else { "DELETE" };
        conn.execute_batch(&format!(
            r#"
            PRAGMA journal_mode = {};
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = {};
            PRAGMA busy_timeout = {};
            PRAGMA temp_store = MEMORY;
            "#,
            journal, config.cache_size, config.busy_timeout_ms
        ))
        .map_err(|e| BibleError::database(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    /// Path the store was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schema version recorded in the database.
    pub async fn schema_version(&self) -> Result<u32> {
        self.run(|conn| stored_version(conn)).await
    }

    /// Whether the SQLite index backing `index` on `store` exists.
    pub async fn has_index(&self, store: StoreName, index: IndexName) -> Result<bool> {
        let def = index_def(store, index).ok_or_else(|| BibleError::IndexNotFound {
            store: store.to_string(),
            index: index.to_string(),
        })?;
        let name = def.sql_name();

        self.run(move |conn| {
            conn.query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1",
                params![name],
                |_| Ok(()),
            )
            .optional()
            .map(|found| found.is_some())
            .map_err(|e| BibleError::database(e.to_string()))
        })
        .await
    }

    /// Number of records in a collection.
    pub async fn count(&self, store: StoreName) -> Result<u64> {
        self.run(move |conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", store), [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as u64)
            .map_err(|e| BibleError::database(e.to_string()))
        })
        .await
    }

    /// Run an operation on the blocking pool, off the async executor.
    async fn run<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| BibleError::database(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| BibleError::internal(format!("Store task failed: {}", e)))?
    }

    fn key_value(key: &RecordKey) -> Value {
        match key {
            RecordKey::Int(v) => Value::Integer(*v),
            RecordKey::Text(v) => Value::Text(v.clone()),
        }
    }

    /// Decode a stored document, validating field presence.
    fn decode<R: Record>(raw: &str) -> Result<R> {
        serde_json::from_str(raw).map_err(|e| BibleError::invalid_record(R::STORE, e.to_string()))
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn bulk_write<R: Record>(&self, records: &[R]) -> Result<()> {
        // Validate and encode everything before the transaction opens.
        let rows = records
            .iter()
            .map(|record| -> Result<(Value, String)> {
                record.validate()?;
                Ok((Self::key_value(&record.key()), serde_json::to_string(record)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let store = R::STORE;
        self.run(move |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| BibleError::database(e.to_string()))?;

            {
                let mut stmt = tx
                    .prepare(&format!(
                        "INSERT OR REPLACE INTO {} (pk, doc) VALUES (?1, ?2)",
                        store
                    ))
                    .map_err(|e| BibleError::database(e.to_string()))?;

                for (key, doc) in &rows {
                    stmt.execute(params![key, doc]).map_err(|e| {
                        BibleError::database(format!("Failed to write to {}: {}", store, e))
                    })?;
                }
            }

            tx.commit()
                .map_err(|e| BibleError::database(e.to_string()))?;

            debug!("Wrote {} records to {}", rows.len(), store);
            Ok(())
        })
        .await
    }

    async fn get_by_key<R: Record>(&self, key: &RecordKey) -> Result<Option<R>> {
        let key = Self::key_value(key);
        self.run(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    &format!("SELECT doc FROM {} WHERE pk = ?1", R::STORE),
                    params![key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| BibleError::database(e.to_string()))?;

            raw.as_deref().map(Self::decode::<R>).transpose()
        })
        .await
    }

    async fn get_all<R: Record>(&self) -> Result<Vec<R>> {
        self.run(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT doc FROM {} ORDER BY pk", R::STORE))
                .map_err(|e| BibleError::database(e.to_string()))?;

            let docs = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| BibleError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| BibleError::database(e.to_string()))?;

            docs.iter().map(|raw| Self::decode::<R>(raw)).collect()
        })
        .await
    }

    async fn query_by_index<R: Record>(
        &self,
        index: IndexName,
        key: &[RecordKey],
    ) -> Result<Vec<R>> {
        let def = index_def(R::STORE, index).ok_or_else(|| BibleError::IndexNotFound {
            store: R::STORE.to_string(),
            index: index.to_string(),
        })?;

        if key.len() != def.key_paths.len() {
            return Err(BibleError::invalid_argument(format!(
                "Index {} on {} takes {} key parts, got {}",
                index,
                R::STORE,
                def.key_paths.len(),
                key.len()
            )));
        }

        let sql = format!(
            "SELECT doc FROM {} WHERE {} ORDER BY pk",
            R::STORE,
            def.where_clause()
        );
        let values: Vec<Value> = key.iter().map(Self::key_value).collect();

        self.run(move |conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| BibleError::database(e.to_string()))?;

            let docs = stmt
                .query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))
                .map_err(|e| BibleError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| BibleError::database(e.to_string()))?;

            docs.iter().map(|raw| Self::decode::<R>(raw)).collect()
        })
        .await
    }

    async fn full_scan<R, F>(&self, predicate: F, limit: usize) -> Result<ScanOutcome<R>>
    where
        R: Record,
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        if limit == 0 {
            return Ok(ScanOutcome {
                records: Vec::new(),
                visited: 0,
            });
        }

        self.run(move |conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT doc FROM {} ORDER BY pk", R::STORE))
                .map_err(|e| BibleError::database(e.to_string()))?;
            let mut rows = stmt
                .query([])
                .map_err(|e| BibleError::database(e.to_string()))?;

            let mut records = Vec::new();
            let mut visited = 0;

            while let Some(row) = rows.next().map_err(|e| BibleError::database(e.to_string()))? {
                visited += 1;
                let raw: String = row.get(0).map_err(|e| BibleError::database(e.to_string()))?;
                let record = Self::decode::<R>(&raw)?;
                if predicate(&record) {
                    records.push(record);
                    if records.len() >= limit {
                        break;
                    }
                }
            }

            debug!(
                "Scanned {} records of {}, {} matched",
                visited,
                R::STORE,
                records.len()
            );
            Ok(ScanOutcome { records, visited })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bible_core::{Commentary, SyncStatus, Theme, Verse, SYNC_STATUS_KEY};

    const BOOK: &str = "მათეს სახარება";

    fn verses(chapter: u32, count: u32, first_id: i64) -> Vec<Verse> {
        (0..count)
            .map(|i| {
                Verse::new(
                    first_id + i as i64,
                    BOOK,
                    chapter,
                    i + 1,
                    &format!("chapter {} verse {}", chapter, i + 1),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_open_memory() {
        let store = SqliteStore::open_memory().unwrap();
        assert_eq!(store.schema_version().await.unwrap(), SCHEMA_VERSION);
        assert!(store.get_all::<Theme>().await.unwrap().is_empty());
        assert!(store.has_index(StoreName::Verses, IndexName::BookChapter).await.unwrap());
    }

    #[tokio::test]
    async fn test_bulk_write_is_an_upsert() {
        let store = SqliteStore::open_memory().unwrap();

        store.bulk_write(&verses(1, 3, 1)).await.unwrap();
        let mut changed = verses(1, 3, 1);
        changed[0].text = "rewritten".to_string();
        store.bulk_write(&changed).await.unwrap();

        assert_eq!(store.count(StoreName::Verses).await.unwrap(), 3);
        let first: Verse = store.get_by_key(&RecordKey::Int(1)).await.unwrap().unwrap();
        assert_eq!(first.text, "rewritten");
    }

    #[tokio::test]
    async fn test_bulk_write_is_all_or_nothing() {
        let store = SqliteStore::open_memory().unwrap();

        let mut batch = verses(1, 3, 1);
        batch[2].book = String::new();
        assert!(store.bulk_write(&batch).await.is_err());
        assert_eq!(store.count(StoreName::Verses).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_by_key_absent() {
        let store = SqliteStore::open_memory().unwrap();
        let status: Option<SyncStatus> = store
            .get_by_key(&RecordKey::from(SYNC_STATUS_KEY))
            .await
            .unwrap();
        assert!(status.is_none());
    }

    #[tokio::test]
    async fn test_text_keys() {
        let store = SqliteStore::open_memory().unwrap();
        store.bulk_write(&[SyncStatus::completed_now()]).await.unwrap();

        let status: SyncStatus = store
            .get_by_key(&RecordKey::from(SYNC_STATUS_KEY))
            .await
            .unwrap()
            .unwrap();
        assert!(status.completed);
    }

    #[tokio::test]
    async fn test_query_by_index() {
        let store = SqliteStore::open_memory().unwrap();
        store.bulk_write(&verses(1, 4, 1)).await.unwrap();
        store.bulk_write(&verses(2, 2, 100)).await.unwrap();
        store
            .bulk_write(&[Verse::new(500, "იოანეს სახარება", 1, 1, "other book")])
            .await
            .unwrap();

        let chapter_two: Vec<Verse> = store
            .query_by_index(IndexName::BookChapter, &[BOOK.into(), 2u32.into()])
            .await
            .unwrap();
        assert_eq!(chapter_two.len(), 2);
        assert!(chapter_two.iter().all(|v| v.chapter == 2 && v.book == BOOK));

        let whole_book: Vec<Verse> = store
            .query_by_index(IndexName::Book, &[BOOK.into()])
            .await
            .unwrap();
        assert_eq!(whole_book.len(), 6);
    }

    #[tokio::test]
    async fn test_query_by_index_rejects_bad_requests() {
        let store = SqliteStore::open_memory().unwrap();

        let wrong_arity = store
            .query_by_index::<Verse>(IndexName::BookChapter, &[BOOK.into()])
            .await;
        assert!(matches!(wrong_arity, Err(BibleError::InvalidArgument { .. })));

        let unknown = store
            .query_by_index::<Commentary>(IndexName::Book, &[BOOK.into()])
            .await;
        assert!(matches!(unknown, Err(BibleError::IndexNotFound { .. })));
    }

    #[tokio::test]
    async fn test_commentaries_by_verse() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .bulk_write(&[
                Commentary {
                    id: 1,
                    verse_id: 10,
                    author: "a".to_string(),
                    text: "first".to_string(),
                },
                Commentary {
                    id: 2,
                    verse_id: 11,
                    author: "b".to_string(),
                    text: "second".to_string(),
                },
            ])
            .await
            .unwrap();

        let found: Vec<Commentary> = store
            .query_by_index(IndexName::VerseId, &[10i64.into()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "first");
    }

    #[tokio::test]
    async fn test_full_scan_stops_at_limit() {
        let store = SqliteStore::open_memory().unwrap();
        store.bulk_write(&verses(1, 100, 1)).await.unwrap();

        let outcome: ScanOutcome<Verse> = store
            .full_scan(|v: &Verse| v.verse % 2 == 0, 5)
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 5);
        assert_eq!(outcome.visited, 10);

        let none: ScanOutcome<Verse> = store.full_scan(|_: &Verse| true, 0).await.unwrap();
        assert_eq!(none.visited, 0);
    }

    #[tokio::test]
    async fn test_corrupt_document_is_reported() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .run(|conn| {
                conn.execute(
                    "INSERT INTO verses (pk, doc) VALUES (1, '{\"id\":1}')",
                    [],
                )
                .map_err(|e| BibleError::database(e.to_string()))
            })
            .await
            .unwrap();

        let result = store.get_by_key::<Verse>(&RecordKey::Int(1)).await;
        assert!(matches!(result, Err(BibleError::InvalidRecord { .. })));
    }

    #[tokio::test]
    async fn test_upgrade_adds_missing_indexes_without_data_loss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.db");

        // A database written by schema version 1: collections, no indexes.
        {
            let mut conn = Connection::open(&path).unwrap();
            migrate(&mut conn, 1).unwrap();
            for v in verses(3, 5, 1) {
                conn.execute(
                    "INSERT INTO verses (pk, doc) VALUES (?1, ?2)",
                    params![v.id, serde_json::to_string(&v).unwrap()],
                )
                .unwrap();
            }
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.schema_version().await.unwrap(), SCHEMA_VERSION);
        assert!(store.has_index(StoreName::Verses, IndexName::BookChapter).await.unwrap());
        assert!(store.has_index(StoreName::Commentaries, IndexName::VerseId).await.unwrap());

        for id in 1..=5 {
            let v: Option<Verse> = store.get_by_key(&RecordKey::Int(id)).await.unwrap();
            assert!(v.is_some(), "verse {} lost during upgrade", id);
        }

        let chapter: Vec<Verse> = store
            .query_by_index(IndexName::BookChapter, &[BOOK.into(), 3u32.into()])
            .await
            .unwrap();
        assert_eq!(chapter.len(), 5);
    }

    #[tokio::test]
    async fn test_reopen_returns_equivalent_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("local.db");

        let first = SqliteStore::open(&path).unwrap();
        first.bulk_write(&verses(1, 2, 1)).await.unwrap();

        let second = SqliteStore::open(&path).unwrap();
        assert_eq!(second.count(StoreName::Verses).await.unwrap(), 2);
        assert_eq!(second.schema_version().await.unwrap(), SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_diagnostics_wait_off_the_executor() {
        let store = SqliteStore::open_memory().unwrap();

        // Hold the connection from another thread for a while.
        let conn = Arc::clone(&store.conn);
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            let _guard = conn.lock().unwrap();
            locked_tx.send(()).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(200));
        });
        locked_rx.recv().unwrap();

        let order = Mutex::new(Vec::new());
        tokio::join!(
            async {
                store.count(StoreName::Verses).await.unwrap();
                order.lock().unwrap().push("count");
            },
            async {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                order.lock().unwrap().push("timer");
            }
        );
        holder.join().unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["timer", "count"]);
    }
}
