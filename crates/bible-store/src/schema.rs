//! Collection layout, index definitions and schema migrations.

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::info;

use bible_core::{BibleError, IndexName, Result, StoreName};

/// Schema version this build expects.
///
/// 1: one table per collection.
/// 2: secondary key-path indexes.
pub const SCHEMA_VERSION: u32 = 2;

/// A secondary index over JSON key paths of a collection's documents.
#[derive(Debug, Clone, Copy)]
pub struct IndexDef {
    pub store: StoreName,
    pub name: IndexName,
    pub key_paths: &'static [&'static str],
}

/// Every secondary index the store maintains.
pub const INDEXES: &[IndexDef] = &[
    IndexDef {
        store: StoreName::Verses,
        name: IndexName::BookChapter,
        key_paths: &["$.book", "$.chapter"],
    },
    IndexDef {
        store: StoreName::Verses,
        name: IndexName::Book,
        key_paths: &["$.book"],
    },
    IndexDef {
        store: StoreName::Themes,
        name: IndexName::Book,
        key_paths: &["$.book"],
    },
    IndexDef {
        store: StoreName::Themes,
        name: IndexName::BookChapter,
        key_paths: &["$.book", "$.chapter"],
    },
    IndexDef {
        store: StoreName::Commentaries,
        name: IndexName::VerseId,
        key_paths: &["$.verse_id"],
    },
];

/// Find the definition of `name` on `store`.
pub fn index_def(store: StoreName, name: IndexName) -> Option<&'static IndexDef> {
    INDEXES.iter().find(|d| d.store == store && d.name == name)
}

impl IndexDef {
    /// Name of the SQLite index object.
    pub fn sql_name(&self) -> String {
        format!("idx_{}_{}", self.store, self.name)
    }

    fn expressions(&self) -> Vec<String> {
        self.key_paths
            .iter()
            .map(|path| format!("json_extract(doc, '{}')", path))
            .collect()
    }

    /// `CREATE INDEX` statement for this definition.
    pub fn create_sql(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {}({})",
            self.sql_name(),
            self.store,
            self.expressions().join(", ")
        )
    }

    /// `WHERE` clause matching a full key tuple bound as ?1, ?2, ...
    ///
    /// Uses the same expressions as the index so SQLite can pick it.
    pub fn where_clause(&self) -> String {
        self.expressions()
            .iter()
            .enumerate()
            .map(|(i, expr)| format!("{} = ?{}", expr, i + 1))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

fn create_collections(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    for store in StoreName::ALL {
        // Untyped key column keeps integer and text keys as they are.
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (pk NOT NULL PRIMARY KEY, doc TEXT NOT NULL)",
            store
        ))?;
    }
    Ok(())
}

fn create_indexes(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    for def in INDEXES {
        tx.execute_batch(&def.create_sql())?;
    }
    Ok(())
}

struct Migration {
    version: u32,
    description: &'static str,
    apply: fn(&Transaction<'_>) -> rusqlite::Result<()>,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create collections",
        apply: create_collections,
    },
    Migration {
        version: 2,
        description: "create secondary indexes",
        apply: create_indexes,
    },
];

/// Read the stored schema version.
pub(crate) fn stored_version(conn: &Connection) -> Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get::<_, u32>(0))
        .map_err(|e| BibleError::database(format!("Failed to read schema version: {}", e)))
}

/// Upgrade the database to `target`, returning the version it was at.
///
/// Runs only the migrations above the stored version, all in one immediate
/// transaction so concurrent openers serialize on it. Every migration is
/// additive and idempotent; existing rows are never touched.
pub fn migrate(conn: &mut Connection, target: u32) -> Result<u32> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| BibleError::database(format!("Failed to begin migration: {}", e)))?;

    let current = stored_version(&tx)?;

    if current > target {
        return Err(BibleError::database(format!(
            "Database schema version {} is newer than supported version {}",
            current, target
        )));
    }

    if current == target {
        return Ok(current);
    }

    for migration in MIGRATIONS
        .iter()
        .filter(|m| m.version > current && m.version <= target)
    {
        info!(
            "Applying schema migration {}: {}",
            migration.version, migration.description
        );
        (migration.apply)(&tx).map_err(|e| {
            BibleError::database(format!(
                "Migration {} failed: {}",
                migration.version, e
            ))
        })?;
    }

    tx.execute_batch(&format!("PRAGMA user_version = {}", target))
        .map_err(|e| BibleError::database(format!("Failed to record schema version: {}", e)))?;

    tx.commit()
        .map_err(|e| BibleError::database(format!("Failed to commit migration: {}", e)))?;

    info!("Schema upgraded from version {} to {}", current, target);
    Ok(current)
}
