use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use serde_json::{Map, Value};

use crate::error::{IngestError, Result};

pub const VISITED_COMPANIES: &str = "visited_companies";
pub const VISIT_ATTRIBUTES: &str = "visit_attributes";
pub const MAIL: &str = "mail";

/// A flat field → scalar mapping, the unit the store persists.
pub type Document = Map<String, Value>;

/// The two primitives ingestion needs from persistence.
///
/// Both are synchronous and individually atomic.
pub trait DocumentStore {
    fn insert(&self, collection: &str, doc: &Document) -> Result<()>;

    /// Remove the first document of `collection` whose `key_field` equals
    /// `key_value`, and return it.
    fn find_and_remove(
        &self,
        collection: &str,
        key_field: &str,
        key_value: &str,
    ) -> Result<Option<Document>>;
}

/// Document collections kept in a single SQLite table as JSON bodies.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {:?}", dir))?;
        }
        let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = SqliteStore { conn };
        store.init_schema()?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Self {
        let store = SqliteStore {
            conn: Connection::open_in_memory().unwrap(),
        };
        store.init_schema().unwrap();
        store
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                id          INTEGER PRIMARY KEY,
                collection  TEXT NOT NULL,
                body        TEXT NOT NULL,
                inserted_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
            ",
        )?;
        Ok(())
    }

    pub fn count(&self, collection: &str) -> Result<usize> {
        let n: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            [collection],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    /// All documents of `collection`, oldest first.
    pub fn fetch_all(&self, collection: &str) -> Result<Vec<Document>> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM documents WHERE collection = ?1 ORDER BY id")?;
        let bodies = stmt
            .query_map([collection], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        bodies.iter().map(|b| decode(b)).collect()
    }
}

impl DocumentStore for SqliteStore {
    fn insert(&self, collection: &str, doc: &Document) -> Result<()> {
        let body = serde_json::to_string(doc)?;
        self.conn.execute(
            "INSERT INTO documents (collection, body) VALUES (?1, ?2)",
            rusqlite::params![collection, body],
        )?;
        Ok(())
    }

    fn find_and_remove(
        &self,
        collection: &str,
        key_field: &str,
        key_value: &str,
    ) -> Result<Option<Document>> {
        // Single statement, so the lookup and the delete cannot interleave
        // with another writer.
        let body: Option<String> = self
            .conn
            .query_row(
                "DELETE FROM documents
                 WHERE id = (
                     SELECT id FROM documents
                     WHERE collection = ?1 AND json_extract(body, '$.' || ?2) = ?3
                     ORDER BY id LIMIT 1
                 )
                 RETURNING body",
                rusqlite::params![collection, key_field, key_value],
                |row| row.get(0),
            )
            .optional()?;
        body.as_deref().map(decode).transpose()
    }
}

fn decode(body: &str) -> Result<Document> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(map) => Ok(map),
        other => Err(IngestError::RecordRejected(format!(
            "stored body is not an object: {}",
            other
        ))),
    }
}
