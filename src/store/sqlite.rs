use super::filter::Filter;
use super::traits::DocumentStore;
use super::{merge_fields, Document, DocumentId, Namespace, StoredDocument, UpdateReport};
use crate::error::{MigrationError, Result};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = r#"
    PRAGMA journal_mode=WAL;
    CREATE TABLE IF NOT EXISTS documents (
        seq             INTEGER PRIMARY KEY AUTOINCREMENT,
        id              TEXT NOT NULL UNIQUE,
        database_name   TEXT NOT NULL,
        collection_name TEXT NOT NULL,
        body            TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS documents_namespace
        ON documents (database_name, collection_name);
"#;

/// Documents stored as JSON text in a single SQLite table
pub struct SqliteStore {
    conn: Option<Connection>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the database file, creating parent directories
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                MigrationError::StoreUnavailable(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(&path)
            .map_err(|e| MigrationError::StoreUnavailable(format!("cannot open {}: {}", path.display(), e)))?;
        Self::init(conn, path)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| MigrationError::StoreUnavailable(e.to_string()))?;
        Self::init(conn, PathBuf::from(":memory:"))
    }

    fn init(conn: Connection, path: PathBuf) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| MigrationError::StoreUnavailable(format!("cannot prepare schema: {}", e)))?;
        info!("Opened SQLite document store at {}", path.display());
        Ok(Self { conn: Some(conn), path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| MigrationError::StoreUnavailable("connection closed".to_string()))
    }

    fn load_namespace(&self, namespace: &Namespace) -> Result<Vec<StoredDocument>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, body FROM documents
                 WHERE database_name = ?1 AND collection_name = ?2
                 ORDER BY seq",
            )
            .map_err(sql_error)?;
        let rows = stmt
            .query_map(params![namespace.database, namespace.collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(sql_error)?;

        let mut documents = Vec::new();
        for row in rows {
            let (id, body) = row.map_err(sql_error)?;
            let id = Uuid::parse_str(&id).map_err(|e| MigrationError::store(format!("bad document id '{}': {}", id, e)))?;
            let document: Document = serde_json::from_str(&body)?;
            documents.push(StoredDocument { id, document });
        }
        Ok(documents)
    }
}

fn sql_error(e: rusqlite::Error) -> MigrationError {
    MigrationError::store(e.to_string())
}

impl DocumentStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn insert_one(&self, namespace: &Namespace, document: Document) -> Result<DocumentId> {
        let conn = self.conn()?;
        let id = Uuid::new_v4();
        let body = serde_json::to_string(&document)?;
        conn.execute(
            "INSERT INTO documents (id, database_name, collection_name, body) VALUES (?1, ?2, ?3, ?4)",
            params![id.to_string(), namespace.database, namespace.collection, body],
        )
        .map_err(sql_error)?;

        debug!("Inserted document {} into {}", id, namespace);
        Ok(id)
    }

    fn find(&self, namespace: &Namespace, filter: &Filter) -> Result<Vec<StoredDocument>> {
        Ok(self
            .load_namespace(namespace)?
            .into_iter()
            .filter(|stored| filter.matches(&stored.document))
            .collect())
    }

    fn update_many(&self, namespace: &Namespace, filter: &Filter, fields: &Document) -> Result<UpdateReport> {
        let matched = self.find(namespace, filter)?;
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction().map_err(sql_error)?;

        let mut report = UpdateReport::default();
        for mut stored in matched {
            report.matched_count += 1;
            if merge_fields(&mut stored.document, fields) {
                let body = serde_json::to_string(&stored.document)?;
                tx.execute(
                    "UPDATE documents SET body = ?1 WHERE id = ?2",
                    params![body, stored.id.to_string()],
                )
                .map_err(sql_error)?;
                report.modified_count += 1;
            }
        }
        tx.commit().map_err(sql_error)?;
        Ok(report)
    }

    fn delete_many(&self, namespace: &Namespace, filter: &Filter) -> Result<u64> {
        let matched = self.find(namespace, filter)?;
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction().map_err(sql_error)?;

        let mut deleted = 0;
        for stored in &matched {
            deleted += tx
                .execute("DELETE FROM documents WHERE id = ?1", params![stored.id.to_string()])
                .map_err(sql_error)? as u64;
        }
        tx.commit().map_err(sql_error)?;
        Ok(deleted)
    }

    fn count_documents(&self, namespace: &Namespace, filter: &Filter) -> Result<u64> {
        if *filter != Filter::All {
            return Ok(self.find(namespace, filter)?.len() as u64);
        }
        let count: i64 = self
            .conn()?
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE database_name = ?1 AND collection_name = ?2",
                params![namespace.database, namespace.collection],
                |row| row.get(0),
            )
            .map_err(sql_error)?;
        Ok(count as u64)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| sql_error(e))?;
            debug!("Closed SQLite document store at {}", self.path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::filter::field;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn ns() -> Namespace {
        Namespace::new("healthcare", "patients")
    }

    #[test]
    fn test_documents_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store").join("patients.db");

        let mut store = SqliteStore::open(&path).unwrap();
        let id = store
            .insert_one(&ns(), doc(json!({ "Name": "Alice Brown", "Age": 30 })))
            .unwrap();
        store.close().unwrap();

        let reopened = SqliteStore::open(&path).unwrap();
        let found = reopened.find(&ns(), &field("Name").eq("Alice Brown")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
        assert_eq!(found[0].document.get("Age"), Some(&json!(30)));
    }

    #[test]
    fn test_update_counts_and_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_one(&ns(), doc(json!({ "Name": "Alice", "Room Number": 201 }))).unwrap();
        store.insert_one(&ns(), doc(json!({ "Name": "Bob", "Room Number": 105 }))).unwrap();

        let by_name = field("Name").eq("Alice");
        let fields = doc(json!({ "Room Number": 203 }));
        let first = store.update_many(&ns(), &by_name, &fields).unwrap();
        let second = store.update_many(&ns(), &by_name, &fields).unwrap();
        assert_eq!(first, UpdateReport { matched_count: 1, modified_count: 1 });
        assert_eq!(second, UpdateReport { matched_count: 1, modified_count: 0 });

        assert_eq!(store.delete_many(&ns(), &by_name).unwrap(), 1);
        assert_eq!(store.count_documents(&ns(), &Filter::all()).unwrap(), 1);
        assert_eq!(store.count_documents(&ns(), &field("Room Number").gt(100)).unwrap(), 1);
    }

    #[test]
    fn test_closed_store_is_unavailable() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.close().unwrap();
        assert!(matches!(
            store.insert_one(&ns(), Document::new()),
            Err(MigrationError::StoreUnavailable(_))
        ));
        assert!(store.close().is_ok());
    }
}
