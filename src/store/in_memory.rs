use super::filter::Filter;
use super::traits::DocumentStore;
use super::{merge_fields, Document, DocumentId, Namespace, StoredDocument, UpdateReport};
use crate::error::{MigrationError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

type Collections = HashMap<Namespace, Vec<StoredDocument>>;

/// In-memory document store for development and tests.
///
/// Clones made with [`InMemoryStore::connect`] share the same data, so a
/// closed connection can be followed by a fresh one that still sees what
/// was written.
pub struct InMemoryStore {
    data: Arc<Mutex<Collections>>,
    closed: bool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            closed: false,
        }
    }

    /// New open connection over the same data
    pub fn connect(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            closed: false,
        }
    }

    fn collections(&self) -> Result<MutexGuard<'_, Collections>> {
        if self.closed {
            return Err(MigrationError::StoreUnavailable("connection closed".to_string()));
        }
        self.data
            .lock()
            .map_err(|_| MigrationError::store("in-memory store lock poisoned"))
    }
}

impl DocumentStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn insert_one(&self, namespace: &Namespace, document: Document) -> Result<DocumentId> {
        let id = Uuid::new_v4();
        let mut collections = self.collections()?;
        collections
            .entry(namespace.clone())
            .or_default()
            .push(StoredDocument { id, document });

        debug!("Inserted document {} into {}", id, namespace);
        Ok(id)
    }

    fn find(&self, namespace: &Namespace, filter: &Filter) -> Result<Vec<StoredDocument>> {
        let collections = self.collections()?;
        let found = collections
            .get(namespace)
            .map(|docs| {
                docs.iter()
                    .filter(|stored| filter.matches(&stored.document))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(found)
    }

    fn update_many(&self, namespace: &Namespace, filter: &Filter, fields: &Document) -> Result<UpdateReport> {
        let mut collections = self.collections()?;
        let mut report = UpdateReport::default();
        if let Some(docs) = collections.get_mut(namespace) {
            for stored in docs.iter_mut().filter(|s| filter.matches(&s.document)) {
                report.matched_count += 1;
                if merge_fields(&mut stored.document, fields) {
                    report.modified_count += 1;
                }
            }
        }
        Ok(report)
    }

    fn delete_many(&self, namespace: &Namespace, filter: &Filter) -> Result<u64> {
        let mut collections = self.collections()?;
        let Some(docs) = collections.get_mut(namespace) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|stored| !filter.matches(&stored.document));
        Ok((before - docs.len()) as u64)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::filter::field;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn ns() -> Namespace {
        Namespace::new("healthcare", "patients")
    }

    #[test]
    fn test_insert_find_update_delete() {
        let store = InMemoryStore::new();
        store.insert_one(&ns(), doc(json!({ "Name": "Alice", "Age": 30 }))).unwrap();
        store.insert_one(&ns(), doc(json!({ "Name": "Bob", "Age": 90 }))).unwrap();

        let seniors = store.find(&ns(), &field("Age").gte(88)).unwrap();
        assert_eq!(seniors.len(), 1);
        assert_eq!(seniors[0].document.get("Name"), Some(&json!("Bob")));

        let report = store
            .update_many(&ns(), &field("Name").eq("Alice"), &doc(json!({ "Age": 31 })))
            .unwrap();
        assert_eq!(report, UpdateReport { matched_count: 1, modified_count: 1 });

        assert_eq!(store.delete_many(&ns(), &Filter::all()).unwrap(), 2);
        assert_eq!(store.count_documents(&ns(), &Filter::all()).unwrap(), 0);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let store = InMemoryStore::new();
        store.insert_one(&ns(), doc(json!({ "Name": "Alice" }))).unwrap();

        let other = Namespace::new("healthcare", "archive");
        assert!(store.find(&other, &Filter::all()).unwrap().is_empty());
        assert_eq!(store.delete_many(&other, &Filter::all()).unwrap(), 0);
    }

    #[test]
    fn test_closed_connection_refuses_work_but_data_survives() {
        let mut store = InMemoryStore::new();
        store.insert_one(&ns(), doc(json!({ "Name": "Alice" }))).unwrap();
        let reopened = store.connect();

        store.close().unwrap();
        assert!(matches!(
            store.find(&ns(), &Filter::all()),
            Err(MigrationError::StoreUnavailable(_))
        ));
        assert_eq!(reopened.count_documents(&ns(), &Filter::all()).unwrap(), 1);
    }
}
