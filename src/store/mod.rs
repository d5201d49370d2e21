// Document store boundary: trait, backends, filters and connection handling

pub mod connection;
pub mod filter;
pub mod handle;
pub mod in_memory;
#[cfg(feature = "mongodb")]
pub mod mongo;
pub mod sqlite;
pub mod traits;

pub use connection::ConnectionString;
pub use filter::{field, Filter, Predicate};
pub use handle::StoreHandle;
pub use in_memory::InMemoryStore;
#[cfg(feature = "mongodb")]
pub use mongo::MongoStore;
pub use sqlite::SqliteStore;
pub use traits::DocumentStore;

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A stored document: JSON object keyed by field name
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Store-assigned document identity
pub type DocumentId = Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: DocumentId,
    pub document: Document,
}

/// Database name plus collection name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub matched_count: u64,
    /// Documents where at least one value actually changed
    pub modified_count: u64,
}

/// Merge `fields` into `document`; true if any value changed
pub(crate) fn merge_fields(document: &mut Document, fields: &Document) -> bool {
    let mut changed = false;
    for (key, value) in fields {
        if document.get(key) != Some(value) {
            document.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_reports_real_changes_only() {
        let mut document = json!({ "Name": "Alice Brown", "Room Number": 201 })
            .as_object()
            .cloned()
            .unwrap();
        let fields = json!({ "Room Number": 203 }).as_object().cloned().unwrap();

        assert!(merge_fields(&mut document, &fields));
        assert_eq!(document.get("Room Number"), Some(&json!(203)));
        assert_eq!(document.get("Name"), Some(&json!("Alice Brown")));
        assert!(!merge_fields(&mut document, &fields));
    }

    #[test]
    fn test_namespace_display() {
        assert_eq!(Namespace::new("healthcare", "patients").to_string(), "healthcare.patients");
    }
}
