use super::filter::Filter;
use super::{Document, DocumentId, Namespace, StoredDocument, UpdateReport};
use crate::error::{MigrationError, Result};
use tracing::debug;

/// Document store backing a migration: the handful of operations the loader needs,
/// all addressed by namespace and filter
pub trait DocumentStore: Send {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    fn insert_one(&self, namespace: &Namespace, document: Document) -> Result<DocumentId>;

    /// Ordered insert. Documents before a failure stay committed and the
    /// failure reports how many there were.
    fn insert_many(&self, namespace: &Namespace, documents: Vec<Document>) -> Result<Vec<DocumentId>> {
        let mut ids = Vec::with_capacity(documents.len());
        for (position, document) in documents.into_iter().enumerate() {
            match self.insert_one(namespace, document) {
                Ok(id) => ids.push(id),
                Err(MigrationError::StoreUnavailable(message)) if ids.is_empty() => {
                    return Err(MigrationError::StoreUnavailable(message));
                }
                Err(e) => {
                    return Err(MigrationError::PartialInsert {
                        inserted_count: ids.len(),
                        failed_at: position,
                        message: e.to_string(),
                    });
                }
            }
        }
        debug!("Inserted {} document(s) into {}", ids.len(), namespace);
        Ok(ids)
    }

    /// Matching documents in insertion order
    fn find(&self, namespace: &Namespace, filter: &Filter) -> Result<Vec<StoredDocument>>;

    /// Merge `fields` into every matching document, leaving other fields alone
    fn update_many(&self, namespace: &Namespace, filter: &Filter, fields: &Document) -> Result<UpdateReport>;

    fn delete_many(&self, namespace: &Namespace, filter: &Filter) -> Result<u64>;

    fn count_documents(&self, namespace: &Namespace, filter: &Filter) -> Result<u64> {
        Ok(self.find(namespace, filter)?.len() as u64)
    }

    /// Release the connection; later calls fail with `StoreUnavailable`
    fn close(&mut self) -> Result<()>;
}
