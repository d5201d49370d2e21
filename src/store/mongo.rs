//! MongoDB backend over the driver's blocking API.
//!
//! Document ids are stored in `_id` as UUID strings. Documents written by
//! other tools with an ObjectId `_id` are read back under an id derived from
//! the ObjectId bytes.

use super::connection::ConnectionString;
use super::filter::{Filter, Predicate};
use super::traits::DocumentStore;
use super::{Document, DocumentId, Namespace, StoredDocument, UpdateReport};
use crate::error::{MigrationError, Result};
use mongodb::bson::{doc, oid::ObjectId, Bson, Document as BsonDocument};
use mongodb::error::{Error as DriverError, ErrorKind};
use mongodb::options::{FindOptions, InsertManyOptions};
use mongodb::sync::{Client, Collection};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

const ID_FIELD: &str = "_id";

pub struct MongoStore {
    client: Option<Client>,
    description: String,
}

impl MongoStore {
    /// Connect and ping the deployment so an unreachable server fails here
    pub fn connect(uri: &str) -> Result<Self> {
        let description = ConnectionString::parse(uri)?.to_string();
        let client = Client::with_uri_str(uri).map_err(|e| match &*e.kind {
            ErrorKind::InvalidArgument { .. } => {
                MigrationError::InvalidConnectionString(format!("rejected by the mongodb driver: {}", description))
            }
            _ => MigrationError::StoreUnavailable(format!("cannot reach {}: {}", description, e)),
        })?;
        client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .map_err(|e| MigrationError::StoreUnavailable(format!("cannot reach {}: {}", description, e)))?;

        info!("Opened MongoDB document store at {}", description);
        Ok(Self {
            client: Some(client),
            description,
        })
    }

    fn collection(&self, namespace: &Namespace) -> Result<Collection<BsonDocument>> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| MigrationError::StoreUnavailable("connection closed".to_string()))?;
        Ok(client
            .database(&namespace.database)
            .collection::<BsonDocument>(&namespace.collection))
    }
}

impl DocumentStore for MongoStore {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    fn insert_one(&self, namespace: &Namespace, document: Document) -> Result<DocumentId> {
        let id = Uuid::new_v4();
        self.collection(namespace)?
            .insert_one(to_bson_document(id, &document)?, None)
            .map_err(driver_error)?;

        debug!("Inserted document {} into {}", id, namespace);
        Ok(id)
    }

    /// One ordered `insertMany`. The driver reports the index of the first
    /// failed write; everything before it is committed.
    fn insert_many(&self, namespace: &Namespace, documents: Vec<Document>) -> Result<Vec<DocumentId>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<DocumentId> = documents.iter().map(|_| Uuid::new_v4()).collect();
        let bodies = ids
            .iter()
            .zip(&documents)
            .map(|(id, document)| to_bson_document(*id, document))
            .collect::<Result<Vec<_>>>()?;

        let options = InsertManyOptions::builder().ordered(true).build();
        self.collection(namespace)?
            .insert_many(bodies, options)
            .map_err(insert_error)?;

        debug!("Inserted {} document(s) into {}", ids.len(), namespace);
        Ok(ids)
    }

    fn find(&self, namespace: &Namespace, filter: &Filter) -> Result<Vec<StoredDocument>> {
        let options = FindOptions::builder().sort(doc! { "$natural": 1 }).build();
        let cursor = self
            .collection(namespace)?
            .find(to_bson_filter(filter)?, options)
            .map_err(driver_error)?;

        cursor
            .map(|found| found.map_err(driver_error).and_then(from_bson_document))
            .collect()
    }

    fn update_many(&self, namespace: &Namespace, filter: &Filter, fields: &Document) -> Result<UpdateReport> {
        if fields.is_empty() {
            return Ok(UpdateReport {
                matched_count: self.count_documents(namespace, filter)?,
                modified_count: 0,
            });
        }
        let set = mongodb::bson::to_document(fields).map_err(|e| MigrationError::store(e.to_string()))?;
        let result = self
            .collection(namespace)?
            .update_many(to_bson_filter(filter)?, doc! { "$set": set }, None)
            .map_err(driver_error)?;

        Ok(UpdateReport {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    fn delete_many(&self, namespace: &Namespace, filter: &Filter) -> Result<u64> {
        let result = self
            .collection(namespace)?
            .delete_many(to_bson_filter(filter)?, None)
            .map_err(driver_error)?;
        Ok(result.deleted_count)
    }

    fn count_documents(&self, namespace: &Namespace, filter: &Filter) -> Result<u64> {
        self.collection(namespace)?
            .count_documents(to_bson_filter(filter)?, None)
            .map_err(driver_error)
    }

    fn close(&mut self) -> Result<()> {
        if self.client.take().is_some() {
            debug!("Closed MongoDB document store at {}", self.description);
        }
        Ok(())
    }
}

/// Translate a filter tree into a MongoDB query document
pub fn to_bson_filter(filter: &Filter) -> Result<BsonDocument> {
    Ok(match filter {
        Filter::All => BsonDocument::new(),
        Filter::And(filters) if filters.is_empty() => BsonDocument::new(),
        // Every document has an _id, so this matches nothing
        Filter::Or(filters) if filters.is_empty() => doc! { "_id": { "$exists": false } },
        Filter::And(filters) => doc! { "$and": combine(filters)? },
        Filter::Or(filters) => doc! { "$or": combine(filters)? },
        Filter::Field { field, predicate } => {
            let condition = match predicate {
                // `{field: null}` also matches a missing field
                Predicate::Eq(Value::Null) => Bson::Null,
                Predicate::Eq(v) => Bson::Document(doc! { "$eq": to_bson_value(v)? }),
                Predicate::Gt(v) => Bson::Document(doc! { "$gt": to_bson_value(v)? }),
                Predicate::Gte(v) => Bson::Document(doc! { "$gte": to_bson_value(v)? }),
                Predicate::Lt(v) => Bson::Document(doc! { "$lt": to_bson_value(v)? }),
                Predicate::Lte(v) => Bson::Document(doc! { "$lte": to_bson_value(v)? }),
                Predicate::Exists(present) => Bson::Document(doc! { "$exists": *present }),
            };
            let mut query = BsonDocument::new();
            query.insert(field.clone(), condition);
            query
        }
    })
}

fn combine(filters: &[Filter]) -> Result<Vec<Bson>> {
    filters
        .iter()
        .map(|f| to_bson_filter(f).map(Bson::Document))
        .collect()
}

fn to_bson_value(value: &Value) -> Result<Bson> {
    mongodb::bson::to_bson(value).map_err(|e| MigrationError::store(format!("cannot encode {}: {}", value, e)))
}

fn to_bson_document(id: DocumentId, document: &Document) -> Result<BsonDocument> {
    let mut body = BsonDocument::new();
    body.insert(ID_FIELD, id.to_string());
    for (key, value) in document.iter().filter(|(key, _)| key.as_str() != ID_FIELD) {
        body.insert(key.clone(), to_bson_value(value)?);
    }
    Ok(body)
}

fn from_bson_document(mut body: BsonDocument) -> Result<StoredDocument> {
    let id = match body.remove(ID_FIELD) {
        Some(Bson::String(id)) => {
            Uuid::parse_str(&id).map_err(|e| MigrationError::store(format!("bad document id '{}': {}", id, e)))?
        }
        Some(Bson::ObjectId(oid)) => object_id_uuid(oid),
        other => return Err(MigrationError::store(format!("unsupported document id {:?}", other))),
    };
    let document = body
        .into_iter()
        .map(|(key, value)| (key, value.into_relaxed_extjson()))
        .collect();
    Ok(StoredDocument { id, document })
}

/// ObjectId bytes padded to a UUID
fn object_id_uuid(oid: ObjectId) -> Uuid {
    let mut bytes = [0u8; 16];
    bytes[..12].copy_from_slice(&oid.bytes());
    Uuid::from_bytes(bytes)
}

/// Ordered insert failures carry the index of the first rejected document
fn insert_error(e: DriverError) -> MigrationError {
    if let ErrorKind::BulkWrite(failure) = &*e.kind {
        if let Some(first) = failure
            .write_errors
            .as_ref()
            .and_then(|errors| errors.iter().min_by_key(|w| w.index))
        {
            return MigrationError::PartialInsert {
                inserted_count: first.index,
                failed_at: first.index,
                message: first.message.clone(),
            };
        }
    }
    driver_error(e)
}

fn driver_error(e: DriverError) -> MigrationError {
    match &*e.kind {
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::Authentication { .. } => MigrationError::StoreUnavailable(e.to_string()),
        _ => MigrationError::store(e.to_string()),
    }
}
