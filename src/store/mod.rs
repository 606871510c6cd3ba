//! Document database access.
//!
//! `DocumentStore` is an enum over backends, following the same enum-dispatch
//! shape as `LlmProvider`: `Mongo` talks to a real server, `Fixture` serves
//! canned documents for tests. Only read operations exist on purpose; there is
//! no write path to gate.

pub mod fixture;
pub mod mongo;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use mongodb::bson::{self, Bson, Document};

use crate::config::DatabaseConfig;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot connect to database: {0}")]
    Connect(String),
    #[error("query on `{collection}` failed: {message}")]
    Query { collection: String, message: String },
}

impl StoreError {
    pub(crate) fn query(collection: &str, err: impl std::fmt::Display) -> Self {
        StoreError::Query { collection: collection.to_string(), message: err.to_string() }
    }
}

// ── Schema types ──────────────────────────────────────────────────────────────

/// One field of a collection and the BSON type name inferred from a sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldType {
    pub name: String,
    pub type_name: String,
}

/// Schema summary of one collection, inferred from a single sample document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub description: String,
    /// Fields in sample-document order.
    pub fields: Vec<FieldType>,
    pub doc_count: u64,
    pub indexed_fields: Vec<String>,
}

impl CollectionSchema {
    pub fn new(
        name: impl Into<String>,
        fields: Vec<FieldType>,
        doc_count: u64,
        indexed_fields: Vec<String>,
    ) -> Self {
        let description = describe(fields.len(), doc_count);
        Self { name: name.into(), description, fields, doc_count, indexed_fields }
    }
}

/// Human description embedded alongside the collection name.
pub fn describe(field_count: usize, doc_count: u64) -> String {
    format!("Collection with {field_count} fields and {doc_count} documents")
}

/// A live field observation: type name plus a truncated sample value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSample {
    pub name: String,
    pub type_name: String,
    pub sample: String,
}

// ── Store enum ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum DocumentStore {
    Mongo(mongo::MongoStore),
    Fixture(fixture::FixtureStore),
}

impl DocumentStore {
    /// Connect to the configured MongoDB server and verify it answers `ping`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        Ok(DocumentStore::Mongo(mongo::MongoStore::connect(config).await?))
    }

    /// Schema of every non-system collection. Collections that fail to
    /// describe are logged and skipped.
    pub async fn extract_schema(&self) -> Result<Vec<CollectionSchema>, StoreError> {
        match self {
            DocumentStore::Mongo(s) => s.extract_schema().await,
            DocumentStore::Fixture(s) => s.extract_schema(),
        }
    }

    /// Field names, types and samples from one live document.
    /// Empty when the collection is empty or the lookup fails.
    pub async fn sample_fields(&self, collection: &str, max_chars: usize) -> Vec<FieldSample> {
        let sample = match self {
            DocumentStore::Mongo(s) => s.sample_document(collection).await,
            DocumentStore::Fixture(s) => s.sample_document(collection),
        };
        match sample {
            Ok(Some(doc)) => field_samples(&doc, max_chars),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(%collection, error = %e, "cannot read sample document");
                Vec::new()
            }
        }
    }

    pub async fn find(
        &self,
        collection: &str,
        filter: Document,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let mut docs = match self {
            DocumentStore::Mongo(s) => s.find(collection, filter, limit).await?,
            DocumentStore::Fixture(s) => s.find(collection, filter, limit)?,
        };
        docs.iter_mut().for_each(stringify_object_id);
        Ok(docs)
    }

    pub async fn count(&self, collection: &str, filter: Document) -> Result<u64, StoreError> {
        match self {
            DocumentStore::Mongo(s) => s.count(collection, filter).await,
            DocumentStore::Fixture(s) => s.count(collection, filter),
        }
    }

    /// Run an aggregation pipeline; at most `limit` documents are returned.
    pub async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let mut docs = match self {
            DocumentStore::Mongo(s) => s.aggregate(collection, pipeline, limit).await?,
            DocumentStore::Fixture(s) => s.aggregate(collection, pipeline, limit)?,
        };
        docs.iter_mut().for_each(stringify_object_id);
        Ok(docs)
    }
}

// ── BSON helpers ──────────────────────────────────────────────────────────────

/// MongoDB `$type` alias for a value.
pub fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::Boolean(_) => "bool",
        Bson::DateTime(_) => "date",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Timestamp(_) => "timestamp",
        Bson::Decimal128(_) => "decimal",
        _ => "other",
    }
}

/// Plain-text rendering of a value: strings unquoted, ids as hex,
/// dates as RFC 3339, containers in BSON's own notation.
pub fn display_value(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::Int32(i) => i.to_string(),
        Bson::Int64(i) => i.to_string(),
        Bson::Double(d) => d.to_string(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::DateTime(dt) => dt.try_to_rfc3339_string().unwrap_or_else(|_| dt.to_string()),
        Bson::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// First `max_chars` characters of `text`, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

pub fn field_types(doc: &Document) -> Vec<FieldType> {
    doc.iter()
        .map(|(name, value)| FieldType {
            name: name.clone(),
            type_name: bson_type_name(value).to_string(),
        })
        .collect()
}

pub fn field_samples(doc: &Document, max_chars: usize) -> Vec<FieldSample> {
    doc.iter()
        .map(|(name, value)| FieldSample {
            name: name.clone(),
            type_name: bson_type_name(value).to_string(),
            sample: truncate_chars(&display_value(value), max_chars),
        })
        .collect()
}

/// Replace an `ObjectId` `_id` with its hex string.
pub fn stringify_object_id(doc: &mut Document) {
    if let Some(Bson::ObjectId(oid)) = doc.get("_id").cloned() {
        doc.insert("_id", oid.to_hex());
    }
}
