//! In-memory store with canned documents, used by tests and offline demos.
//!
//! `find` and `count` apply top-level equality on plain filter values;
//! operator expressions (`{"$gt": …}`) are accepted but not evaluated.
//! `aggregate` returns the canned result registered for the collection, or
//! its documents when none was registered. Every executed query is recorded.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use mongodb::bson::{Bson, Document};

use super::{CollectionSchema, StoreError, field_types};

/// A query the fixture was asked to run.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutedQuery {
    Find { collection: String, filter: Document },
    Count { collection: String, filter: Document },
    Aggregate { collection: String, pipeline: Vec<Document> },
}

#[derive(Debug, Clone, Default)]
struct FixtureCollection {
    documents: Vec<Document>,
    indexes: Vec<String>,
    aggregate_result: Option<Vec<Document>>,
    failure: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FixtureStore {
    collections: BTreeMap<String, FixtureCollection>,
    executed: Arc<Mutex<Vec<ExecutedQuery>>>,
}

impl FixtureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, name: &str, documents: Vec<Document>) -> Self {
        let entry = self.collections.entry(name.to_string()).or_default();
        entry.documents = documents;
        entry.indexes = vec!["_id_".to_string()];
        self
    }

    pub fn with_aggregate_result(mut self, name: &str, result: Vec<Document>) -> Self {
        self.collections.entry(name.to_string()).or_default().aggregate_result = Some(result);
        self
    }

    /// Make every query on `name` fail with `message`.
    pub fn with_failure(mut self, name: &str, message: &str) -> Self {
        self.collections.entry(name.to_string()).or_default().failure = Some(message.to_string());
        self
    }

    /// Queries run so far, oldest first.
    pub fn executed(&self) -> Vec<ExecutedQuery> {
        self.executed.lock().map(|q| q.clone()).unwrap_or_default()
    }

    fn record(&self, query: ExecutedQuery) {
        if let Ok(mut q) = self.executed.lock() {
            q.push(query);
        }
    }

    fn get(&self, name: &str) -> Result<Option<&FixtureCollection>, StoreError> {
        match self.collections.get(name) {
            Some(c) => match &c.failure {
                Some(msg) => Err(StoreError::query(name, msg)),
                None => Ok(Some(c)),
            },
            None => Ok(None),
        }
    }

    pub fn extract_schema(&self) -> Result<Vec<CollectionSchema>, StoreError> {
        Ok(self
            .collections
            .iter()
            .filter(|(name, _)| !name.starts_with("system."))
            .map(|(name, c)| {
                let fields = c.documents.first().map(field_types).unwrap_or_default();
                CollectionSchema::new(name.as_str(), fields, c.documents.len() as u64, c.indexes.clone())
            })
            .collect())
    }

    pub fn sample_document(&self, name: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.get(name)?.and_then(|c| c.documents.first().cloned()))
    }

    pub fn find(&self, name: &str, filter: Document, limit: usize) -> Result<Vec<Document>, StoreError> {
        self.record(ExecutedQuery::Find { collection: name.to_string(), filter: filter.clone() });
        let Some(c) = self.get(name)? else { return Ok(Vec::new()) };
        Ok(c.documents
            .iter()
            .filter(|d| filter_matches(d, &filter))
            .take(limit)
            .cloned()
            .collect())
    }

    pub fn count(&self, name: &str, filter: Document) -> Result<u64, StoreError> {
        self.record(ExecutedQuery::Count { collection: name.to_string(), filter: filter.clone() });
        let Some(c) = self.get(name)? else { return Ok(0) };
        Ok(c.documents.iter().filter(|d| filter_matches(d, &filter)).count() as u64)
    }

    pub fn aggregate(
        &self,
        name: &str,
        pipeline: Vec<Document>,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        self.record(ExecutedQuery::Aggregate { collection: name.to_string(), pipeline });
        let Some(c) = self.get(name)? else { return Ok(Vec::new()) };
        let source = c.aggregate_result.as_ref().unwrap_or(&c.documents);
        Ok(source.iter().take(limit).cloned().collect())
    }
}

fn is_operator_expr(value: &Bson) -> bool {
    matches!(value, Bson::Document(d) if d.keys().any(|k| k.starts_with('$')))
}

fn filter_matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, expected)| {
        key.starts_with('$') || is_operator_expr(expected) || doc.get(key) == Some(expected)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn store() -> FixtureStore {
        FixtureStore::new().with_collection(
            "orders",
            vec![
                doc! { "_id": 1, "status": "completed", "amount": 120.0 },
                doc! { "_id": 2, "status": "pending", "amount": 80.0 },
                doc! { "_id": 3, "status": "completed", "amount": 45.5 },
            ],
        )
    }

    #[test]
    fn find_applies_equality_filter() {
        let s = store();
        let docs = s.find("orders", doc! { "status": "completed" }, 10).unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn find_respects_limit() {
        let docs = store().find("orders", doc! {}, 1).unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn operator_expressions_are_not_evaluated() {
        let n = store().count("orders", doc! { "amount": { "$gt": 100 } }).unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn unknown_collection_is_empty() {
        let s = store();
        assert!(s.find("nope", doc! {}, 10).unwrap().is_empty());
        assert_eq!(s.count("nope", doc! {}).unwrap(), 0);
    }

    #[test]
    fn aggregate_prefers_canned_result() {
        let s = store().with_aggregate_result("orders", vec![doc! { "_id": null, "total": 245.5 }]);
        let out = s.aggregate("orders", vec![doc! { "$group": { "_id": null } }], 10).unwrap();
        assert_eq!(out, vec![doc! { "_id": null, "total": 245.5 }]);
    }

    #[test]
    fn failure_is_reported_as_query_error() {
        let s = store().with_failure("orders", "boom");
        let err = s.find("orders", doc! {}, 10).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn executed_queries_are_recorded() {
        let s = store();
        s.count("orders", doc! {}).unwrap();
        assert_eq!(
            s.executed(),
            vec![ExecutedQuery::Count { collection: "orders".into(), filter: doc! {} }]
        );
    }

    #[test]
    fn schema_infers_from_first_document() {
        let schema = store().extract_schema().unwrap();
        assert_eq!(schema.len(), 1);
        assert_eq!(schema[0].doc_count, 3);
        assert_eq!(schema[0].fields.len(), 3);
        assert_eq!(schema[0].fields[1].name, "status");
    }
}
