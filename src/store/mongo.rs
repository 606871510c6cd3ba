//! MongoDB backend.

use std::time::Duration;

use futures_util::TryStreamExt;
use mongodb::{
    Client, Collection, Cursor, Database,
    bson::{Document, doc},
    options::ClientOptions,
};
use tracing::{debug, info, warn};

use super::{CollectionSchema, StoreError, field_types};
use crate::config::DatabaseConfig;

#[derive(Debug, Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    /// Build a client with a bounded server-selection timeout and `ping` it,
    /// so an unreachable server fails at startup rather than on first query.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(&config.uri)
            .await
            .map_err(|e| StoreError::Connect(format!("invalid uri: {e}")))?;
        options.server_selection_timeout =
            Some(Duration::from_millis(config.server_selection_timeout_ms));
        options.app_name = Some("docquery".to_string());

        let client = Client::with_options(options)
            .map_err(|e| StoreError::Connect(e.to_string()))?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StoreError::Connect(e.to_string()))?;

        info!(database = %config.name, "connected to MongoDB");
        Ok(Self { db: client.database(&config.name) })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }

    pub async fn extract_schema(&self) -> Result<Vec<CollectionSchema>, StoreError> {
        let names = self
            .db
            .list_collection_names()
            .await
            .map_err(|e| StoreError::query("*", e))?;

        let mut schemas = Vec::new();
        for name in names.into_iter().filter(|n| !n.starts_with("system.")) {
            match self.describe_collection(&name).await {
                Ok(schema) => schemas.push(schema),
                Err(e) => warn!(collection = %name, error = %e, "could not extract collection schema"),
            }
        }
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(collections = schemas.len(), "schema extracted");
        Ok(schemas)
    }

    async fn describe_collection(&self, name: &str) -> Result<CollectionSchema, StoreError> {
        let coll = self.collection(name);
        let doc_count = coll
            .count_documents(doc! {})
            .await
            .map_err(|e| StoreError::query(name, e))?;
        let sample = coll
            .find_one(doc! {})
            .await
            .map_err(|e| StoreError::query(name, e))?;
        let fields = sample.as_ref().map(field_types).unwrap_or_default();
        let indexed_fields = coll.list_index_names().await.unwrap_or_else(|e| {
            debug!(collection = %name, error = %e, "index listing failed");
            Vec::new()
        });
        Ok(CollectionSchema::new(name, fields, doc_count, indexed_fields))
    }

    pub async fn sample_document(&self, name: &str) -> Result<Option<Document>, StoreError> {
        self.collection(name)
            .find_one(doc! {})
            .await
            .map_err(|e| StoreError::query(name, e))
    }

    pub async fn find(
        &self,
        name: &str,
        filter: Document,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let cursor = self
            .collection(name)
            .find(filter)
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await
            .map_err(|e| StoreError::query(name, e))?;
        drain(cursor, limit).await.map_err(|e| StoreError::query(name, e))
    }

    pub async fn count(&self, name: &str, filter: Document) -> Result<u64, StoreError> {
        self.collection(name)
            .count_documents(filter)
            .await
            .map_err(|e| StoreError::query(name, e))
    }

    pub async fn aggregate(
        &self,
        name: &str,
        pipeline: Vec<Document>,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let cursor = self
            .collection(name)
            .aggregate(pipeline)
            .await
            .map_err(|e| StoreError::query(name, e))?;
        drain(cursor, limit).await.map_err(|e| StoreError::query(name, e))
    }
}

/// Pull at most `limit` documents off a cursor.
async fn drain(mut cursor: Cursor<Document>, limit: usize) -> mongodb::error::Result<Vec<Document>> {
    let mut docs = Vec::new();
    while docs.len() < limit {
        match cursor.try_next().await? {
            Some(doc) => docs.push(doc),
            None => break,
        }
    }
    Ok(docs)
}
