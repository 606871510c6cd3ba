//! On-disk cache of the schema index.
//!
//! The cache is keyed by a fingerprint over the embedder descriptor and the
//! schema shape (collection names and `field:type` pairs). A matching
//! fingerprint skips re-embedding fields; live counts are refreshed on load
//! and a collection whose description moved is re-embedded.

use std::{
    collections::BTreeMap,
    fs,
    path::Path,
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use super::{IndexedCollection, SchemaIndex};
use crate::embed::{EmbedError, Embedder};
use crate::store::CollectionSchema;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cannot access cache file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed cache file: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    fingerprint: String,
    embedder: String,
    created_at: String,
    collections: BTreeMap<String, IndexedCollection>,
}

/// Hex sha256 over the embedder and the sorted schema shape.
pub fn fingerprint(embedder: &str, schema: &[CollectionSchema]) -> String {
    let mut sorted: Vec<&CollectionSchema> = schema.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut hasher = Sha256::new();
    hasher.update(embedder.as_bytes());
    hasher.update(b"\n");
    for coll in sorted {
        hasher.update(coll.name.as_bytes());
        hasher.update(b"\n");
        let mut pairs: Vec<String> =
            coll.fields.iter().map(|f| format!("{}:{}", f.name, f.type_name)).collect();
        pairs.sort();
        for pair in pairs {
            hasher.update(pair.as_bytes());
            hasher.update(b"\n");
        }
    }
    hex::encode(hasher.finalize())
}

/// Load the cached index if it exists and was written for `expected`.
pub fn load(path: &Path, expected: &str) -> Result<Option<SchemaIndex>, CacheError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)?;
    let file: CacheFile = serde_json::from_str(&raw)?;
    if file.fingerprint != expected {
        info!(path = %path.display(), "schema or embedder changed, cache is stale");
        return Ok(None);
    }
    Ok(Some(SchemaIndex::from_collections(file.collections)))
}

pub fn save(path: &Path, index: &SchemaIndex, fingerprint: &str, embedder: &str) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = CacheFile {
        fingerprint: fingerprint.to_string(),
        embedder: embedder.to_string(),
        created_at: Utc::now().to_rfc3339(),
        collections: index.collections().clone(),
    };
    fs::write(path, serde_json::to_string_pretty(&file)?)?;
    Ok(())
}

/// Use the cached index when it is still valid, otherwise embed the schema
/// and write a fresh cache. `force` skips the cache lookup.
///
/// Cache read and write failures are logged and never fatal.
pub async fn load_or_build(
    schema: &[CollectionSchema],
    embedder: &Embedder,
    path: &Path,
    force: bool,
) -> Result<SchemaIndex, EmbedError> {
    let descriptor = embedder.descriptor();
    let fp = fingerprint(&descriptor, schema);

    if !force {
        match load(path, &fp) {
            Ok(Some(mut index)) => {
                let reembedded = index.refresh(schema, embedder).await?;
                info!(collections = index.len(), reembedded, path = %path.display(), "loaded embeddings from cache");
                if reembedded > 0 {
                    if let Err(e) = save(path, &index, &fp, &descriptor) {
                        warn!(path = %path.display(), error = %e, "could not write embeddings cache");
                    }
                }
                return Ok(index);
            }
            Ok(None) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "ignoring unreadable embeddings cache"),
        }
    }

    info!(collections = schema.len(), embedder = %descriptor, "building schema embeddings");
    let index = SchemaIndex::build(schema, embedder).await?;
    if let Err(e) = save(path, &index, &fp, &descriptor) {
        warn!(path = %path.display(), error = %e, "could not write embeddings cache");
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::providers::hash::HashEmbedder;
    use crate::store::FieldType;
    use tempfile::TempDir;

    fn schema(doc_count: u64) -> Vec<CollectionSchema> {
        vec![CollectionSchema::new(
            "orders",
            vec![
                FieldType { name: "status".into(), type_name: "string".into() },
                FieldType { name: "amount".into(), type_name: "double".into() },
            ],
            doc_count,
            vec!["_id_".into()],
        )]
    }

    fn embedder() -> Embedder {
        Embedder::Hash(HashEmbedder::new(32))
    }

    #[test]
    fn fingerprint_ignores_field_order_and_counts() {
        let a = schema(10);
        let mut b = schema(99);
        b[0].fields.reverse();
        assert_eq!(fingerprint("hash", &a), fingerprint("hash", &b));
    }

    #[test]
    fn fingerprint_tracks_embedder_and_types() {
        let a = schema(10);
        let mut b = schema(10);
        b[0].fields[1].type_name = "int".into();
        assert_ne!(fingerprint("hash", &a), fingerprint("hash", &b));
        assert_ne!(fingerprint("hash", &a), fingerprint("ollama:all-minilm", &a));
        assert_eq!(fingerprint("hash", &a).len(), 64);
    }

    #[tokio::test]
    async fn build_writes_then_reuses_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.json");

        let first = load_or_build(&schema(10), &embedder(), &path, false).await.unwrap();
        assert!(path.exists());

        let raw = fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["embedder"], "hash:fnv1a:32");
        assert!(json["created_at"].as_str().unwrap().contains('T'));

        let second = load_or_build(&schema(42), &embedder(), &path, false).await.unwrap();
        let (before, after) = (first.get("orders").unwrap(), second.get("orders").unwrap());
        assert_eq!(before.field_embeddings, after.field_embeddings);
        assert_eq!(after.doc_count, 42);
        let fresh = embedder().embed("orders: Collection with 2 fields and 42 documents").await.unwrap();
        assert_eq!(after.collection_embedding, fresh);

        let fp = fingerprint(&embedder().descriptor(), &schema(42));
        let saved = load(&path, &fp).unwrap().unwrap();
        assert_eq!(saved.get("orders").unwrap().description, "Collection with 2 fields and 42 documents");
    }

    #[tokio::test]
    async fn stale_fingerprint_returns_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.json");
        load_or_build(&schema(10), &embedder(), &path, false).await.unwrap();
        assert!(load(&path, "different").unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_cache_is_rebuilt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(load(&path, "x"), Err(CacheError::Format(_))));

        let index = load_or_build(&schema(10), &embedder(), &path, false).await.unwrap();
        assert!(index.contains("orders"));
        let fp = fingerprint(&embedder().descriptor(), &schema(10));
        assert!(load(&path, &fp).unwrap().is_some());
    }

    #[test]
    fn missing_cache_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(load(&dir.path().join("absent.json"), "x").unwrap().is_none());
    }
}
